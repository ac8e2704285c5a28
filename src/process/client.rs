//! Process client: spawns, streams and terminates the agent process.
//!
//! The client owns a single slot. At most one agent process is live at a time;
//! a second `execute*` while one is running is rejected with `Busy`.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::Instant;

use super::signal::{KillSignal, send_signal};
use super::types::{ExecutionCallbacks, ExecutionMode, ExecutionOutcome, ExecutionRequest};
use crate::error::{Result, WiggumError};
use crate::stream::{StreamHandler, StreamParser, ToolEvent, Utf8Carry};

/// Agent binary used when none is configured
pub const DEFAULT_BINARY: &str = "claude";

/// How long an `execute*` call may go without an exit event
pub const DEFAULT_ZOMBIE_TIMEOUT: Duration = Duration::from_secs(300);

/// Wait after SIGKILL before giving up on the exit event
pub const KILL_BUFFER: Duration = Duration::from_millis(1000);

const READ_CHUNK: usize = 8192;

/// The live process. Never leaves the client.
struct ProcessHandle {
    pid: u32,
    args: Vec<String>,
    started_at: DateTime<Utc>,
    exited: watch::Receiver<bool>,
}

type Slot = Arc<Mutex<Option<ProcessHandle>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<ProcessHandle>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Clears the slot and publishes the exit when the call that spawned the
/// process finishes, however it finishes.
struct SlotGuard {
    slot: Slot,
    exited: watch::Sender<bool>,
}

impl SlotGuard {
    fn mark_exited(&self) {
        self.exited.send_replace(true);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(handle) = lock_slot(&self.slot).take() {
            let elapsed = Utc::now() - handle.started_at;
            log::debug!(
                "Agent pid {} released after {}ms ({} args)",
                handle.pid,
                elapsed.num_milliseconds(),
                handle.args.len()
            );
        }
        self.exited.send_replace(true);
    }
}

/// Forwards parser output to the per-call callbacks.
struct CallbackHandler<'a> {
    callbacks: &'a ExecutionCallbacks,
}

impl StreamHandler for CallbackHandler<'_> {
    fn on_tool_event(&mut self, event: ToolEvent) {
        if let Some(cb) = &self.callbacks.on_tool_event {
            cb(&event);
        }
    }

    fn on_error(&mut self, line: &str) {
        if let Some(cb) = &self.callbacks.on_parse_error {
            cb(line);
        }
    }
}

/// Client for the external agent CLI
pub struct ProcessClient {
    binary: PathBuf,
    extra_args: Vec<String>,
    zombie_timeout: Duration,
    kill_buffer: Duration,
    slot: Slot,
    shutting_down: AtomicBool,
}

impl ProcessClient {
    /// Create a client for the given agent binary
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            zombie_timeout: DEFAULT_ZOMBIE_TIMEOUT,
            kill_buffer: KILL_BUFFER,
            slot: Arc::new(Mutex::new(None)),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Arguments placed before the generated ones on every invocation
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_zombie_timeout(mut self, zombie_timeout: Duration) -> Self {
        self.zombie_timeout = zombie_timeout;
        self
    }

    pub fn with_kill_buffer(mut self, kill_buffer: Duration) -> Self {
        self.kill_buffer = kill_buffer;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Pid of the live agent process, if any
    pub fn running_pid(&self) -> Option<u32> {
        self.live().map(|(pid, _)| pid)
    }

    /// Build the argument list for a request
    pub fn build_args(&self, request: &ExecutionRequest) -> Vec<String> {
        let mut args = self.extra_args.clone();

        match request.mode {
            ExecutionMode::Interactive => {
                args.push("--dangerously-skip-permissions".to_string());
                if let Some(system_prompt) = &request.system_prompt {
                    args.push("--append-system-prompt".to_string());
                    args.push(system_prompt.clone());
                }
                args.push(request.prompt.clone());
            }
            ExecutionMode::Captured | ExecutionMode::Streamed => {
                args.push("-p".to_string());
                args.push(request.prompt.clone());
                args.push("--dangerously-skip-permissions".to_string());
                if let Some(system_prompt) = &request.system_prompt {
                    args.push("--append-system-prompt".to_string());
                    args.push(system_prompt.clone());
                }
                if request.mode == ExecutionMode::Streamed {
                    args.push("--output-format".to_string());
                    args.push("stream-json".to_string());
                    args.push("--verbose".to_string());
                }
            }
        }

        args
    }

    /// Run with inherited stdio until the agent exits
    pub async fn execute_interactive(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        cwd: Option<&Path>,
    ) -> Result<ExecutionOutcome> {
        let request = Self::request(prompt, system_prompt, cwd, ExecutionMode::Interactive, None);
        self.execute(request).await
    }

    /// One-shot run resolving with the full stdout
    pub async fn execute_captured(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        cwd: Option<&Path>,
        callbacks: Option<ExecutionCallbacks>,
    ) -> Result<ExecutionOutcome> {
        let request = Self::request(prompt, system_prompt, cwd, ExecutionMode::Captured, callbacks);
        self.execute(request).await
    }

    /// One-shot run with the event stream parsed as it arrives
    pub async fn execute_streamed(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        cwd: Option<&Path>,
        callbacks: Option<ExecutionCallbacks>,
    ) -> Result<ExecutionOutcome> {
        let request = Self::request(prompt, system_prompt, cwd, ExecutionMode::Streamed, callbacks);
        self.execute(request).await
    }

    /// Run a request in whatever mode it names
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
        match request.mode {
            ExecutionMode::Interactive => self.run_interactive(&request).await,
            ExecutionMode::Captured | ExecutionMode::Streamed => self.run_piped(&request).await,
        }
    }

    /// Probe the binary with `--version`
    pub async fn is_available(&self) -> bool {
        let status = Command::new(&self.binary)
            .args(&self.extra_args)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                log::debug!("Agent binary '{}' not available: {}", self.binary.display(), e);
                false
            }
        }
    }

    /// Signal the live process. Returns false when nothing is running.
    pub fn kill(&self, signal: KillSignal) -> bool {
        match self.live() {
            Some((pid, exited)) if !*exited.borrow() => {
                log::info!("Sending {} to agent pid {}", signal.name(), pid);
                send_signal(pid, signal)
            }
            _ => false,
        }
    }

    /// Stop accepting work and terminate any live process.
    ///
    /// SIGTERM first; SIGKILL if the process outlives `grace`. Safe to call
    /// any number of times.
    pub async fn shutdown(&self, grace: Duration) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            log::info!("Agent client shutting down");
        }

        let Some((pid, mut exited)) = self.live() else {
            return;
        };
        if *exited.borrow() {
            return;
        }

        send_signal(pid, KillSignal::Term);
        if tokio::time::timeout(grace, exited.wait_for(|done| *done)).await.is_ok() {
            log::debug!("Agent pid {} exited after SIGTERM", pid);
            return;
        }

        log::warn!("Agent pid {} ignored SIGTERM for {:?}; sending SIGKILL", pid, grace);
        send_signal(pid, KillSignal::Kill);
        if tokio::time::timeout(self.kill_buffer, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            log::error!("Agent pid {} did not report exit after SIGKILL", pid);
        }
    }

    fn request(
        prompt: &str,
        system_prompt: Option<&str>,
        cwd: Option<&Path>,
        mode: ExecutionMode,
        callbacks: Option<ExecutionCallbacks>,
    ) -> ExecutionRequest {
        ExecutionRequest {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            cwd: cwd.map(Path::to_path_buf),
            mode,
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    fn live(&self) -> Option<(u32, watch::Receiver<bool>)> {
        lock_slot(&self.slot)
            .as_ref()
            .map(|handle| (handle.pid, handle.exited.clone()))
    }

    fn spawn(&self, request: &ExecutionRequest) -> Result<(Child, SlotGuard)> {
        if self.is_shutting_down() {
            return Err(WiggumError::ShutdownInProgress);
        }

        let mut slot = lock_slot(&self.slot);
        if let Some(handle) = slot.as_ref() {
            return Err(WiggumError::Busy(handle.pid));
        }

        let args = self.build_args(request);
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args).kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        if request.mode == ExecutionMode::Interactive {
            cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let child = cmd.spawn().map_err(|e| {
            WiggumError::spawn_with_source(format!("could not launch '{}'", self.binary.display()), e)
        })?;
        let pid = child.id().unwrap_or_default();
        log::debug!("Spawned agent pid {} in {:?} mode", pid, request.mode);

        let (tx, rx) = watch::channel(false);
        *slot = Some(ProcessHandle {
            pid,
            args,
            started_at: Utc::now(),
            exited: rx,
        });

        Ok((
            child,
            SlotGuard {
                slot: self.slot.clone(),
                exited: tx,
            },
        ))
    }

    /// Map a non-success exit to the right error
    fn exit_error(&self, status: ExitStatus, stderr: String) -> WiggumError {
        if self.is_shutting_down() {
            WiggumError::ShutdownInProgress
        } else {
            WiggumError::NonZeroExit {
                code: status.code(),
                stderr,
            }
        }
    }

    async fn run_interactive(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let (mut child, guard) = self.spawn(request)?;
        let status = child.wait().await?;
        guard.mark_exited();
        drop(guard);

        if !status.success() {
            return Err(self.exit_error(status, String::new()));
        }
        Ok(ExecutionOutcome {
            output: String::new(),
            exit_code: status.code(),
            exit_lost: false,
        })
    }

    async fn run_piped(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let (mut child, guard) = self.spawn(request)?;
        let streamed = request.mode == ExecutionMode::Streamed;
        let callbacks = &request.callbacks;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| WiggumError::spawn("agent stdout was not piped"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| WiggumError::spawn("agent stderr was not piped"))?;

        let mut out_buf: Vec<u8> = Vec::new();
        let mut err_buf: Vec<u8> = Vec::new();
        let mut out_text = Utf8Carry::default();
        let mut err_text = Utf8Carry::default();
        let mut parser = StreamParser::new();
        let mut handler = CallbackHandler { callbacks };
        let kill_buffer = self.kill_buffer;

        let pump = async {
            let mut out_chunk = [0u8; READ_CHUNK];
            let mut err_chunk = [0u8; READ_CHUNK];
            let mut out_open = true;
            let mut err_open = true;
            let mut status: Option<ExitStatus> = None;
            let mut drain_deadline = Instant::now();

            let status = loop {
                if let Some(status) = status
                    && !out_open
                    && !err_open
                {
                    break status;
                }

                tokio::select! {
                    read = stdout.read(&mut out_chunk), if out_open => match read {
                        Ok(0) => out_open = false,
                        Ok(n) => {
                            let bytes = &out_chunk[..n];
                            out_buf.extend_from_slice(bytes);
                            let text = out_text.decode(bytes);
                            if !text.is_empty() {
                                callbacks.stdout(&text);
                                if streamed {
                                    callbacks.raw(&text);
                                    parser.feed(&text, &mut handler);
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("Error reading agent stdout: {}", e);
                            out_open = false;
                        }
                    },
                    read = stderr.read(&mut err_chunk), if err_open => match read {
                        Ok(0) => err_open = false,
                        Ok(n) => {
                            let bytes = &err_chunk[..n];
                            err_buf.extend_from_slice(bytes);
                            let text = err_text.decode(bytes);
                            if !text.is_empty() {
                                callbacks.stderr(&text);
                            }
                        }
                        Err(e) => {
                            log::warn!("Error reading agent stderr: {}", e);
                            err_open = false;
                        }
                    },
                    waited = child.wait(), if status.is_none() => {
                        let exit = waited?;
                        guard.mark_exited();
                        drain_deadline = Instant::now() + kill_buffer;
                        status = Some(exit);
                    }
                    _ = tokio::time::sleep_until(drain_deadline), if status.is_some() => {
                        log::debug!("Agent exited but its output pipes stayed open; stopped draining");
                        if let Some(status) = status {
                            break status;
                        }
                    }
                }
            };

            Ok::<ExitStatus, std::io::Error>(status)
        };

        let waited = tokio::time::timeout(self.zombie_timeout, pump).await;
        let (status, exit_lost) = match waited {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                log::warn!(
                    "No exit event from agent within {:?}; resolving with partial output",
                    self.zombie_timeout
                );
                (None, true)
            }
        };

        let out_rest = out_text.finish();
        if !out_rest.is_empty() {
            callbacks.stdout(&out_rest);
            if streamed {
                callbacks.raw(&out_rest);
                parser.feed(&out_rest, &mut handler);
            }
        }
        let err_rest = err_text.finish();
        if !err_rest.is_empty() {
            callbacks.stderr(&err_rest);
        }

        if streamed {
            parser.finish(&mut handler);
            if parser.malformed_lines() > 0 {
                log::debug!("{} malformed stream lines skipped", parser.malformed_lines());
            }
        }

        // Kills the process if the exit was lost, then releases the slot.
        drop(child);
        drop(guard);

        if let Some(status) = status
            && !status.success()
        {
            let stderr_text = String::from_utf8_lossy(&err_buf).trim_end().to_string();
            return Err(self.exit_error(status, stderr_text));
        }

        let stdout_text = String::from_utf8_lossy(&out_buf).into_owned();
        let output = if streamed {
            parser.take_final_result().unwrap_or(stdout_text)
        } else {
            stdout_text
        };

        Ok(ExecutionOutcome {
            output,
            exit_code: status.and_then(|s| s.code()),
            exit_lost,
        })
    }
}

impl Default for ProcessClient {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}
