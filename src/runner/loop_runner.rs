//! Iteration controller - drives the agent with fresh context until done.
//!
//! Every iteration spawns a new agent invocation. The only memory carried
//! between iterations is the workspace: the status file and the task list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::shutdown::ShutdownHandle;
use super::state::IterationState;
use crate::domain::{LoopEvent, LoopOutcome, MILESTONE_INTERVAL, WorkMode};
use crate::error::Result;
use crate::process::{AgentRunner, ExecutionCallbacks, ExecutionMode, ExecutionRequest, KillSignal};
use crate::prompt::{ExecutionStrategy, IterationPrompt, PromptContext};
use crate::status::CompletionDetector;
use crate::storage::{IterationLogRecord, LogSink, NullLogSink, OutputStream};
use crate::stream::ToolEvent;
use crate::workspace::{DEFAULT_MAX_ITERATIONS, DEFAULT_STAGNATION_THRESHOLD, MetadataStore, WorkspaceMetadata};

/// Grace period between SIGTERM and SIGKILL on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause between iterations
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Receives controller events. Called inline, so implementations must not block.
pub trait LoopObserver: Send + Sync {
    fn on_event(&self, event: &LoopEvent);

    /// Tool activity from a streamed invocation
    fn on_tool_event(&self, _event: &ToolEvent) {}
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub task: String,
    pub mode: WorkMode,
    pub max_iterations: u32,
    pub delay: Duration,
    /// Skip the pause between iterations
    pub skip_delay: bool,
    /// Consecutive no-work iterations before stopping (iterative mode); 0 disables
    pub stagnation_threshold: u32,
    pub shutdown_grace: Duration,
    pub execution: ExecutionMode,
    pub cwd: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(task: impl Into<String>, mode: WorkMode) -> Self {
        Self {
            task: task.into(),
            mode,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            delay: DEFAULT_DELAY,
            skip_delay: false,
            stagnation_threshold: DEFAULT_STAGNATION_THRESHOLD,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            execution: ExecutionMode::Captured,
            cwd: None,
        }
    }

    /// Settings recorded in the workspace; delay falls back to the default
    pub fn from_metadata(metadata: &WorkspaceMetadata) -> Self {
        let mut config = Self::new(metadata.task.clone(), metadata.mode);
        config.max_iterations = metadata.max_iterations;
        config.stagnation_threshold = metadata.stagnation_threshold;
        if let Some(delay_ms) = metadata.delay_ms {
            config.delay = Duration::from_millis(delay_ms);
        }
        config
    }
}

/// Runs iterations against an [`AgentRunner`] until a terminal state.
pub struct IterationController<R: AgentRunner> {
    runner: Arc<R>,
    config: EngineConfig,
    detector: CompletionDetector,
    strategy: ExecutionStrategy,
    metadata: Option<Arc<dyn MetadataStore>>,
    log_sink: Arc<dyn LogSink>,
    observers: Vec<Arc<dyn LoopObserver>>,
    shutdown: ShutdownHandle,
}

impl<R: AgentRunner> IterationController<R> {
    pub fn new(runner: Arc<R>, config: EngineConfig, detector: CompletionDetector) -> Result<Self> {
        let strategy = ExecutionStrategy::for_mode(config.mode)?;
        Ok(Self {
            runner,
            config,
            detector,
            strategy,
            metadata: None,
            log_sink: Arc::new(NullLogSink),
            observers: Vec::new(),
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Share an existing handle, e.g. one a signal handler already holds
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run until complete, stagnant, out of iterations, failed or interrupted.
    pub async fn run(&self) -> LoopOutcome {
        let mut state = IterationState::new();
        log::info!(
            "Starting {} run: max {} iterations, stagnation threshold {}",
            self.config.mode,
            self.config.max_iterations,
            self.config.stagnation_threshold
        );
        self.emit(LoopEvent::run_started(
            self.config.mode,
            self.config.max_iterations,
            &self.config.task,
        ));

        let outcome = self.drive(&mut state).await;

        let iterations = state.iteration;
        let label = outcome.as_str();
        self.update_metadata(&mut |meta| {
            meta.iteration_count = iterations;
            meta.last_outcome = Some(label.to_string());
        });
        self.emit(LoopEvent::finished(&outcome, state.iteration, state.no_work_streak));
        log::info!("Run finished: {} after {} iterations", label, state.iteration);
        outcome
    }

    async fn drive(&self, state: &mut IterationState) -> LoopOutcome {
        let mode = self.config.mode;
        loop {
            if self.shutdown.is_requested() {
                state.shutdown_requested = true;
                return LoopOutcome::Interrupted;
            }
            if state.complete {
                return if state.stagnated {
                    LoopOutcome::StagnantCompleted
                } else {
                    LoopOutcome::Completed
                };
            }
            if state.iteration >= self.config.max_iterations {
                return LoopOutcome::MaxIterationsReached;
            }

            let iteration = state.iteration + 1;
            let started = Utc::now();
            let prompt = match self.strategy.build(&self.prompt_context(iteration)) {
                Ok(prompt) => prompt,
                Err(e) => return self.fail(iteration, started, e.to_string()),
            };

            log::info!("Iteration {}/{} starting", iteration, self.config.max_iterations);
            self.emit(LoopEvent::iteration_started(iteration, self.config.max_iterations));
            self.log_sink.record(&IterationLogRecord::start(iteration));

            let exec = self.runner.execute(self.build_request(prompt));
            tokio::pin!(exec);
            let result = tokio::select! {
                result = &mut exec => result,
                _ = self.shutdown.requested() => {
                    state.shutdown_requested = true;
                    log::info!("Shutdown requested during iteration {}", iteration);
                    let (result, ()) = tokio::join!(&mut exec, self.terminate());
                    result
                }
            };

            let outcome = match result {
                Ok(_) if state.shutdown_requested => {
                    self.log_sink
                        .record(&IterationLogRecord::error(iteration, started, "interrupted"));
                    return LoopOutcome::Interrupted;
                }
                Ok(outcome) => outcome,
                Err(e) if state.shutdown_requested || e.is_shutdown() => {
                    state.shutdown_requested = true;
                    self.log_sink
                        .record(&IterationLogRecord::error(iteration, started, e.to_string()));
                    return LoopOutcome::Interrupted;
                }
                Err(e) => return self.fail(iteration, started, e.to_string()),
            };

            if outcome.exit_lost {
                log::warn!("Iteration {} exit status was lost; keeping partial output", iteration);
            }
            state.iteration = iteration;
            self.log_sink.record(&IterationLogRecord::complete(
                iteration,
                started,
                outcome.output.len(),
                outcome.exit_lost,
            ));

            state.complete = self.detector.is_complete(mode);
            if mode == WorkMode::Iterative {
                let worked = self.detector.read_status().worked;
                if state.record_work(worked, self.config.stagnation_threshold) && !state.complete {
                    log::info!(
                        "No work reported for {} consecutive iterations; stopping",
                        state.no_work_streak
                    );
                    state.complete = true;
                    state.stagnated = true;
                }
            }

            let remaining = self.detector.remaining_count(mode);
            let duration_ms = (Utc::now() - started).num_milliseconds();
            log::info!(
                "Iteration {} complete in {}ms (remaining: {:?}, complete: {})",
                iteration,
                duration_ms,
                remaining,
                state.complete
            );
            self.emit(LoopEvent::iteration_complete(iteration, duration_ms, remaining));
            if iteration % MILESTONE_INTERVAL == 0 {
                self.emit(LoopEvent::milestone(iteration));
            }
            self.update_metadata(&mut |meta| meta.iteration_count = iteration);

            let more = !state.complete && state.iteration < self.config.max_iterations;
            if more && !self.config.skip_delay && !self.config.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.delay) => {}
                    _ = self.shutdown.requested() => {
                        state.shutdown_requested = true;
                        return LoopOutcome::Interrupted;
                    }
                }
            }
        }
    }

    /// Graceful shutdown of the runner; a second request kills immediately
    async fn terminate(&self) {
        let graceful = self.runner.shutdown(self.config.shutdown_grace);
        tokio::pin!(graceful);
        tokio::select! {
            _ = &mut graceful => {}
            _ = self.shutdown.escalated() => {
                log::warn!("Second shutdown request; killing agent");
                self.runner.kill(KillSignal::Kill);
                graceful.await;
            }
        }
    }

    fn fail(&self, iteration: u32, started: DateTime<Utc>, message: String) -> LoopOutcome {
        log::error!("Iteration {} failed: {}", iteration, message);
        self.log_sink
            .record(&IterationLogRecord::error(iteration, started, message.as_str()));
        self.emit(LoopEvent::error(iteration, &message));
        LoopOutcome::Failed(message)
    }

    fn prompt_context(&self, iteration: u32) -> PromptContext {
        PromptContext {
            task: self.config.task.clone(),
            iteration,
            max_iterations: self.config.max_iterations,
            status_path: self.detector.status_path().display().to_string(),
            task_list_path: self.detector.task_list_path().display().to_string(),
            remaining: self.detector.remaining_count(self.config.mode),
        }
    }

    fn build_request(&self, prompt: IterationPrompt) -> ExecutionRequest {
        let stdout_sink = self.log_sink.clone();
        let stderr_sink = self.log_sink.clone();
        let observers = self.observers.clone();
        let callbacks = ExecutionCallbacks::new()
            .on_stdout(move |chunk| stdout_sink.raw(OutputStream::Stdout, chunk))
            .on_stderr(move |chunk| stderr_sink.raw(OutputStream::Stderr, chunk))
            .on_tool_event(move |event| {
                for observer in &observers {
                    observer.on_tool_event(event);
                }
            })
            .on_parse_error(|line| log::debug!("Unparsed agent output: {}", line));

        let mut request = ExecutionRequest::new(prompt.prompt)
            .with_system_prompt(prompt.system_prompt)
            .with_mode(self.config.execution)
            .with_callbacks(callbacks);
        if let Some(cwd) = &self.config.cwd {
            request = request.with_cwd(cwd.clone());
        }
        request
    }

    fn emit(&self, event: LoopEvent) {
        if event.is_terminal() {
            log::info!("Run finished: {} after {:?} iterations", event.event_type, event.iteration);
        } else {
            log::debug!("Event {} (iteration {:?})", event.event_type, event.iteration);
        }
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn update_metadata(&self, apply: &mut dyn FnMut(&mut WorkspaceMetadata)) {
        if let Some(store) = &self.metadata
            && let Err(e) = store.update(apply)
        {
            log::warn!("Failed to update workspace metadata: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExecutionOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Writes a fixed status record on every call
    struct FixedRunner {
        status_path: PathBuf,
        status: &'static str,
        calls: AtomicU32,
        prompts: Mutex<Vec<ExecutionRequest>>,
    }

    #[async_trait]
    impl AgentRunner for FixedRunner {
        async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            request.callbacks.stdout("chunk");
            std::fs::write(&self.status_path, self.status)?;
            self.prompts.lock().unwrap().push(request);
            Ok(ExecutionOutcome {
                output: "chunk".to_string(),
                exit_code: Some(0),
                exit_lost: false,
            })
        }

        async fn shutdown(&self, _grace: Duration) {}

        fn kill(&self, _signal: KillSignal) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl LoopObserver for Recorder {
        fn on_event(&self, event: &LoopEvent) {
            self.events.lock().unwrap().push(event.event_type.clone());
        }
    }

    fn setup(status: &'static str, mode: WorkMode) -> (TempDir, Arc<FixedRunner>, EngineConfig, CompletionDetector) {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("status.json");
        let runner = Arc::new(FixedRunner {
            status_path: status_path.clone(),
            status,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        });
        let mut config = EngineConfig::new("write docs", mode);
        config.skip_delay = true;
        let detector = CompletionDetector::new(status_path, dir.path().join("TODO.md"));
        (dir, runner, config, detector)
    }

    #[test]
    fn test_config_from_metadata() {
        let mut metadata = WorkspaceMetadata::new("task", WorkMode::Iterative);
        metadata.max_iterations = 7;
        metadata.delay_ms = Some(250);
        metadata.stagnation_threshold = 0;

        let config = EngineConfig::from_metadata(&metadata);
        assert_eq!(config.mode, WorkMode::Iterative);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.delay, Duration::from_millis(250));
        assert_eq!(config.stagnation_threshold, 0);
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
    }

    #[tokio::test]
    async fn test_completes_after_first_iteration() {
        let (_dir, runner, config, detector) = setup(r#"{"complete":true}"#, WorkMode::Loop);
        let recorder = Arc::new(Recorder::default());
        let controller = IterationController::new(runner.clone(), config, detector)
            .unwrap()
            .with_observer(recorder.clone());

        assert_eq!(controller.run().await, LoopOutcome::Completed);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["run.started", "iteration.started", "iteration.complete", "run.complete"]
        );
    }

    #[tokio::test]
    async fn test_request_carries_prompts_and_mode() {
        let (dir, runner, mut config, detector) = setup(r#"{"complete":true}"#, WorkMode::Loop);
        config.execution = ExecutionMode::Streamed;
        config.cwd = Some(dir.path().to_path_buf());
        let controller = IterationController::new(runner.clone(), config, detector).unwrap();
        controller.run().await;

        let requests = runner.prompts.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.mode, ExecutionMode::Streamed);
        assert_eq!(request.cwd.as_deref(), Some(dir.path()));
        assert!(request.prompt.contains("Iteration 1"));
        assert!(request.system_prompt.as_deref().unwrap().contains("write docs"));
    }

    #[tokio::test]
    async fn test_stagnation_ignored_in_loop_mode() {
        let (_dir, runner, mut config, detector) = setup(r#"{"complete":false,"worked":false}"#, WorkMode::Loop);
        config.max_iterations = 4;
        let controller = IterationController::new(runner.clone(), config, detector).unwrap();

        assert_eq!(controller.run().await, LoopOutcome::MaxIterationsReached);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_threshold_disables_stagnation() {
        let (_dir, runner, mut config, detector) =
            setup(r#"{"complete":false,"worked":false}"#, WorkMode::Iterative);
        config.max_iterations = 3;
        config.stagnation_threshold = 0;
        let controller = IterationController::new(runner.clone(), config, detector).unwrap();

        assert_eq!(controller.run().await, LoopOutcome::MaxIterationsReached);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_milestone_every_ten() {
        let (_dir, runner, mut config, detector) = setup(r#"{"complete":false}"#, WorkMode::Loop);
        config.max_iterations = 10;
        let recorder = Arc::new(Recorder::default());
        let controller = IterationController::new(runner, config, detector)
            .unwrap()
            .with_observer(recorder.clone());
        controller.run().await;

        let events = recorder.events.lock().unwrap();
        let milestones = events.iter().filter(|e| *e == "iteration.milestone").count();
        assert_eq!(milestones, 1);
        assert_eq!(events.last().map(String::as_str), Some("run.max_iterations"));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (_dir, runner, config, detector) = setup(r#"{"complete":false}"#, WorkMode::Loop);
        let controller = IterationController::new(runner.clone(), config, detector).unwrap();
        controller.shutdown_handle().request();

        assert_eq!(controller.run().await, LoopOutcome::Interrupted);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_delay() {
        let (_dir, runner, mut config, detector) = setup(r#"{"complete":false}"#, WorkMode::Loop);
        config.skip_delay = false;
        config.delay = Duration::from_secs(30);
        let controller = IterationController::new(runner.clone(), config, detector).unwrap();
        let handle = controller.shutdown_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.request();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(5), controller.run())
            .await
            .unwrap();
        assert_eq!(outcome, LoopOutcome::Interrupted);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }
}
