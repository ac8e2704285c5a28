use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use cli::display::{ConsoleObserver, describe_status_change};
use config::Config;

use wiggum::domain::LoopOutcome;
use wiggum::notification::{DEFAULT_NOTIFY_TIMEOUT, HttpNotifier, NotificationObserver, NotificationSettings};
use wiggum::process::{ExecutionMode, ProcessClient};
use wiggum::runner::{EngineConfig, IterationController};
use wiggum::status::{StatusWatcher, WatcherConfig};
use wiggum::storage::{FileLogSink, LogSink, NullLogSink};
use wiggum::workspace::{InitOptions, MetadataStore, Workspace};

/// How long to wait for queued notifications before exiting
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wiggum")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("wiggum.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

struct RunArgs {
    max_iterations: Option<u32>,
    delay_ms: Option<u64>,
    no_delay: bool,
    stream: bool,
    interactive: bool,
}

fn workspace_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.workspace {
        Some(path) => Ok(path.clone()),
        None => std::env::current_dir().context("Failed to resolve current directory"),
    }
}

fn agent_client(config: &Config) -> ProcessClient {
    ProcessClient::new(&config.agent.binary)
        .with_extra_args(config.agent.extra_args.clone())
        .with_zombie_timeout(config.agent.zombie_timeout())
        .with_kill_buffer(config.agent.kill_buffer())
}

/// Returns the process exit code
async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Init {
            task,
            mode,
            max_iterations,
            notify_url,
            force,
        } => {
            let mut options = config.init_options(task, *mode, *max_iterations);
            options.notification_url = notify_url.clone();
            options.force = *force;
            handle_init_command(cli, options)
        }
        Commands::Run {
            max_iterations,
            delay_ms,
            no_delay,
            stream,
            interactive,
        } => {
            let args = RunArgs {
                max_iterations: *max_iterations,
                delay_ms: *delay_ms,
                no_delay: *no_delay,
                stream: *stream,
                interactive: *interactive,
            };
            handle_run_command(cli, config, args).await
        }
        Commands::Status => handle_status_command(cli),
        Commands::Check => handle_check_command(config).await,
    }
}

fn handle_init_command(cli: &Cli, options: InitOptions) -> Result<i32> {
    let root = workspace_root(cli)?;
    info!("Initializing workspace at {} (mode: {})", root.display(), options.mode);
    let mode = options.mode;
    let workspace = Workspace::init(&root, options).context("Failed to initialize workspace")?;

    println!("{} {}", "Initialized:".green(), workspace.dir().display());
    println!("  mode:      {}", mode);
    println!("  task list: {}", workspace.task_list_path().display());
    println!("  status:    {}", workspace.status_path().display());
    Ok(0)
}

async fn handle_run_command(cli: &Cli, config: &Config, args: RunArgs) -> Result<i32> {
    let root = workspace_root(cli)?;
    let workspace = Arc::new(Workspace::open(&root).context("No workspace here; run `wiggum init` first")?);
    let metadata = workspace.read().context("Failed to read workspace metadata")?;

    let mut engine = EngineConfig::from_metadata(&metadata);
    if metadata.delay_ms.is_none() {
        engine.delay = config.engine.delay();
    }
    engine.shutdown_grace = config.engine.shutdown_grace();
    if let Some(max_iterations) = args.max_iterations {
        engine.max_iterations = max_iterations;
    }
    if let Some(delay_ms) = args.delay_ms {
        engine.delay = Duration::from_millis(delay_ms);
    }
    engine.skip_delay = args.no_delay;
    engine.execution = if args.interactive {
        ExecutionMode::Interactive
    } else if args.stream || config.engine.stream_output {
        ExecutionMode::Streamed
    } else {
        ExecutionMode::Captured
    };
    engine.cwd = Some(workspace.root().to_path_buf());

    let client = Arc::new(agent_client(config));
    if !client.is_available().await {
        eyre::bail!(
            "Agent binary '{}' is not available; run `wiggum check`",
            client.binary().display()
        );
    }

    let sink: Arc<dyn LogSink> = match FileLogSink::open(&workspace.logs_dir()) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            log::warn!("Iteration log disabled: {}", e);
            Arc::new(NullLogSink)
        }
    };

    let detector = workspace.detector(&metadata.completion_marker);
    let mut controller = IterationController::new(client, engine, detector)
        .context("Failed to build prompts")?
        .with_metadata_store(workspace.clone())
        .with_log_sink(sink)
        .with_observer(Arc::new(ConsoleObserver::new(cli.is_verbose())));

    let notifications = match metadata.notification_url.clone().or_else(|| config.notifications.url.clone()) {
        Some(url) => {
            let notifier = Arc::new(HttpNotifier::new(DEFAULT_NOTIFY_TIMEOUT)?);
            let settings = NotificationSettings {
                url,
                priority: config.notifications.priority.clone(),
                tags: config.notifications.tags.clone(),
                events: config.notifications.events.clone(),
            };
            let observer = Arc::new(NotificationObserver::new(notifier, settings, metadata.task.clone()));
            controller = controller.with_observer(observer.clone());
            Some(observer)
        }
        None => None,
    };

    let watcher_config = WatcherConfig {
        debounce: Duration::from_millis(config.watcher.debounce_ms),
        notify_only_meaningful: config.watcher.notify_only_meaningful,
    };
    let (mut watcher, mut changes) = StatusWatcher::channel(workspace.status_path(), watcher_config);
    if let Err(e) = watcher.start() {
        log::warn!("Status watcher unavailable: {}", e);
    }
    let verbose = cli.is_verbose();
    let forward_to = notifications.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            if verbose {
                println!("{}", describe_status_change(&change));
            }
            if let Some(observer) = &forward_to {
                observer.on_status_change(&change);
            }
        }
    });

    let shutdown = controller.shutdown_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if shutdown.request() == 1 {
                eprintln!("{}", "Stopping; press Ctrl-C again to kill the agent".yellow());
            } else {
                eprintln!("{}", "Killing the agent".red());
            }
        }
    });

    let outcome = controller.run().await;

    watcher.stop();
    // The watcher dropped its sender, so the forwarder drains and ends
    let _ = forwarder.await;
    if let Some(observer) = &notifications {
        observer.flush(NOTIFY_FLUSH_TIMEOUT).await;
    }

    print_outcome(&outcome);
    Ok(outcome.exit_code())
}

fn print_outcome(outcome: &LoopOutcome) {
    match outcome {
        LoopOutcome::Completed => println!("{}", "Task complete".green().bold()),
        LoopOutcome::StagnantCompleted => println!("{}", "Stopped: agent reported no more work".green()),
        LoopOutcome::MaxIterationsReached => println!("{}", "Stopped: reached the iteration limit".yellow()),
        LoopOutcome::Failed(reason) => println!("{} {}", "Failed:".red().bold(), reason),
        LoopOutcome::Interrupted => println!("{}", "Interrupted".yellow()),
    }
}

fn handle_status_command(cli: &Cli) -> Result<i32> {
    let root = workspace_root(cli)?;
    let workspace = Workspace::open(&root).context("No workspace here; run `wiggum init` first")?;
    let metadata = workspace.read().context("Failed to read workspace metadata")?;
    let detector = workspace.detector(&metadata.completion_marker);
    let record = detector.read_status();

    println!("{} {}", "Task:".green(), metadata.task);
    println!("  mode:       {}", metadata.mode);
    println!(
        "  iterations: {} (limit {})",
        metadata.iteration_count, metadata.max_iterations
    );
    if let Some(outcome) = &metadata.last_outcome {
        println!("  last run:   {}", outcome);
    }
    let complete = detector.is_complete(metadata.mode);
    println!(
        "  complete:   {}",
        if complete { "yes".green() } else { "no".yellow() }
    );
    if let Some(remaining) = detector.remaining_count(metadata.mode) {
        println!("  remaining:  {}", remaining);
    }
    if let Some(progress) = record.progress {
        println!("  progress:   {}/{}", progress.completed, progress.total);
    }
    if let Some(worked) = record.worked {
        println!("  worked:     {}", worked);
    }
    if let Some(summary) = &record.summary {
        println!("  summary:    {}", summary);
    }
    if let Some(updated) = &record.last_updated {
        println!("  updated:    {}", updated);
    }
    Ok(0)
}

async fn handle_check_command(config: &Config) -> Result<i32> {
    let client = agent_client(config);
    if client.is_available().await {
        println!("{} {}", "Found:".green(), client.binary().display());
        Ok(0)
    } else {
        println!("{} {}", "Missing:".red(), client.binary().display());
        Ok(1)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, &config).await.context("Application failed")?;

    std::process::exit(code);
}
