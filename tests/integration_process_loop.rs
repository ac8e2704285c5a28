//! Full loop against a real subprocess
//!
//! The agent is a small shell script run through `/bin/sh`, so the process
//! client's argument handling, cwd and output capture are all exercised.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use wiggum::domain::{LoopOutcome, WorkMode};
use wiggum::process::ProcessClient;
use wiggum::runner::{EngineConfig, IterationController};
use wiggum::storage::FileLogSink;
use wiggum::workspace::{InitOptions, MetadataStore, Workspace};

/// Counts its invocations and reports completion on the second one
const TWO_STEP_AGENT: &str = r#"
n=$(cat .wiggum/count 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > .wiggum/count
if [ "$n" -ge 2 ]; then
  echo '{"complete":true,"progress":{"completed":2,"total":2}}' > .wiggum/status.json
else
  echo '{"complete":false,"progress":{"completed":1,"total":2}}' > .wiggum/status.json
fi
echo "agent pass $n"
"#;

const FAILING_AGENT: &str = r#"
echo "working"
echo "boom" >&2
exit 7
"#;

fn write_agent(dir: &Path, body: &str) -> String {
    let path = dir.join("agent.sh");
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

fn setup(agent: &str) -> (TempDir, TempDir, Arc<Workspace>, Arc<ProcessClient>) {
    let project = TempDir::new().unwrap();
    let scripts = TempDir::new().unwrap();
    let workspace = Workspace::init(project.path(), InitOptions::new("two step task", WorkMode::Loop)).unwrap();
    let script = write_agent(scripts.path(), agent);
    let client = ProcessClient::new("/bin/sh")
        .with_extra_args(vec![script])
        .with_zombie_timeout(Duration::from_secs(30));
    (project, scripts, Arc::new(workspace), Arc::new(client))
}

fn engine_config(workspace: &Workspace) -> EngineConfig {
    let mut config = EngineConfig::from_metadata(&workspace.read().unwrap());
    config.max_iterations = 5;
    config.skip_delay = true;
    config.cwd = Some(workspace.root().to_path_buf());
    config
}

#[tokio::test]
async fn test_real_agent_completes_on_second_pass() {
    let (_project, _scripts, workspace, client) = setup(TWO_STEP_AGENT);
    let sink = Arc::new(FileLogSink::open(&workspace.logs_dir()).unwrap());
    let detector = workspace.detector(&workspace.read().unwrap().completion_marker);
    let controller = IterationController::new(client, engine_config(&workspace), detector)
        .unwrap()
        .with_metadata_store(workspace.clone())
        .with_log_sink(sink);

    assert_eq!(controller.run().await, LoopOutcome::Completed);

    let count = std::fs::read_to_string(workspace.dir().join("count")).unwrap();
    assert_eq!(count.trim(), "2");

    let raw = std::fs::read_to_string(workspace.logs_dir().join("iterations.log")).unwrap();
    assert!(raw.contains("agent pass 1"));
    assert!(raw.contains("agent pass 2"));

    let metadata = workspace.read().unwrap();
    assert_eq!(metadata.iteration_count, 2);
    assert_eq!(metadata.last_outcome.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_real_agent_failure_stops_loop() {
    let (_project, _scripts, workspace, client) = setup(FAILING_AGENT);
    let sink = Arc::new(FileLogSink::open(&workspace.logs_dir()).unwrap());
    let detector = workspace.detector(&workspace.read().unwrap().completion_marker);
    let controller = IterationController::new(client, engine_config(&workspace), detector)
        .unwrap()
        .with_log_sink(sink);

    match controller.run().await {
        LoopOutcome::Failed(reason) => {
            assert!(reason.contains("7"));
            assert!(reason.contains("boom"));
        }
        other => panic!("Expected failure, got {:?}", other),
    }

    let raw = std::fs::read_to_string(workspace.logs_dir().join("iterations.log")).unwrap();
    assert!(raw.contains("working"));
    assert!(raw.contains("[stderr] boom"));
}
