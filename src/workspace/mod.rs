//! On-disk workspace layout.
//!
//! ```text
//! <root>/.wiggum/
//!   metadata.json   workspace settings and run bookkeeping
//!   status.json     written by the agent each iteration
//!   TODO.md         fallback task list
//!   logs/           iteration logs
//! ```

pub mod metadata;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::domain::WorkMode;
use crate::error::{Result, WiggumError};
use crate::status::CompletionDetector;

pub use metadata::{DEFAULT_MAX_ITERATIONS, DEFAULT_STAGNATION_THRESHOLD, MetadataStore, WorkspaceMetadata};

pub const WORKSPACE_DIR: &str = ".wiggum";
const METADATA_FILE: &str = "metadata.json";
const STATUS_FILE: &str = "status.json";
const TASK_LIST_FILE: &str = "TODO.md";
const LOGS_DIR: &str = "logs";

/// Options for creating a workspace
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub task: String,
    pub mode: WorkMode,
    pub max_iterations: Option<u32>,
    pub stagnation_threshold: Option<u32>,
    pub notification_url: Option<String>,
    /// Overwrite an existing workspace
    pub force: bool,
}

impl InitOptions {
    pub fn new(task: impl Into<String>, mode: WorkMode) -> Self {
        Self {
            task: task.into(),
            mode,
            max_iterations: None,
            stagnation_threshold: None,
            notification_url: None,
            force: false,
        }
    }
}

/// A `.wiggum` directory and the files in it
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl Workspace {
    /// Refer to the workspace under `root` without touching disk
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);
        Self {
            root,
            dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Open an existing workspace
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let workspace = Self::at(root);
        if !workspace.exists() {
            return Err(WiggumError::Workspace(format!(
                "no workspace at {} (run `wiggum init` first)",
                workspace.root.display()
            )));
        }
        Ok(workspace)
    }

    /// Create the layout, metadata and an initial task list
    pub fn init(root: impl Into<PathBuf>, options: InitOptions) -> Result<Self> {
        let workspace = Self::at(root);
        if workspace.exists() && !options.force {
            return Err(WiggumError::Workspace(format!(
                "workspace already exists at {} (use --force to overwrite)",
                workspace.dir.display()
            )));
        }

        fs::create_dir_all(workspace.logs_dir())?;

        let mut meta = WorkspaceMetadata::new(&options.task, options.mode);
        if let Some(max) = options.max_iterations {
            meta.max_iterations = max;
        }
        if let Some(threshold) = options.stagnation_threshold {
            meta.stagnation_threshold = threshold;
        }
        meta.notification_url = options.notification_url;
        workspace.write_metadata(&meta)?;

        fs::write(workspace.task_list_path(), initial_task_list(&options.task, options.mode))?;
        // A stale status file would make the new task look finished
        if workspace.status_path().exists() {
            fs::remove_file(workspace.status_path())?;
        }

        log::info!("Initialised {} workspace at {}", options.mode, workspace.dir.display());
        Ok(workspace)
    }

    pub fn exists(&self) -> bool {
        self.metadata_path().is_file()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn task_list_path(&self) -> PathBuf {
        self.dir.join(TASK_LIST_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join(LOGS_DIR)
    }

    /// Completion detector over this workspace's files
    pub fn detector(&self, completion_marker: &str) -> CompletionDetector {
        CompletionDetector::new(self.status_path(), self.task_list_path()).with_completion_marker(completion_marker)
    }

    fn write_metadata(&self, meta: &WorkspaceMetadata) -> Result<()> {
        let mut json = serde_json::to_string_pretty(meta)?;
        json.push('\n');
        let tmp = self.dir.join(format!("{}.tmp", METADATA_FILE));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.metadata_path())?;
        Ok(())
    }
}

impl MetadataStore for Workspace {
    fn read(&self) -> Result<WorkspaceMetadata> {
        let contents = fs::read_to_string(self.metadata_path())
            .map_err(|e| WiggumError::Workspace(format!("cannot read {}: {}", self.metadata_path().display(), e)))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn update(&self, apply: &mut dyn FnMut(&mut WorkspaceMetadata)) -> Result<WorkspaceMetadata> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| WiggumError::Workspace(e.to_string()))?;
        let mut meta = self.read()?;
        apply(&mut meta);
        meta.updated_at = Utc::now();
        self.write_metadata(&meta)?;
        Ok(meta)
    }
}

fn initial_task_list(task: &str, mode: WorkMode) -> String {
    match mode {
        WorkMode::Loop => format!(
            "# Task\n\n{}\n\n## Checklist\n\n- [ ] Break the task into checklist items\n",
            task
        ),
        WorkMode::Iterative => format!("# Task\n\n{}\n\n## Notes\n\n", task),
    }
}
