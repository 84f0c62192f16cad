use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

/// Layout version written into every task file.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_STORAGE_KEY: &str = "tasks";

/// Whole-collection persistence for tasks.
///
/// Callers always read the full collection, transform it in memory and write
/// it back; implementations never merge.
pub trait TaskRepository {
    fn load_all_tasks(&self) -> anyhow::Result<Vec<Task>>;

    fn save_all_tasks(&self, tasks: &[Task]) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

#[derive(Serialize)]
struct StoredTasksRef<'a> {
    version: u32,
    tasks: &'a [Task],
}


impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, storage_key: &str) -> anyhow::Result<Self> {
        let key = storage_key.trim();
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(anyhow!("invalid storage key: {storage_key:?}"));
        }

        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join(format!("{key}.json"));

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }
}

impl TaskRepository for DataStore {
    #[tracing::instrument(skip(self))]
    fn load_all_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_task_file(&self.tasks_path)
            .with_context(|| format!("failed to load {}", self.tasks_path.display()))
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save_all_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_task_file_atomic(&self.tasks_path, tasks)
            .with_context(|| format!("failed to save {}", self.tasks_path.display()))
    }
}

/// Repository held entirely in memory.
///
/// `fail_saves` makes every subsequent save return an error, which lets
/// callers exercise their failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RefCell<Vec<Task>>,
    fail_saves: Cell<bool>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RefCell::new(tasks),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.borrow().clone()
    }
}

impl TaskRepository for MemoryStore {
    fn load_all_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.tasks.borrow().clone())
    }

    fn save_all_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        if self.fail_saves.get() {
            return Err(anyhow!("memory store is refusing writes"));
        }
        *self.tasks.borrow_mut() = tasks.to_vec();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_task_file(path: &Path) -> anyhow::Result<Vec<Task>> {
    if !path.exists() {
        debug!(file = %path.display(), "task file missing; starting empty");
        return Ok(Vec::new());
    }

    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let stored: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;

    let entries = match stored {
        Value::Object(mut root) => {
            let version = root
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow!("{} has no numeric \"version\" field", path.display()))?;
            if version > u64::from(SCHEMA_VERSION) {
                return Err(anyhow!(
                    "{} was written by a newer version (schema {version}, supported {SCHEMA_VERSION})",
                    path.display()
                ));
            }
            match root.remove("tasks") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(anyhow!(
                        "{} has no \"tasks\" array",
                        path.display()
                    ));
                }
            }
        }
        Value::Array(entries) => {
            warn!(file = %path.display(), "task file has no schema version; it will be upgraded on next save");
            entries
        }
        _ => {
            return Err(anyhow!(
                "{} must hold a task object or array",
                path.display()
            ));
        }
    };

    let tasks = entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            serde_json::from_value::<Task>(entry)
                .with_context(|| format!("invalid task #{} in {}", idx + 1, path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    debug!(count = tasks.len(), "loaded tasks");
    Ok(tasks)
}

#[tracing::instrument(skip(path, tasks))]
fn save_task_file_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving tasks atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let payload = StoredTasksRef {
        version: SCHEMA_VERSION,
        tasks,
    };
    serde_json::to_writer_pretty(&mut temp, &payload)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
