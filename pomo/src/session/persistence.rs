// Persistence for the task history
// Tasks are stored in $STATE_DIR/tasks.json; every write is a locked
// read-modify-write finished by an atomic temp-file rename

use crate::error::{PomoError, Result};
use crate::session::config::Config;
use crate::task::functional::{find_by_id, find_by_id_mut, for_each_mut, max_id, remove_by_id};
use crate::task::{Task, TaskId, ROOT_ID};
use anyhow::Context;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Window over a task's earliest pomodoro start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Everything, including tasks that were never started
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    pub fn contains(&self, task: &Task) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(start) = task.earliest_start() else {
            return false;
        };
        self.since.map_or(true, |since| start >= since)
            && self.until.map_or(true, |until| start < until)
    }
}

/// Key-addressed task storage used by the CLI and the session runtime
///
/// Every call is atomic with respect to the others: a reader never sees a
/// partially written task.
pub trait TaskStore: Send + Sync {
    /// Read one task with its pomodoros and subtasks; id 0 returns the
    /// synthetic root holding every top-level task
    fn read_task(&self, id: TaskId) -> Result<Task>;

    /// Top-level tasks whose earliest start falls in `range`, in id order
    fn read_tasks(&self, range: TimeRange) -> Result<Vec<Task>>;

    /// Create (id 0) or fully replace (id > 0) a task; returns its id
    fn write_task(&self, task: &Task) -> Result<TaskId>;

    fn delete_task(&self, id: TaskId) -> Result<()>;
}

/// On-disk layout of tasks.json
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct TaskFile {
    /// Next task ID to assign
    next_id: TaskId,
    /// Top-level tasks; subtasks are nested inside them
    tasks: Vec<Task>,
}

impl Default for TaskFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            tasks: Vec::new(),
        }
    }
}

impl TaskFile {
    fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Give every id-0 node in `task` a fresh id
    fn assign_ids(&mut self, task: &mut Task) {
        for_each_mut(task, |node| {
            if node.id == ROOT_ID {
                node.id = self.allocate_id();
            }
        });
    }
}

/// JSON-file task store with exclusive file locking
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    tasks_file: PathBuf,
    lock_file: PathBuf,
}

impl JsonTaskStore {
    pub fn new(config: &Config) -> Self {
        Self {
            tasks_file: config.tasks_file(),
            lock_file: config.lock_file(),
        }
    }

    /// Create the state directory and an empty tasks file if missing
    pub fn init(config: &Config) -> Result<Self> {
        let store = Self::new(config);
        store
            .with_lock(true, |store| {
                if !store.tasks_file.exists() {
                    store.save(&TaskFile::default())?;
                }
                Ok(())
            })
            .map_err(PomoError::persistence)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.tasks_file
    }

    /// Run `f` while holding the store lock (exclusive for writers)
    fn with_lock<T>(
        &self,
        exclusive: bool,
        f: impl FnOnce(&Self) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_file)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_file.display()))?;

        if exclusive {
            lock.lock_exclusive()
                .with_context(|| "Failed to acquire exclusive lock on tasks file")?;
        } else {
            lock.lock_shared()
                .with_context(|| "Failed to acquire shared lock on tasks file")?;
        }

        // Lock is released when `lock` is dropped
        f(self)
    }

    fn load(&self) -> anyhow::Result<TaskFile> {
        if !self.tasks_file.exists() {
            return Ok(TaskFile::default());
        }

        let contents = fs::read_to_string(&self.tasks_file)
            .with_context(|| format!("Failed to read tasks file: {}", self.tasks_file.display()))?;

        if contents.trim().is_empty() {
            return Ok(TaskFile::default());
        }

        let mut file: TaskFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse tasks file: {}", self.tasks_file.display()))?;

        // Guard against hand-edited files reusing ids
        let highest = file.tasks.iter().map(max_id).max().unwrap_or(0);
        file.next_id = file.next_id.max(highest + 1);
        Ok(file)
    }

    fn save(&self, file: &TaskFile) -> anyhow::Result<()> {
        let contents =
            serde_json::to_string_pretty(file).with_context(|| "Failed to serialize tasks")?;
        atomic_write(&self.tasks_file, &contents)
    }

    fn read<T>(&self, f: impl FnOnce(TaskFile) -> Result<T>) -> Result<T> {
        let file = self
            .with_lock(false, |store| store.load())
            .map_err(PomoError::persistence)?;
        f(file)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut TaskFile) -> Result<T>) -> Result<T> {
        let mut outcome = None;
        self.with_lock(true, |store| {
            let mut file = store.load()?;
            let result = f(&mut file);
            if result.is_ok() {
                store.save(&file)?;
            }
            outcome = Some(result);
            Ok(())
        })
        .map_err(PomoError::persistence)?;
        outcome.unwrap_or_else(|| {
            Err(PomoError::PersistenceFailure(
                "store update did not run".to_string(),
            ))
        })
    }
}

impl TaskStore for JsonTaskStore {
    fn read_task(&self, id: TaskId) -> Result<Task> {
        self.read(|file| {
            let root = Task::root(file.tasks);
            if id == ROOT_ID {
                return Ok(root);
            }
            find_by_id(&root, id)
                .cloned()
                .ok_or(PomoError::NotFound(id))
        })
    }

    fn read_tasks(&self, range: TimeRange) -> Result<Vec<Task>> {
        self.read(|file| {
            let mut tasks: Vec<Task> = file
                .tasks
                .into_iter()
                .filter(|task| range.contains(task))
                .collect();
            tasks.sort_by_key(|task| task.id);
            Ok(tasks)
        })
    }

    fn write_task(&self, task: &Task) -> Result<TaskId> {
        let mut task = task.clone();
        let is_new = task.id == ROOT_ID;
        self.modify(|file| {
            file.assign_ids(&mut task);
            let id = task.id;

            if is_new {
                file.tasks.push(task);
                return Ok(id);
            }

            let mut root = Task::root(std::mem::take(&mut file.tasks));
            let result = match find_by_id_mut(&mut root, id) {
                Some(slot) => {
                    *slot = task;
                    Ok(id)
                }
                None => Err(PomoError::NotFound(id)),
            };
            file.tasks = root.subtasks;
            result
        })
    }

    fn delete_task(&self, id: TaskId) -> Result<()> {
        if id == ROOT_ID {
            return Err(PomoError::invalid("cannot delete the root task"));
        }
        self.modify(|file| {
            let mut root = Task::root(std::mem::take(&mut file.tasks));
            let removed = remove_by_id(&mut root, id);
            file.tasks = root.subtasks;
            removed.map(|_| ()).ok_or(PomoError::NotFound(id))
        })
    }
}

/// Atomically save data to a file using write-to-temp + rename
/// Readers see either the old or the new file, never a partial one
pub fn atomic_write(path: &Path, contents: &str) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    // Create temp file in same directory to ensure same filesystem for rename
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    {
        use std::io::Write;
        let mut temp = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        temp.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        temp.sync_all()
            .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::functional::flatten;
    use crate::task::Pomodoro;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_store() -> (JsonTaskStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::in_dir(temp_dir.path().to_path_buf());
        (JsonTaskStore::init(&config).unwrap(), temp_dir)
    }

    fn new_task(message: &str) -> Task {
        Task::new(message, vec!["work".to_string()], Duration::from_secs(25 * 60), 2).unwrap()
    }

    fn started_at(mut task: Task, hour: u32) -> Task {
        task.pomodoros[0] = Pomodoro {
            start: Some(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()),
            end: None,
        };
        task
    }

    #[test]
    fn test_create_assigns_positive_ids() {
        let (store, _temp) = test_store();
        let first = store.write_task(&new_task("first")).unwrap();
        let second = store.write_task(&new_task("second")).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let loaded = store.read_task(second).unwrap();
        assert_eq!(loaded.message, "second");
        assert_eq!(loaded.pomodoros.len(), 2);
        assert_eq!(loaded.tags, vec!["work".to_string()]);
    }

    #[test]
    fn test_nested_subtasks_roundtrip() {
        let (store, _temp) = test_store();
        let mut parent = new_task("parent");
        let mut child = new_task("child");
        child.subtasks.push(new_task("grandchild"));
        parent.subtasks.push(child);

        let id = store.write_task(&parent).unwrap();
        let loaded = store.read_task(id).unwrap();
        let ids: Vec<TaskId> = flatten(&loaded).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // nested tasks are addressable directly
        assert_eq!(store.read_task(3).unwrap().message, "grandchild");
    }

    #[test]
    fn test_update_replaces_whole_task() {
        let (store, _temp) = test_store();
        let id = store.write_task(&new_task("draft")).unwrap();

        let mut task = store.read_task(id).unwrap();
        task.message = "final".to_string();
        task.subtasks.push(new_task("added later"));
        assert_eq!(store.write_task(&task).unwrap(), id);

        let loaded = store.read_task(id).unwrap();
        assert_eq!(loaded.message, "final");
        assert_eq!(loaded.subtasks.len(), 1);
        assert_eq!(loaded.subtasks[0].id, 2);
        assert_eq!(store.read_tasks(TimeRange::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (store, _temp) = test_store();
        let mut task = new_task("ghost");
        task.id = 42;
        assert!(matches!(store.write_task(&task), Err(PomoError::NotFound(42))));
        assert!(matches!(store.read_task(42), Err(PomoError::NotFound(42))));
    }

    #[test]
    fn test_read_root_holds_forest() {
        let (store, _temp) = test_store();
        store.write_task(&new_task("a")).unwrap();
        store.write_task(&new_task("b")).unwrap();
        let root = store.read_task(ROOT_ID).unwrap();
        assert!(root.is_root());
        assert_eq!(root.subtasks.len(), 2);
    }

    #[test]
    fn test_read_tasks_by_time_range() {
        let (store, _temp) = test_store();
        store.write_task(&started_at(new_task("early"), 8)).unwrap();
        store.write_task(&started_at(new_task("late"), 14)).unwrap();
        store.write_task(&new_task("never started")).unwrap();

        assert_eq!(store.read_tasks(TimeRange::all()).unwrap().len(), 3);

        let since_noon = TimeRange::since(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let tasks = store.read_tasks(since_noon).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].message, "late");
    }

    #[test]
    fn test_delete_task() {
        let (store, _temp) = test_store();
        let mut parent = new_task("parent");
        parent.subtasks.push(new_task("child"));
        let id = store.write_task(&parent).unwrap();

        store.delete_task(2).unwrap();
        assert!(store.read_task(id).unwrap().subtasks.is_empty());

        store.delete_task(id).unwrap();
        assert!(matches!(store.delete_task(id), Err(PomoError::NotFound(_))));
        assert!(matches!(
            store.delete_task(ROOT_ID),
            Err(PomoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let (store, _temp) = test_store();
        let first = store.write_task(&new_task("a")).unwrap();
        store.delete_task(first).unwrap();
        let second = store.write_task(&new_task("b")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_corrupt_file_is_persistence_failure() {
        let (store, _temp) = test_store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.read_task(1),
            Err(PomoError::PersistenceFailure(_))
        ));
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        atomic_write(&path, "{}").unwrap();
        atomic_write(&path, "{\"tasks\": []}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"tasks\": []}");
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
