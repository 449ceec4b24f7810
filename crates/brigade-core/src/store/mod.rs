//! Narrow persistence boundary for runs and scenario templates.

mod run_db;
pub mod templates;

pub use run_db::RunDb;
pub use templates::ScenarioTemplate;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use crate::aggregate::ExecutionResult;
use crate::error::{BrigadeError, Result};
use crate::paths;

/// What the runner and CLI need from storage, and nothing more.
pub trait RunRepository: Send + Sync {
    fn save_run_snapshot(&self, result: &ExecutionResult) -> Result<()>;

    fn load_scenario_templates(&self) -> Result<Vec<ScenarioTemplate>>;

    /// Newest first.
    fn list_runs(&self) -> Result<Vec<ExecutionResult>>;

    fn load_run(&self, run_id: Uuid) -> Result<ExecutionResult>;
}

// ---------------------------------------------------------------------------
// FileRepository
// ---------------------------------------------------------------------------

/// `.brigade/runs.db` plus `.brigade/templates.yaml` under a project root.
pub struct FileRepository {
    root: PathBuf,
    db: RunDb,
}

impl FileRepository {
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::brigade_dir(root).is_dir() {
            return Err(BrigadeError::NotInitialized);
        }
        let db = RunDb::open(&paths::runs_db_path(root))?;
        Ok(Self {
            root: root.to_path_buf(),
            db,
        })
    }
}

impl RunRepository for FileRepository {
    fn save_run_snapshot(&self, result: &ExecutionResult) -> Result<()> {
        self.db.save(result)
    }

    fn load_scenario_templates(&self) -> Result<Vec<ScenarioTemplate>> {
        templates::load_templates(&self.root)
    }

    fn list_runs(&self) -> Result<Vec<ExecutionResult>> {
        self.db.list_all()
    }

    fn load_run(&self, run_id: Uuid) -> Result<ExecutionResult> {
        self.db.get(run_id)
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// In-process store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryRepository {
    runs: Mutex<Vec<ExecutionResult>>,
    templates: Vec<ScenarioTemplate>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: Vec<ScenarioTemplate>) -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            templates,
        }
    }
}

impl RunRepository for MemoryRepository {
    fn save_run_snapshot(&self, result: &ExecutionResult) -> Result<()> {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        match runs.iter_mut().find(|r| r.run_id == result.run_id) {
            Some(existing) => *existing = result.clone(),
            None => runs.push(result.clone()),
        }
        Ok(())
    }

    fn load_scenario_templates(&self) -> Result<Vec<ScenarioTemplate>> {
        Ok(self.templates.clone())
    }

    fn list_runs(&self) -> Result<Vec<ExecutionResult>> {
        let runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = runs.clone();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(all)
    }

    fn load_run(&self, run_id: Uuid) -> Result<ExecutionResult> {
        let runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.iter()
            .find(|r| r.run_id == run_id)
            .cloned()
            .ok_or_else(|| BrigadeError::RunNotFound(run_id.to_string()))
    }
}
