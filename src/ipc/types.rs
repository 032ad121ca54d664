use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::db::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<Store>,
    pub slow_tx: Duration,
}

impl AppState {
    pub fn new(slow_tx: Duration) -> Self {
        Self {
            workspace: None,
            store: None,
            slow_tx,
        }
    }

    /// Opens (creating if needed) the database inside `path` and makes it
    /// the active workspace. The previous workspace stays open on failure.
    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let store = Store::open(&path, self.slow_tx)?;
        tracing::info!(workspace = %path.display(), "workspace opened");
        self.store = Some(store);
        self.workspace = Some(path);
        Ok(())
    }
}
