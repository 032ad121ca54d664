use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SLOW_TX_MS: u64 = 5000;
pub const DEFAULT_LOG_FILTER: &str = "schoold=info";

/// Daemon configuration loaded from environment variables.
///
/// | Env Var              | Default        |
/// |----------------------|----------------|
/// | `SCHOOLD_WORKSPACE`  | unset          |
/// | `SCHOOLD_SLOW_TX_MS` | `5000`         |
/// | `SCHOOLD_LOG`        | `RUST_LOG`, then `schoold=info` |
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Workspace opened at startup, as if `workspace.select` had been sent.
    pub workspace: Option<PathBuf>,
    /// Transactions held longer than this are logged.
    pub slow_tx: Duration,
    pub log_filter: String,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nonempty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let workspace = nonempty("SCHOOLD_WORKSPACE").map(PathBuf::from);

        let slow_tx_ms = match nonempty("SCHOOLD_SLOW_TX_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("SCHOOLD_SLOW_TX_MS must be a whole number of milliseconds, got {raw:?}"))?,
            None => DEFAULT_SLOW_TX_MS,
        };

        let log_filter = nonempty("SCHOOLD_LOG")
            .or_else(|| nonempty("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace,
            slow_tx: Duration::from_millis(slow_tx_ms),
            log_filter,
        })
    }
}
