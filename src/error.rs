use rusqlite::ffi;
use serde_json::json;

/// How a failed statement violated the schema, when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    Other,
}

#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    #[source]
    pub source: rusqlite::Error,
}

impl From<rusqlite::Error> for StoreError {
    fn from(source: rusqlite::Error) -> Self {
        let kind = match &source {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ffi::ErrorCode::ConstraintViolation => {
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreErrorKind::UniqueViolation
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => StoreErrorKind::ForeignKeyViolation,
                    ffi::SQLITE_CONSTRAINT_NOTNULL => StoreErrorKind::NotNullViolation,
                    _ => StoreErrorKind::Other,
                }
            }
            _ => StoreErrorKind::Other,
        };
        Self { kind, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("assessment period {period_id} is locked")]
    LockedPeriod { period_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Store(StoreError::from(e))
    }
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wire code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "bad_params",
            CoreError::Conflict(_) => "conflict",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::LockedPeriod { .. } => "period_locked",
            CoreError::Store(e) => match e.kind {
                StoreErrorKind::UniqueViolation => "conflict",
                StoreErrorKind::ForeignKeyViolation => "not_found",
                StoreErrorKind::NotNullViolation => "bad_params",
                StoreErrorKind::Other => "db_error",
            },
        }
    }

    /// HTTP-equivalent status for callers that sit behind a web layer.
    pub fn status(&self) -> u16 {
        match self.code() {
            "bad_params" | "period_locked" => 400,
            "unauthorized" => 401,
            "forbidden" => 403,
            "not_found" => 404,
            "conflict" => 409,
            _ => 500,
        }
    }

    pub fn details(&self) -> serde_json::Value {
        let mut details = json!({ "status": self.status() });
        match self {
            CoreError::NotFound { entity, id } => {
                details["entity"] = json!(entity);
                details["id"] = json!(id);
            }
            CoreError::LockedPeriod { period_id } => {
                details["periodId"] = json!(period_id);
            }
            _ => {}
        }
        details
    }

    /// Message safe to hand back to a caller. Raw store failures are logged,
    /// not echoed.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Store(e) => match e.kind {
                StoreErrorKind::UniqueViolation => "duplicate value violates a unique constraint".into(),
                StoreErrorKind::ForeignKeyViolation => "referenced record does not exist".into(),
                StoreErrorKind::NotNullViolation => "a required field is missing".into(),
                StoreErrorKind::Other => {
                    tracing::error!(error = %e, "store error");
                    "an internal error occurred".into()
                }
            },
            other => other.to_string(),
        }
    }
}
