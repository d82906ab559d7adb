use thiserror::Error;

/// Failure classes surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    TransactionAbort,
    SchemaTooNew,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record with key `{key}` in store `{store}`")]
    NotFound { store: String, key: String },

    #[error("unit of work `{operation}` on store `{store}` aborted: {source}")]
    TransactionAborted {
        store: String,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("schema version {found} is newer than the supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record `{key}` in store `{store}` could not be (de)serialized: {source}")]
    CorruptRecord {
        store: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store `{store}` is not declared by unit of work `{operation}`")]
    OutOfScope {
        store: String,
        operation: &'static str,
    },

    #[error("store `{store}` has no index on `{index}`")]
    UnknownIndex { store: String, index: String },

    #[error("failed to open local store: {0}")]
    Open(#[source] sqlx::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound { .. } => ErrorClass::NotFound,
            StoreError::SchemaTooNew { .. } => ErrorClass::SchemaTooNew,
            StoreError::MalformedSnapshot(_)
            | StoreError::Validation(_)
            | StoreError::CorruptRecord { .. }
            | StoreError::UnknownIndex { .. } => ErrorClass::Validation,
            StoreError::TransactionAborted { .. }
            | StoreError::OutOfScope { .. }
            | StoreError::Open(_) => ErrorClass::TransactionAbort,
        }
    }

    /// Store name carried by the error, when there is one.
    pub fn store(&self) -> Option<&str> {
        match self {
            StoreError::NotFound { store, .. }
            | StoreError::TransactionAborted { store, .. }
            | StoreError::CorruptRecord { store, .. }
            | StoreError::OutOfScope { store, .. }
            | StoreError::UnknownIndex { store, .. } => Some(store.as_str()),
            _ => None,
        }
    }

    pub(crate) fn aborted(
        store: impl Into<String>,
        operation: &'static str,
    ) -> impl FnOnce(sqlx::Error) -> StoreError {
        let store = store.into();
        move |source| StoreError::TransactionAborted {
            store,
            operation,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
