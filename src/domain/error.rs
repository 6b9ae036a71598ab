use thiserror::Error;

/// Failures reported by an object store.
#[derive(Clone, Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} was written concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("request rejected with status {code}: {reason}")]
    Rejected { code: u16, reason: String },

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("expected a {expected}, store returned a {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Outcome of a failed reconciliation pass, handed back to the event source.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch {kind} {name}")]
    Fetch {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create {kind} {name}")]
    Create {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update {kind} {name}")]
    Update {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot link {kind} {name} to its owner: {reason}")]
    OwnerLink {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid application spec: {0}")]
    Validation(String),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("{count} dependent(s) failed to converge: {summary}", count = .0.len(), summary = summarize(.0))]
    Converge(Vec<ReconcileError>),
}

impl ReconcileError {
    /// Whether running the pass again may succeed without a spec change.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Validation(_) | ReconcileError::Cancelled => false,
            ReconcileError::Converge(failures) => failures.iter().any(Self::is_retryable),
            _ => true,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcileError::Fetch { source, .. }
            | ReconcileError::Create { source, .. }
            | ReconcileError::Update { source, .. } => source.is_conflict(),
            ReconcileError::Converge(failures) => failures.iter().any(Self::is_conflict),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled)
    }
}

fn summarize(failures: &[ReconcileError]) -> String {
    failures
        .iter()
        .map(|failure| match failure {
            ReconcileError::Fetch { source, .. }
            | ReconcileError::Create { source, .. }
            | ReconcileError::Update { source, .. } => format!("{failure} ({source})"),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
