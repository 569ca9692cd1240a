use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum SyncError {
    #[error("issue #{number} not found")]
    NotFound { number: u64 },

    #[error("issue #{number} is not on the configured project board")]
    NotOnBoard { number: u64 },

    #[error("status '{status}' is not an option of the status field (available: {})", .available.join(", "))]
    UnknownStatus {
        status: String,
        available: Vec<String>,
    },

    #[error("pagination failed after cursor {}: {source}", .last_cursor.as_deref().unwrap_or("<start>"))]
    Pagination {
        last_cursor: Option<String>,
        #[source]
        source: Box<SyncError>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("run cancelled")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Errors that end the whole run rather than a single child.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotFound { .. } | Self::NotOnBoard { .. } | Self::UnknownStatus { .. }
        )
    }

    /// Only transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NotOnBoard { .. } => "not_on_board",
            Self::UnknownStatus { .. } => "unknown_status",
            Self::Pagination { .. } => "pagination",
            Self::Unauthorized(_) => "unauthorized",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Cancelled => "cancelled",
        }
    }

    /// A walk that fails before its first page reports the underlying error,
    /// so a missing issue stays a per-issue failure instead of a pagination abort.
    pub fn unwrap_first_page(self) -> Self {
        match self {
            Self::Pagination {
                last_cursor: None,
                source,
            } => *source,
            other => other,
        }
    }
}
