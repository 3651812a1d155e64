use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The change-feed cursor can no longer be resumed. Recovered inside the
    /// poller by acquiring a fresh cursor; callers only ever observe the
    /// resulting reset notification.
    #[error("change feed cursor invalidated")]
    CursorInvalidated,

    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("watch callback failure: {0}")]
    Callback(String),
}

pub type Result<T> = std::result::Result<T, FsError>;
