use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The control loop or worker pool no longer accepts work.
    #[error("shutting down")]
    ShuttingDown,

    /// The work returned an error.
    #[error("task failed: {0:#}")]
    Failed(anyhow::Error),

    /// The work panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

pub type TaskResult<T> = Result<T, TaskError>;
