use thiserror::Error;

/// Outcome of a refused store operation.
///
/// Every public store call either succeeds or reports exactly one of
/// these; none of them leaves partially applied state behind.
#[derive(Debug, Error)]
pub enum TaskflowError {
  #[error("{0}")]
  Validation(String),

  #[error("task not found: {0}")]
  TaskNotFound(String),

  #[error("category not found: {0}")]
  CategoryNotFound(String),

  #[error("{0}")]
  InvariantRefused(String),

  #[error("stored data is unreadable: {0}")]
  StorageCorrupt(#[source] serde_json::Error),

  #[error("storage failure: {0:#}")]
  Storage(anyhow::Error)
}

impl TaskflowError {
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      TaskflowError::TaskNotFound(_)
        | TaskflowError::CategoryNotFound(
          _
        )
    )
  }
}

pub type Result<T> =
  std::result::Result<T, TaskflowError>;
