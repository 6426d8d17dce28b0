use crate::{arbiter::ArbiterError, store::ApiError};
use thiserror::Error;
use tonic::{Code, Status};

/// Whether a plugin call failing with `code` may succeed when retried.
pub fn is_retryable_code(code: Code) -> bool {
  matches!(
    code,
    Code::Cancelled
      | Code::DeadlineExceeded
      | Code::Unavailable
      | Code::ResourceExhausted
      | Code::Aborted
  )
}

/// Failure of one attach or detach pass over a single attachment.
#[derive(Debug, Error)]
pub enum SyncError {
  /// Attaching would break single writer access to the volume.
  #[error("attach of volume {volume} to node {node} denied: {reason}")]
  Conflict {
    volume: String,
    node: String,
    reason: String,
  },

  #[error(transparent)]
  Reference(#[from] ArbiterError),

  #[error("{0}")]
  InvalidSource(String),

  #[error("CSI node id of node {node} for driver {driver} is not known yet")]
  MissingNodeId { node: String, driver: String },

  #[error("{0}")]
  Plugin(Status),

  #[error(transparent)]
  Api(#[from] ApiError),
}

impl SyncError {
  pub fn is_retryable(&self) -> bool {
    match self {
      SyncError::Conflict { .. } => false,
      SyncError::Reference(_) => false,
      SyncError::InvalidSource(_) => false,
      SyncError::MissingNodeId { .. } => true,
      SyncError::Plugin(status) => is_retryable_code(status.code()),
      SyncError::Api(e) => e.is_retryable(),
    }
  }
}

impl From<Status> for SyncError {
  fn from(value: Status) -> Self {
    SyncError::Plugin(value)
  }
}

#[derive(Debug, Error)]
pub enum ControllerError {
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("Plugin discovery failed: {0}")]
  Discovery(#[from] Status),

  /// The watch feeding the controller ended. The caller is expected to
  /// restart the process.
  #[error("Watch event stream terminated")]
  WatchTerminated,
}
