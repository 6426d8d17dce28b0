use crate::model::{ObjectKey, PersistentVolume, Pod, VolumeAttachment};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// The object changed since it was read. Re-reading and retrying is
  /// expected to succeed.
  #[error("Operation cannot be fulfilled on {kind} {name}: the object has been modified")]
  Conflict { kind: &'static str, name: String },

  #[error("{kind} {name} not found")]
  NotFound { kind: &'static str, name: String },

  /// The API server could not be reached or timed out.
  #[error("API unavailable: {0}")]
  Unavailable(String),

  #[error("{kind} {name} is invalid: {message}")]
  Invalid {
    kind: &'static str,
    name: String,
    message: String,
  },
}

impl ApiError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, ApiError::Conflict { .. } | ApiError::Unavailable(_))
  }
}

/// Read view over the orchestrator objects, kept current by a watch. Reads
/// never block and may lag behind writes issued through [`AttachmentClient`].
pub trait AttachmentLister: Send + Sync + 'static {
  fn volume_attachment(&self, name: &str) -> Option<Arc<VolumeAttachment>>;

  fn volume_attachments(&self) -> Vec<Arc<VolumeAttachment>>;

  fn persistent_volume(&self, name: &str) -> Option<Arc<PersistentVolume>>;

  fn pods(&self) -> Vec<Arc<Pod>>;

  /// The id the driver assigned to a node, as published in the node's
  /// CSINode object.
  fn csi_node_id(&self, node_name: &str, driver: &str) -> Option<String>;
}

/// Writes against the orchestrator API. Every write carries the
/// `resource_version` it was based on and fails with
/// [`ApiError::Conflict`] if the stored object moved on.
#[async_trait]
pub trait AttachmentClient: Send + Sync + 'static {
  /// Replaces the status of the attachment, leaving spec and metadata alone.
  async fn update_status(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, ApiError>;

  /// Replaces the metadata (finalizers, annotations) of the attachment. An
  /// attachment marked for deletion disappears once its last finalizer is
  /// removed.
  async fn update(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, ApiError>;

  async fn secret(&self, key: &ObjectKey) -> Result<HashMap<String, String>, ApiError>;
}

#[derive(Debug, Clone)]
pub enum Change<T> {
  Added(Arc<T>),
  Updated { old: Arc<T>, new: Arc<T> },
  Deleted(Arc<T>),
}

impl<T> Change<T> {
  /// The latest known state of the object.
  pub fn object(&self) -> &Arc<T> {
    match self {
      Change::Added(v) => v,
      Change::Updated { new, .. } => new,
      Change::Deleted(v) => v,
    }
  }
}

/// Change notification delivered by the watch behind the lister.
#[derive(Debug, Clone)]
pub enum Event {
  Attachment(Change<VolumeAttachment>),
  Volume(Change<PersistentVolume>),
  Pod(Change<Pod>),
}
