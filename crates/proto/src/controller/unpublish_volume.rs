use crate::{proto, secrets::Secrets};
use std::collections::HashMap;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Debug, Clone)]
pub struct ControllerUnpublishVolumeRequest {
  volume_id: String,
  node_id: String,
  secrets: Secrets,
}

impl ControllerUnpublishVolumeRequest {
  pub fn new(volume_id: impl Into<String>, node_id: impl Into<String>) -> Self {
    Self {
      volume_id: volume_id.into(),
      node_id: node_id.into(),
      secrets: Secrets::default(),
    }
  }

  pub fn with_secrets(mut self, secrets: impl Into<Secrets>) -> Self {
    self.secrets = secrets.into();
    self
  }

  /// The ID of the volume.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The ID of the node. If the value is set, the SP MUST unpublish the
  /// volume from the specified node.
  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  /// This SHOULD be the same secrets passed to the ControllerPublishVolume
  /// call for the specified volume.
  #[inline]
  pub fn secrets(&self) -> &HashMap<String, String> {
    self.secrets.as_ref()
  }
}

impl TryFrom<ControllerUnpublishVolumeRequest> for proto::ControllerUnpublishVolumeRequest {
  type Error = Status;

  fn try_from(value: ControllerUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    if value.volume_id.is_empty() {
      return Err(Status::invalid_argument(
        "ControllerUnpublishVolumeRequest.volume_id is empty",
      ));
    }

    if value.node_id.is_empty() {
      return Err(Status::invalid_argument(
        "ControllerUnpublishVolumeRequest.node_id is empty",
      ));
    }

    Ok(proto::ControllerUnpublishVolumeRequest {
      volume_id: value.volume_id,
      node_id: value.node_id,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerUnpublishVolumeError {
  /// Indicates that a volume corresponding to the specified `volume_id`
  /// does not exist and is not assumed to be ControllerUnpublished from
  /// node corresponding to the specified `node_id`.
  #[error("Volume does not exist and volume not assumed ControllerUnpublished from node: {0}")]
  VolumeNotFound(String),

  /// Indicates that a node corresponding to the specified `node_id` does
  /// not exist and the volume corresponding to the specified `volume_id`
  /// is not assumed to be ControllerUnpublished from node.
  #[error("Node does not exist and volume not assumed ControllerUnpublished from node: {0}")]
  NodeNotFound(String),

  #[error(transparent)]
  Other(#[from] Status),
}

impl ControllerUnpublishVolumeError {
  pub fn code(&self) -> Code {
    match self {
      ControllerUnpublishVolumeError::VolumeNotFound(_) => Code::NotFound,
      ControllerUnpublishVolumeError::NodeNotFound(_) => Code::NotFound,
      ControllerUnpublishVolumeError::Other(v) => v.code(),
    }
  }
}

impl From<ControllerUnpublishVolumeError> for Status {
  fn from(value: ControllerUnpublishVolumeError) -> Self {
    match value {
      ControllerUnpublishVolumeError::Other(v) => v,
      value => Status::new(value.code(), value.to_string()),
    }
  }
}
