use crate::{proto, secrets::Secrets, VolumeCapability};
use std::collections::HashMap;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Debug, Clone)]
pub struct ControllerPublishVolumeRequest {
  volume_id: String,
  node_id: String,
  volume_capability: VolumeCapability,
  readonly: bool,
  secrets: Secrets,
  volume_context: HashMap<String, String>,
}

impl ControllerPublishVolumeRequest {
  pub fn new(
    volume_id: impl Into<String>,
    node_id: impl Into<String>,
    volume_capability: VolumeCapability,
  ) -> Self {
    Self {
      volume_id: volume_id.into(),
      node_id: node_id.into(),
      volume_capability,
      readonly: false,
      secrets: Secrets::default(),
      volume_context: HashMap::new(),
    }
  }

  pub fn with_readonly(mut self, readonly: bool) -> Self {
    self.readonly = readonly;
    self
  }

  pub fn with_secrets(mut self, secrets: impl Into<Secrets>) -> Self {
    self.secrets = secrets.into();
    self
  }

  pub fn with_volume_context(mut self, volume_context: HashMap<String, String>) -> Self {
    self.volume_context = volume_context;
    self
  }

  /// The ID of the volume to be used on a node.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// The ID of the node, matching the node ID returned by `NodeGetInfo`.
  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  /// Volume capability describing how the CO intends to use this volume.
  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  /// Indicates SP MUST publish the volume in readonly mode.
  /// CO MUST set this field to false if SP does not have the
  /// PUBLISH_READONLY controller capability.
  #[inline]
  pub fn readonly(&self) -> bool {
    self.readonly
  }

  #[inline]
  pub fn secrets(&self) -> &HashMap<String, String> {
    self.secrets.as_ref()
  }

  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl TryFrom<ControllerPublishVolumeRequest> for proto::ControllerPublishVolumeRequest {
  type Error = Status;

  fn try_from(value: ControllerPublishVolumeRequest) -> Result<Self, Self::Error> {
    if value.volume_id.is_empty() {
      return Err(Status::invalid_argument(
        "ControllerPublishVolumeRequest.volume_id is empty",
      ));
    }

    if value.node_id.is_empty() {
      return Err(Status::invalid_argument(
        "ControllerPublishVolumeRequest.node_id is empty",
      ));
    }

    Ok(proto::ControllerPublishVolumeRequest {
      volume_id: value.volume_id,
      node_id: value.node_id,
      volume_capability: Some(value.volume_capability.into()),
      readonly: value.readonly,
      secrets: value.secrets.into(),
      volume_context: value.volume_context,
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerPublishVolumeResponse {
  /// Opaque static publish properties of the volume. The contents of this
  /// field SHALL be opaque to a CO and safe for it to cache.
  publish_context: HashMap<String, String>,
}

impl ControllerPublishVolumeResponse {
  pub fn new(publish_context: HashMap<String, String>) -> Self {
    Self { publish_context }
  }

  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }

  #[inline]
  pub fn into_publish_context(self) -> HashMap<String, String> {
    self.publish_context
  }
}

impl From<proto::ControllerPublishVolumeResponse> for ControllerPublishVolumeResponse {
  fn from(value: proto::ControllerPublishVolumeResponse) -> Self {
    Self {
      publish_context: value.publish_context,
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerPublishVolumeError {
  /// Indicates that a volume corresponding to the specified `volume_id` does not exist.
  #[error("Volume does not exist: {0}")]
  VolumeDoesNotExist(String),

  /// Indicates that a node corresponding to the specified `node_id` does not exist.
  #[error("Node does not exist: {0}")]
  NodeDoesNotExist(String),

  /// Indicates that a volume corresponding to the specified `volume_id` has already been
  /// published at the node corresponding to the specified `node_id` but is incompatible
  /// with the specified `volume_capability` or `readonly` flag.
  #[error("Volume published but is incompatible: {0}")]
  AlreadyExists(String),

  /// Indicates that a volume corresponding to the specified `volume_id` has already been
  /// published at another node and does not have MULTI_NODE volume capability.
  #[error("Volume published to another node: {0}")]
  PublishedToAnotherNode(String),

  /// Indicates that the maximum supported number of volumes that can be attached to the
  /// specified node are already attached.
  #[error("Max volumes attached: {0}")]
  MaxVolumesAttached(String),

  #[error(transparent)]
  Other(#[from] Status),
}

impl ControllerPublishVolumeError {
  /// Maps a status returned by the plugin onto the documented error cases.
  /// `NOT_FOUND` is left as is since it can refer to either the volume or
  /// the node.
  pub fn from_status(status: Status) -> Self {
    let message = status.message().to_owned();
    match status.code() {
      Code::AlreadyExists => ControllerPublishVolumeError::AlreadyExists(message),
      Code::FailedPrecondition => ControllerPublishVolumeError::PublishedToAnotherNode(message),
      Code::ResourceExhausted => ControllerPublishVolumeError::MaxVolumesAttached(message),
      _ => ControllerPublishVolumeError::Other(status),
    }
  }

  pub fn code(&self) -> Code {
    match self {
      ControllerPublishVolumeError::VolumeDoesNotExist(_) => Code::NotFound,
      ControllerPublishVolumeError::NodeDoesNotExist(_) => Code::NotFound,
      ControllerPublishVolumeError::AlreadyExists(_) => Code::AlreadyExists,
      ControllerPublishVolumeError::PublishedToAnotherNode(_) => Code::FailedPrecondition,
      ControllerPublishVolumeError::MaxVolumesAttached(_) => Code::ResourceExhausted,
      ControllerPublishVolumeError::Other(v) => v.code(),
    }
  }
}

impl From<ControllerPublishVolumeError> for Status {
  fn from(value: ControllerPublishVolumeError) -> Status {
    match value {
      ControllerPublishVolumeError::Other(v) => v,
      value => Status::new(value.code(), value.to_string()),
    }
  }
}
