use crate::{proto, VolumeStatus};
use std::num::NonZeroU32;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Debug, Clone, Default)]
pub struct ListVolumesRequest {
  max_entries: Option<NonZeroU32>,
  starting_token: Option<String>,
}

impl ListVolumesRequest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_entries(mut self, max_entries: Option<NonZeroU32>) -> Self {
    self.max_entries = max_entries;
    self
  }

  pub fn with_starting_token(mut self, starting_token: Option<String>) -> Self {
    self.starting_token = starting_token.filter(|v| !v.is_empty());
    self
  }

  /// If specified, the Plugin MUST NOT return more entries than this number
  /// in the response. If not specified, it means there is no restriction on
  /// the number of entries that can be returned.
  #[inline]
  pub fn max_entries(&self) -> Option<NonZeroU32> {
    self.max_entries
  }

  /// A token to specify where to start paginating.
  #[inline]
  pub fn starting_token(&self) -> Option<&str> {
    self.starting_token.as_deref()
  }
}

impl From<ListVolumesRequest> for proto::ListVolumesRequest {
  fn from(value: ListVolumesRequest) -> Self {
    let max_entries = value
      .max_entries
      .map(|v| i32::try_from(v.get()).unwrap_or(i32::MAX))
      .unwrap_or_default();
    let starting_token = value.starting_token.unwrap_or_default();

    proto::ListVolumesRequest {
      max_entries,
      starting_token,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeListEntry {
  volume_id: String,
  /// Only meaningful when the plugin has the LIST_VOLUMES_PUBLISHED_NODES
  /// capability.
  status: Option<VolumeStatus>,
}

impl VolumeListEntry {
  pub fn new(volume_id: impl Into<String>, status: Option<VolumeStatus>) -> Self {
    Self {
      volume_id: volume_id.into(),
      status,
    }
  }

  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn status(&self) -> Option<&VolumeStatus> {
    self.status.as_ref()
  }

  /// Nodes the volume is published on. A missing status means none.
  pub fn published_node_ids(&self) -> &[String] {
    self
      .status
      .as_ref()
      .map(VolumeStatus::published_node_ids)
      .unwrap_or(&[])
  }
}

impl TryFrom<proto::list_volumes_response::Entry> for VolumeListEntry {
  type Error = Status;

  fn try_from(value: proto::list_volumes_response::Entry) -> Result<Self, Self::Error> {
    let volume_id = match value.volume {
      None => {
        return Err(Status::internal(
          "ListVolumesResponse.entry.volume missing",
        ))
      }
      Some(v) if v.volume_id.is_empty() => {
        return Err(Status::internal(
          "ListVolumesResponse.entry.volume.volume_id is empty",
        ))
      }
      Some(v) => v.volume_id,
    };

    let status = value.status.map(Into::into);

    Ok(VolumeListEntry { volume_id, status })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVolumesResponse {
  entries: Vec<VolumeListEntry>,
  /// Use as the `starting_token` of the next `ListVolumes` request.
  next_token: Option<String>,
}

impl ListVolumesResponse {
  pub fn new(entries: Vec<VolumeListEntry>, next_token: Option<String>) -> Self {
    Self {
      entries,
      next_token: next_token.filter(|v| !v.is_empty()),
    }
  }

  #[inline]
  pub fn entries(&self) -> &[VolumeListEntry] {
    &self.entries
  }

  #[inline]
  pub fn next_token(&self) -> Option<&str> {
    self.next_token.as_deref()
  }

  pub fn into_parts(self) -> (Vec<VolumeListEntry>, Option<String>) {
    (self.entries, self.next_token)
  }
}

impl TryFrom<proto::ListVolumesResponse> for ListVolumesResponse {
  type Error = Status;

  fn try_from(value: proto::ListVolumesResponse) -> Result<Self, Self::Error> {
    let entries = value
      .entries
      .into_iter()
      .map(TryInto::try_into)
      .collect::<Result<_, _>>()?;

    Ok(ListVolumesResponse::new(entries, Some(value.next_token)))
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ListVolumesError {
  /// Indicates that `starting_token` is not valid.
  #[error("Invalid `starting_token`: {0}")]
  InvalidStartingToken(String),

  #[error(transparent)]
  Other(#[from] Status),
}

impl ListVolumesError {
  pub fn from_status(status: Status) -> Self {
    match status.code() {
      Code::Aborted => ListVolumesError::InvalidStartingToken(status.message().to_owned()),
      _ => ListVolumesError::Other(status),
    }
  }

  pub fn code(&self) -> Code {
    match self {
      ListVolumesError::InvalidStartingToken(_) => Code::Aborted,
      ListVolumesError::Other(v) => v.code(),
    }
  }
}

impl From<ListVolumesError> for Status {
  fn from(value: ListVolumesError) -> Self {
    match value {
      ListVolumesError::Other(v) => v,
      value => Status::new(value.code(), value.to_string()),
    }
  }
}
