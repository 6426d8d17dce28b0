macro_rules! unsupported {
  ($name:expr) => {{
    ::tracing::error!("Unsupported method {} called", $name);
    return Err(
      ::tonic::Status::new(
        ::tonic::Code::Unimplemented,
        format!("Unsupported method {} called", $name),
      )
      .into(),
    );
  }};
}

pub mod controller;
pub mod volume;

mod client;
mod plugin;
mod proto;
mod secrets;
mod utils;

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tonic::Status;

pub use client::GrpcPlugin;
pub use controller::{
  ControllerCapabilities, ControllerPublishVolumeError, ControllerPublishVolumeRequest,
  ControllerPublishVolumeResponse, ControllerUnpublishVolumeError,
  ControllerUnpublishVolumeRequest, ListVolumesError, ListVolumesRequest, ListVolumesResponse,
  VolumeListEntry,
};
pub use plugin::PluginCapabilities;
pub use secrets::Secrets;
pub use volume::{AccessMode, AccessType, MountVolume, VolumeCapability, VolumeStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
  name: String,
  vendor_version: String,
  manifest: HashMap<String, String>,
}

impl PluginInfo {
  pub fn new(name: impl Into<String>, vendor_version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      vendor_version: vendor_version.into(),
      manifest: HashMap::new(),
    }
  }

  /// The name follows domain name notation format
  /// (<https://tools.ietf.org/html/rfc1035#section-2.3.1>). It is also the
  /// value orchestrators put in `VolumeAttachment.spec.attacher`.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Plugin version. Value of this field is opaque to the CO.
  #[inline]
  pub fn vendor_version(&self) -> &str {
    &self.vendor_version
  }

  #[inline]
  pub fn manifest(&self) -> &HashMap<String, String> {
    &self.manifest
  }
}

impl TryFrom<proto::GetPluginInfoResponse> for PluginInfo {
  type Error = Status;

  fn try_from(value: proto::GetPluginInfoResponse) -> Result<Self, Self::Error> {
    if value.name.is_empty() {
      return Err(Status::internal("GetPluginInfoResponse.name is empty"));
    }

    Ok(PluginInfo {
      name: value.name,
      vendor_version: value.vendor_version,
      manifest: value.manifest,
    })
  }
}

/// The calls a container orchestrator makes against the Identity and
/// Controller services of a CSI plugin.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
  /// Name and version of the plugin.
  async fn plugin_info(&self) -> Result<PluginInfo, Status>;

  /// Whether the plugin is ready to accept calls. A plugin that does not
  /// report readiness is assumed to be ready.
  async fn probe(&self) -> Result<bool, Status>;

  async fn plugin_capabilities(&self) -> Result<PluginCapabilities, Status>;

  async fn controller_capabilities(&self) -> Result<ControllerCapabilities, Status>;

  /// Makes a volume available on the given node. Only valid against plugins
  /// with the `PUBLISH_UNPUBLISH_VOLUME` controller capability.
  ///
  /// This operation is idempotent on the plugin side: publishing a volume
  /// already published on the node with a compatible capability replies OK.
  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError>;

  /// Reverse of `controller_publish_volume`. A volume that is already
  /// absent from the node replies OK.
  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError>;

  /// Lists volumes known to the plugin. Only valid against plugins with the
  /// `LIST_VOLUMES` controller capability.
  #[allow(unused_variables)]
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    unsupported!("ListVolumes")
  }
}

#[async_trait]
impl<T: Plugin + ?Sized> Plugin for Arc<T> {
  async fn plugin_info(&self) -> Result<PluginInfo, Status> {
    (**self).plugin_info().await
  }

  async fn probe(&self) -> Result<bool, Status> {
    (**self).probe().await
  }

  async fn plugin_capabilities(&self) -> Result<PluginCapabilities, Status> {
    (**self).plugin_capabilities().await
  }

  async fn controller_capabilities(&self) -> Result<ControllerCapabilities, Status> {
    (**self).controller_capabilities().await
  }

  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    (**self).controller_publish_volume(request).await
  }

  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    (**self).controller_unpublish_volume(request).await
  }

  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    (**self).list_volumes(request).await
  }
}
