use crate::{
  proto::{self, controller_client::ControllerClient, identity_client::IdentityClient},
  utils::{record_code, record_request, Record},
  ControllerCapabilities, ControllerPublishVolumeError, ControllerPublishVolumeRequest,
  ControllerPublishVolumeResponse, ControllerUnpublishVolumeError,
  ControllerUnpublishVolumeRequest, ListVolumesError, ListVolumesRequest, ListVolumesResponse,
  Plugin, PluginCapabilities, PluginInfo,
};
use async_trait::async_trait;
use tonic::{
  transport::{Channel, Endpoint},
  Status,
};
use tracing::instrument;

/// A [`Plugin`] reached over gRPC. Cloning is cheap and clones share the
/// underlying connection.
#[derive(Debug, Clone)]
pub struct GrpcPlugin {
  identity: IdentityClient<Channel>,
  controller: ControllerClient<Channel>,
}

impl GrpcPlugin {
  pub fn new(channel: Channel) -> Self {
    Self {
      identity: IdentityClient::new(channel.clone()),
      controller: ControllerClient::new(channel),
    }
  }

  /// Connects to the plugin endpoint, for instance `http://[::1]:10000`.
  pub async fn connect(dst: impl Into<String>) -> Result<Self, tonic::transport::Error> {
    let channel = Endpoint::from_shared(dst.into())?.connect().await?;
    Ok(Self::new(channel))
  }
}

#[async_trait]
impl Plugin for GrpcPlugin {
  #[instrument(
    name = "identity.get_plugin_info",
    skip(self),
    fields(name, vendor_version, code)
  )]
  async fn plugin_info(&self) -> Result<PluginInfo, Status> {
    let response = self
      .identity
      .clone()
      .get_plugin_info(proto::GetPluginInfoRequest {})
      .await
      .map_err(record_code)?
      .into_inner();

    let info: PluginInfo = response.try_into()?;
    info.name().record_field("name");
    info.vendor_version().record_field("vendor_version");
    Ok(info)
  }

  #[instrument(name = "identity.probe", skip(self), fields(ready, code))]
  async fn probe(&self) -> Result<bool, Status> {
    let response = self
      .identity
      .clone()
      .probe(proto::ProbeRequest {})
      .await
      .map_err(record_code)?
      .into_inner();

    Ok(response.ready.unwrap_or(true).record_field("ready"))
  }

  #[instrument(
    name = "identity.get_plugin_capabilities",
    skip(self),
    fields(response, code)
  )]
  async fn plugin_capabilities(&self) -> Result<PluginCapabilities, Status> {
    let response = self
      .identity
      .clone()
      .get_plugin_capabilities(proto::GetPluginCapabilitiesRequest {})
      .await
      .map_err(record_code)?
      .into_inner();

    Ok(PluginCapabilities::from(response).record_response())
  }

  #[instrument(
    name = "controller.controller_get_capabilities",
    skip(self),
    fields(response, code)
  )]
  async fn controller_capabilities(&self) -> Result<ControllerCapabilities, Status> {
    let response = self
      .controller
      .clone()
      .controller_get_capabilities(proto::ControllerGetCapabilitiesRequest {})
      .await
      .map_err(record_code)?
      .into_inner();

    Ok(ControllerCapabilities::from(response).record_response())
  }

  #[instrument(
    name = "controller.controller_publish_volume",
    skip(self, request),
    fields(request, response, code)
  )]
  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    let request: proto::ControllerPublishVolumeRequest = record_request(request).try_into()?;
    let response = self
      .controller
      .clone()
      .controller_publish_volume(request)
      .await
      .map_err(|status| ControllerPublishVolumeError::from_status(record_code(status)))?
      .into_inner();

    Ok(ControllerPublishVolumeResponse::from(response).record_response())
  }

  #[instrument(
    name = "controller.controller_unpublish_volume",
    skip(self, request),
    fields(request, code)
  )]
  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    let request: proto::ControllerUnpublishVolumeRequest = record_request(request).try_into()?;
    self
      .controller
      .clone()
      .controller_unpublish_volume(request)
      .await
      .map_err(record_code)?;

    Ok(())
  }

  #[instrument(
    name = "controller.list_volumes",
    skip(self, request),
    fields(request, entries, next_token, code)
  )]
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    let request: proto::ListVolumesRequest = record_request(request).into();
    let response = self
      .controller
      .clone()
      .list_volumes(request)
      .await
      .map_err(|status| ListVolumesError::from_status(record_code(status)))?
      .into_inner();

    let response: ListVolumesResponse = response.try_into()?;
    response.entries().len().record_field("entries");
    response.next_token().record_field("next_token");
    Ok(response)
  }
}
