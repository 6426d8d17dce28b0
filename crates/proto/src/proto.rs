//! CO-side subset of `csi.v1`, covering the Identity and Controller calls an
//! attacher makes. Field tags follow `csi.proto`; unknown fields sent by newer
//! plugins are skipped by prost on decode.

/// Intentionally empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoRequest {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoResponse {
  /// The name MUST follow domain name notation format
  /// (https://tools.ietf.org/html/rfc1035#section-2.3.1). This field is
  /// REQUIRED.
  #[prost(string, tag = "1")]
  pub name: ::prost::alloc::string::String,
  /// This field is REQUIRED. Value of this field is opaque to the CO.
  #[prost(string, tag = "2")]
  pub vendor_version: ::prost::alloc::string::String,
  /// This field is OPTIONAL. Values are opaque to the CO.
  #[prost(map = "string, string", tag = "3")]
  pub manifest:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
/// Intentionally empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesRequest {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesResponse {
  /// All the capabilities that the controller service supports. This
  /// field is OPTIONAL.
  #[prost(message, repeated, tag = "1")]
  pub capabilities: ::prost::alloc::vec::Vec<PluginCapability>,
}
/// Specifies a capability of the plugin.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginCapability {
  #[prost(oneof = "plugin_capability::Type", tags = "1, 2")]
  pub r#type: ::core::option::Option<plugin_capability::Type>,
}
/// Nested message and enum types in `PluginCapability`.
pub mod plugin_capability {
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct Service {
    #[prost(enumeration = "service::Type", tag = "1")]
    pub r#type: i32,
  }
  /// Nested message and enum types in `Service`.
  pub mod service {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
      Unknown = 0,
      /// CONTROLLER_SERVICE indicates that the Plugin provides RPCs for
      /// the ControllerService.
      ControllerService = 1,
      /// VOLUME_ACCESSIBILITY_CONSTRAINTS indicates that the volumes for
      /// this plugin MAY NOT be equally accessible by all nodes in the
      /// cluster.
      VolumeAccessibilityConstraints = 2,
    }
  }
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct VolumeExpansion {
    #[prost(enumeration = "volume_expansion::Type", tag = "1")]
    pub r#type: i32,
  }
  /// Nested message and enum types in `VolumeExpansion`.
  pub mod volume_expansion {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
      Unknown = 0,
      Online = 1,
      Offline = 2,
    }
  }
  #[derive(Clone, PartialEq, ::prost::Oneof)]
  pub enum Type {
    /// Service that the plugin supports.
    #[prost(message, tag = "1")]
    Service(Service),
    #[prost(message, tag = "2")]
    VolumeExpansion(VolumeExpansion),
  }
}
/// Intentionally empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeRequest {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeResponse {
  /// This field is OPTIONAL. If not present, the caller SHALL assume
  /// that the plugin is in a ready state and is accepting calls to its
  /// Controller and/or Node services.
  #[prost(message, optional, tag = "1")]
  pub ready: ::core::option::Option<bool>,
}
/// Specify a capability of a volume.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeCapability {
  /// This is a REQUIRED field.
  #[prost(message, optional, tag = "3")]
  pub access_mode: ::core::option::Option<volume_capability::AccessMode>,
  /// Specifies what API the volume will be accessed using. One of the
  /// following fields MUST be specified.
  #[prost(oneof = "volume_capability::AccessType", tags = "1, 2")]
  pub access_type: ::core::option::Option<volume_capability::AccessType>,
}
/// Nested message and enum types in `VolumeCapability`.
pub mod volume_capability {
  /// Intentionally empty, for now.
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct BlockVolume {}
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct MountVolume {
    /// The filesystem type. This field is OPTIONAL.
    /// An empty string is equal to an unspecified field value.
    #[prost(string, tag = "1")]
    pub fs_type: ::prost::alloc::string::String,
    /// The mount options that can be used for the volume. This field is
    /// OPTIONAL. `mount_flags` MAY contain sensitive information.
    #[prost(string, repeated, tag = "2")]
    pub mount_flags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
  }
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct AccessMode {
    /// This field is REQUIRED.
    #[prost(enumeration = "access_mode::Mode", tag = "1")]
    pub mode: i32,
  }
  /// Nested message and enum types in `AccessMode`.
  pub mod access_mode {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
      Unknown = 0,
      SingleNodeWriter = 1,
      SingleNodeReaderOnly = 2,
      MultiNodeReaderOnly = 3,
      MultiNodeSingleWriter = 4,
      MultiNodeMultiWriter = 5,
    }
  }
  #[derive(Clone, PartialEq, ::prost::Oneof)]
  pub enum AccessType {
    #[prost(message, tag = "1")]
    Block(BlockVolume),
    #[prost(message, tag = "2")]
    Mount(MountVolume),
  }
}
/// Information about a specific volume.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Volume {
  /// The capacity of the volume in bytes. This field is OPTIONAL.
  #[prost(int64, tag = "1")]
  pub capacity_bytes: i64,
  /// The identifier for this volume, generated by the plugin.
  /// This field is REQUIRED.
  #[prost(string, tag = "2")]
  pub volume_id: ::prost::alloc::string::String,
  /// Opaque static properties of the volume. This field is OPTIONAL.
  #[prost(map = "string, string", tag = "3")]
  pub volume_context:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerPublishVolumeRequest {
  /// The ID of the volume to be used on a node.
  /// This field is REQUIRED.
  #[prost(string, tag = "1")]
  pub volume_id: ::prost::alloc::string::String,
  /// The ID of the node. This field is REQUIRED.
  #[prost(string, tag = "2")]
  pub node_id: ::prost::alloc::string::String,
  /// This is a REQUIRED field.
  #[prost(message, optional, tag = "3")]
  pub volume_capability: ::core::option::Option<VolumeCapability>,
  /// Indicates SP MUST publish the volume in readonly mode.
  /// CO MUST set this field to false if SP does not have the
  /// PUBLISH_READONLY controller capability.
  #[prost(bool, tag = "4")]
  pub readonly: bool,
  #[prost(map = "string, string", tag = "5")]
  pub secrets:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
  #[prost(map = "string, string", tag = "6")]
  pub volume_context:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerPublishVolumeResponse {
  /// Opaque static publish properties of the volume.
  #[prost(map = "string, string", tag = "1")]
  pub publish_context:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerUnpublishVolumeRequest {
  /// The ID of the volume. This field is REQUIRED.
  #[prost(string, tag = "1")]
  pub volume_id: ::prost::alloc::string::String,
  /// The ID of the node. This field is OPTIONAL.
  #[prost(string, tag = "2")]
  pub node_id: ::prost::alloc::string::String,
  #[prost(map = "string, string", tag = "3")]
  pub secrets:
    ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
/// Intentionally empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerUnpublishVolumeResponse {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListVolumesRequest {
  /// If specified (non-zero value), the Plugin MUST NOT return more
  /// entries than this number in the response.
  #[prost(int32, tag = "1")]
  pub max_entries: i32,
  /// An empty string is equal to an unspecified field value.
  #[prost(string, tag = "2")]
  pub starting_token: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListVolumesResponse {
  #[prost(message, repeated, tag = "1")]
  pub entries: ::prost::alloc::vec::Vec<list_volumes_response::Entry>,
  /// An empty string is equal to an unspecified field value.
  #[prost(string, tag = "2")]
  pub next_token: ::prost::alloc::string::String,
}
/// Nested message and enum types in `ListVolumesResponse`.
pub mod list_volumes_response {
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct VolumeStatus {
    /// A list of all `node_id` of nodes that the volume in this entry
    /// is controller published on.
    #[prost(string, repeated, tag = "1")]
    pub published_node_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
  }
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct Entry {
    /// This field is REQUIRED
    #[prost(message, optional, tag = "1")]
    pub volume: ::core::option::Option<super::Volume>,
    /// This field MUST be specified if the LIST_VOLUMES_PUBLISHED_NODES
    /// controller capability is supported.
    #[prost(message, optional, tag = "2")]
    pub status: ::core::option::Option<VolumeStatus>,
  }
}
/// Intentionally empty.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesRequest {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesResponse {
  #[prost(message, repeated, tag = "1")]
  pub capabilities: ::prost::alloc::vec::Vec<ControllerServiceCapability>,
}
/// Specifies a capability of the controller service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerServiceCapability {
  #[prost(oneof = "controller_service_capability::Type", tags = "1")]
  pub r#type: ::core::option::Option<controller_service_capability::Type>,
}
/// Nested message and enum types in `ControllerServiceCapability`.
pub mod controller_service_capability {
  #[derive(Clone, PartialEq, ::prost::Message)]
  pub struct Rpc {
    #[prost(enumeration = "rpc::Type", tag = "1")]
    pub r#type: i32,
  }
  /// Nested message and enum types in `RPC`.
  pub mod rpc {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
      Unknown = 0,
      CreateDeleteVolume = 1,
      PublishUnpublishVolume = 2,
      ListVolumes = 3,
      GetCapacity = 4,
      CreateDeleteSnapshot = 5,
      ListSnapshots = 6,
      CloneVolume = 7,
      PublishReadonly = 8,
      ExpandVolume = 9,
      ListVolumesPublishedNodes = 10,
      VolumeCondition = 11,
      GetVolume = 12,
    }
  }
  #[derive(Clone, PartialEq, ::prost::Oneof)]
  pub enum Type {
    /// RPC that the controller supports.
    #[prost(message, tag = "1")]
    Rpc(Rpc),
  }
}
/// Client implementations for the `csi.v1.Identity` service.
pub mod identity_client {
  use tonic::codegen::*;

  #[derive(Debug, Clone)]
  pub struct IdentityClient<T> {
    inner: tonic::client::Grpc<T>,
  }

  impl IdentityClient<tonic::transport::Channel> {
    /// Attempt to create a new client by connecting to a given endpoint.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
      D: TryInto<tonic::transport::Endpoint>,
      D::Error: Into<StdError>,
    {
      let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
      Ok(Self::new(conn))
    }
  }

  impl<T> IdentityClient<T>
  where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
  {
    pub fn new(inner: T) -> Self {
      let inner = tonic::client::Grpc::new(inner);
      Self { inner }
    }

    pub async fn get_plugin_info(
      &mut self,
      request: impl tonic::IntoRequest<super::GetPluginInfoRequest>,
    ) -> Result<tonic::Response<super::GetPluginInfoResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path = http::uri::PathAndQuery::from_static("/csi.v1.Identity/GetPluginInfo");
      self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn get_plugin_capabilities(
      &mut self,
      request: impl tonic::IntoRequest<super::GetPluginCapabilitiesRequest>,
    ) -> Result<tonic::Response<super::GetPluginCapabilitiesResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path = http::uri::PathAndQuery::from_static("/csi.v1.Identity/GetPluginCapabilities");
      self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn probe(
      &mut self,
      request: impl tonic::IntoRequest<super::ProbeRequest>,
    ) -> Result<tonic::Response<super::ProbeResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path = http::uri::PathAndQuery::from_static("/csi.v1.Identity/Probe");
      self.inner.unary(request.into_request(), path, codec).await
    }
  }
}
/// Client implementations for the `csi.v1.Controller` service.
pub mod controller_client {
  use tonic::codegen::*;

  #[derive(Debug, Clone)]
  pub struct ControllerClient<T> {
    inner: tonic::client::Grpc<T>,
  }

  impl<T> ControllerClient<T>
  where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
  {
    pub fn new(inner: T) -> Self {
      let inner = tonic::client::Grpc::new(inner);
      Self { inner }
    }

    pub async fn controller_publish_volume(
      &mut self,
      request: impl tonic::IntoRequest<super::ControllerPublishVolumeRequest>,
    ) -> Result<tonic::Response<super::ControllerPublishVolumeResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path =
        http::uri::PathAndQuery::from_static("/csi.v1.Controller/ControllerPublishVolume");
      self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn controller_unpublish_volume(
      &mut self,
      request: impl tonic::IntoRequest<super::ControllerUnpublishVolumeRequest>,
    ) -> Result<tonic::Response<super::ControllerUnpublishVolumeResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path =
        http::uri::PathAndQuery::from_static("/csi.v1.Controller/ControllerUnpublishVolume");
      self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn list_volumes(
      &mut self,
      request: impl tonic::IntoRequest<super::ListVolumesRequest>,
    ) -> Result<tonic::Response<super::ListVolumesResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path = http::uri::PathAndQuery::from_static("/csi.v1.Controller/ListVolumes");
      self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn controller_get_capabilities(
      &mut self,
      request: impl tonic::IntoRequest<super::ControllerGetCapabilitiesRequest>,
    ) -> Result<tonic::Response<super::ControllerGetCapabilitiesResponse>, tonic::Status> {
      self.inner.ready().await.map_err(|e| {
        tonic::Status::new(
          tonic::Code::Unknown,
          format!("Service was not ready: {}", e.into()),
        )
      })?;
      let codec = tonic::codec::ProstCodec::default();
      let path =
        http::uri::PathAndQuery::from_static("/csi.v1.Controller/ControllerGetCapabilities");
      self.inner.unary(request.into_request(), path, codec).await
    }
  }
}
