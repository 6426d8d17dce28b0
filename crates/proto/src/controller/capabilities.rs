use bitflags::bitflags;

use crate::proto;

#[rustfmt::skip]
bitflags! {
  pub struct ControllerCapabilities: u32 {
    const CREATE_DELETE_VOLUME         = 0b_0000_0000_0000_0001;
    const PUBLISH_UNPUBLISH_VOLUME     = 0b_0000_0000_0000_0010;
    const LIST_VOLUMES                 = 0b_0000_0000_0000_0100;
    const GET_CAPACITY                 = 0b_0000_0000_0000_1000;

    /// Currently the only way to consume a snapshot is to create
    /// a volume from it. Therefore plugins supporting
    /// `CREATE_DELETE_SNAPSHOT` MUST support creating volume from
    /// snapshot.
    const CREATE_DELETE_SNAPSHOT       = 0b_0000_0000_0001_0000;
    const LIST_SNAPSHOTS               = 0b_0000_0000_0010_0000;

    /// Plugins supporting volume cloning at the storage level MAY
    /// report this capability. The source volume MUST be managed by
    /// the same plugin. Not all volume sources and parameters
    /// combinations MAY work.
    const CLONE_VOLUME                 = 0b_0000_0000_0100_0000;

    /// Indicates the SP supports ControllerPublishVolume.readonly
    /// field.
    const PUBLISH_READONLY             = 0b_0000_0000_1000_0000;

    /// See VolumeExpansion for details.
    const EXPAND_VOLUME                = 0b_0000_0001_0000_0000;

    /// Indicates the SP supports the
    /// ListVolumesResponse.entry.published_nodes field
    const LIST_VOLUMES_PUBLISHED_NODES = 0b_0000_0010_0000_0000;

    /// Indicates that the Controller service can report volume
    /// conditions.
    /// An SP MAY implement `VolumeCondition` in only the Controller
    /// Plugin, only the Node Plugin, or both.
    /// If `VolumeCondition` is implemented in both the Controller and
    /// Node Plugins, it SHALL report from different perspectives.
    /// If for some reason Controller and Node Plugins report
    /// misaligned volume conditions, CO SHALL assume the worst case
    /// is the truth.
    /// Note that, for alpha, `VolumeCondition` is intended be
    /// informative for humans only, not for automation.
    const VOLUME_CONDITION             = 0b_0000_0100_0000_0000;

    /// Indicates the SP supports the ControllerGetVolume RPC.
    /// This enables COs to, for example, fetch per volume
    /// condition after a volume is provisioned.
    const GET_VOLUME                   = 0b_0000_1000_0000_0000;
  }
}

use proto::controller_service_capability::rpc::Type;

impl ControllerCapabilities {
  fn from_rpc(value: Type) -> Self {
    match value {
      Type::Unknown => ControllerCapabilities::empty(),
      Type::CreateDeleteVolume => ControllerCapabilities::CREATE_DELETE_VOLUME,
      Type::PublishUnpublishVolume => ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME,
      Type::ListVolumes => ControllerCapabilities::LIST_VOLUMES,
      Type::GetCapacity => ControllerCapabilities::GET_CAPACITY,
      Type::CreateDeleteSnapshot => ControllerCapabilities::CREATE_DELETE_SNAPSHOT,
      Type::ListSnapshots => ControllerCapabilities::LIST_SNAPSHOTS,
      Type::CloneVolume => ControllerCapabilities::CLONE_VOLUME,
      Type::PublishReadonly => ControllerCapabilities::PUBLISH_READONLY,
      Type::ExpandVolume => ControllerCapabilities::EXPAND_VOLUME,
      Type::ListVolumesPublishedNodes => ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES,
      Type::VolumeCondition => ControllerCapabilities::VOLUME_CONDITION,
      Type::GetVolume => ControllerCapabilities::GET_VOLUME,
    }
  }

  /// Whether the plugin implements ControllerPublishVolume and
  /// ControllerUnpublishVolume.
  #[inline]
  pub fn can_publish(&self) -> bool {
    self.contains(ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME)
  }

  /// Whether ListVolumes reports the nodes each volume is published on.
  #[inline]
  pub fn can_list_published_nodes(&self) -> bool {
    self.contains(
      ControllerCapabilities::LIST_VOLUMES | ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES,
    )
  }
}

impl From<proto::ControllerGetCapabilitiesResponse> for ControllerCapabilities {
  fn from(value: proto::ControllerGetCapabilitiesResponse) -> Self {
    value
      .capabilities
      .into_iter()
      .filter_map(|cap| match cap.r#type {
        Some(proto::controller_service_capability::Type::Rpc(rpc)) => Type::try_from(rpc.r#type).ok(),
        None => None,
      })
      .fold(ControllerCapabilities::empty(), |acc, rpc| {
        acc | ControllerCapabilities::from_rpc(rpc)
      })
  }
}
