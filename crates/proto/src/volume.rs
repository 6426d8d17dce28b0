use std::fmt;

use crate::proto;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCapability {
  access_mode: AccessMode,
  access_type: AccessType,
}

impl VolumeCapability {
  pub fn new(access_mode: AccessMode, access_type: AccessType) -> Self {
    Self {
      access_mode,
      access_type,
    }
  }

  #[inline]
  pub fn access_mode(&self) -> AccessMode {
    self.access_mode
  }

  #[inline]
  pub fn access_type(&self) -> &AccessType {
    &self.access_type
  }
}

impl From<VolumeCapability> for proto::VolumeCapability {
  fn from(value: VolumeCapability) -> Self {
    let access_mode = Some(value.access_mode.into());
    let access_type = Some(value.access_type.into());

    proto::VolumeCapability {
      access_mode,
      access_type,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
  /// Can only be published once as read/write on a single node, at
  /// any given time.
  SingleNodeWriter,
  /// Can only be published once as readonly on a single node, at
  /// any given time.
  SingleNodeReaderOnly,
  /// Can be published as readonly at multiple nodes simultaneously.
  MultiNodeReaderOnly,
  /// Can be published at multiple nodes simultaneously. Only one of
  /// the node can be used as read/write. The rest will be readonly.
  MultiNodeSingleWriter,
  /// Can be published as read/write at multiple nodes
  /// simultaneously.
  MultiNodeMultiWriter,
}

impl From<AccessMode> for proto::volume_capability::AccessMode {
  fn from(value: AccessMode) -> Self {
    use proto::volume_capability::access_mode::Mode;

    let mode = match value {
      AccessMode::SingleNodeWriter => Mode::SingleNodeWriter,
      AccessMode::SingleNodeReaderOnly => Mode::SingleNodeReaderOnly,
      AccessMode::MultiNodeReaderOnly => Mode::MultiNodeReaderOnly,
      AccessMode::MultiNodeSingleWriter => Mode::MultiNodeSingleWriter,
      AccessMode::MultiNodeMultiWriter => Mode::MultiNodeMultiWriter,
    } as i32;

    proto::volume_capability::AccessMode { mode }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessType {
  /// Indicate that the volume will be accessed via the block device API.
  Block,

  /// Indicate that the volume will be accessed via the filesystem API.
  Mount(MountVolume),
}

impl From<AccessType> for proto::volume_capability::AccessType {
  fn from(value: AccessType) -> Self {
    match value {
      AccessType::Block => {
        proto::volume_capability::AccessType::Block(proto::volume_capability::BlockVolume {})
      }
      AccessType::Mount(v) => proto::volume_capability::AccessType::Mount(v.into()),
    }
  }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct MountVolume {
  fs_type: Option<String>,
  mount_flags: Vec<String>,
}

impl MountVolume {
  pub fn new(fs_type: Option<String>, mount_flags: Vec<String>) -> Self {
    let fs_type = fs_type.filter(|v| !v.is_empty());

    Self {
      fs_type,
      mount_flags,
    }
  }

  /// The filesystem type.
  #[inline]
  pub fn fs_type(&self) -> Option<&str> {
    self.fs_type.as_deref()
  }

  /// The mount options that can be used for the volume. `mount_flags` MAY
  /// contain sensitive information, so they are never printed.
  pub fn mount_flags(&self) -> impl Iterator<Item = &str> + ExactSizeIterator {
    self.mount_flags.iter().map(|v| &**v)
  }
}

impl From<MountVolume> for proto::volume_capability::MountVolume {
  fn from(value: MountVolume) -> Self {
    let fs_type = value.fs_type.unwrap_or_default();
    let mount_flags = value.mount_flags;

    proto::volume_capability::MountVolume {
      fs_type,
      mount_flags,
    }
  }
}

impl fmt::Debug for MountVolume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountVolume")
      .field("fs_type", &self.fs_type)
      .field(
        "mount_flags",
        &format!("REDACTED ({} items)", self.mount_flags.len()),
      )
      .finish()
  }
}

/// Publishing state of a volume as reported by `ListVolumes`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeStatus {
  /// A list of all `node_id` of nodes that the volume in this entry
  /// is controller published on.
  /// If it is not specified and the SP has the LIST_VOLUMES_PUBLISHED_NODES
  /// controller capability, the CO MAY assume the volume is not controller
  /// published to any nodes.
  published_node_ids: Vec<String>,
}

impl VolumeStatus {
  pub fn new(published_node_ids: Vec<String>) -> Self {
    Self { published_node_ids }
  }

  #[inline]
  pub fn published_node_ids(&self) -> &[String] {
    &self.published_node_ids
  }

  pub fn is_published_on(&self, node_id: &str) -> bool {
    self.published_node_ids.iter().any(|n| n == node_id)
  }
}

impl From<proto::list_volumes_response::VolumeStatus> for VolumeStatus {
  fn from(value: proto::list_volumes_response::VolumeStatus) -> Self {
    VolumeStatus {
      published_node_ids: value.published_node_ids,
    }
  }
}
