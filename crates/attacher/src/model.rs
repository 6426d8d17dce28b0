//! The orchestrator objects the attacher reads and writes. Only the fields
//! that attach and detach decisions depend on are mirrored.

use std::{collections::HashMap, fmt, time::SystemTime};

/// Attachment metadata key recording whether an attachment was published
/// read-only. Other attachments of the same volume consult it to decide
/// whether they may join as readers.
pub const READONLY_ATTACHMENT_KEY: &str = "csi.supremind.com/readonly-attach";

/// Finalizer guarding a `VolumeAttachment` until the driver has detached it.
pub fn finalizer_name(driver: &str) -> String {
  format!("external-attacher/{}", sanitize_driver_name(driver))
}

fn sanitize_driver_name(driver: &str) -> String {
  let mut name: String = driver
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '-' {
        c
      } else {
        '-'
      }
    })
    .collect();

  // must not end with '-'
  if name.ends_with('-') {
    name.push('X');
  }

  name
}

/// Namespaced identity of an object. Cluster scoped objects have an empty
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
  pub namespace: String,
  pub name: String,
}

impl ObjectKey {
  pub fn cluster(name: impl Into<String>) -> Self {
    Self {
      namespace: String::new(),
      name: name.into(),
    }
  }

  pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      namespace: namespace.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for ObjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.namespace.is_empty() {
      f.write_str(&self.name)
    } else {
      write!(f, "{}/{}", self.namespace, self.name)
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
  pub name: String,
  pub namespace: String,
  pub uid: String,
  /// Bumped by the store on every write. Writes carrying a stale version
  /// are rejected.
  pub resource_version: u64,
  pub deletion_timestamp: Option<SystemTime>,
  pub finalizers: Vec<String>,
  pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  #[inline]
  pub fn is_deleting(&self) -> bool {
    self.deletion_timestamp.is_some()
  }

  #[inline]
  pub fn has_finalizer(&self, finalizer: &str) -> bool {
    self.finalizers.iter().any(|f| f == finalizer)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
  pub meta: ObjectMeta,
  pub spec: VolumeAttachmentSpec,
  pub status: VolumeAttachmentStatus,
}

impl VolumeAttachment {
  #[inline]
  pub fn name(&self) -> &str {
    &self.meta.name
  }

  #[inline]
  pub fn key(&self) -> ObjectKey {
    ObjectKey::cluster(self.meta.name.clone())
  }

  /// Name of the persistent volume this attachment refers to, if it does
  /// not carry an inline volume spec.
  pub fn pv_name(&self) -> Option<&str> {
    match &self.spec.source {
      VolumeAttachmentSource::PersistentVolume(name) => Some(name),
      VolumeAttachmentSource::Inline(_) => None,
    }
  }

  /// Whether the recorded attachment was published read-only.
  pub fn is_readonly_attached(&self) -> bool {
    self
      .status
      .attachment_metadata
      .get(READONLY_ATTACHMENT_KEY)
      .map(|v| v == "true")
      .unwrap_or(false)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachmentSpec {
  /// Name of the driver that must handle this attachment.
  pub attacher: String,
  pub node_name: String,
  pub source: VolumeAttachmentSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeAttachmentSource {
  PersistentVolume(String),
  /// Inline volumes carry their own spec and are never shared with other
  /// attachments.
  Inline(Box<PersistentVolumeSpec>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeAttachmentStatus {
  pub attached: bool,
  pub attachment_metadata: HashMap<String, String>,
  pub attach_error: Option<VolumeError>,
  pub detach_error: Option<VolumeError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeError {
  pub message: String,
  pub time: SystemTime,
}

impl VolumeError {
  pub fn now(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      time: SystemTime::now(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistentVolumeAccessMode {
  ReadWriteOnce,
  ReadOnlyMany,
  ReadWriteMany,
  ReadWriteOncePod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistentVolumeMode {
  Filesystem,
  Block,
}

impl Default for PersistentVolumeMode {
  fn default() -> Self {
    PersistentVolumeMode::Filesystem
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentVolume {
  pub meta: ObjectMeta,
  pub spec: PersistentVolumeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentVolumeSpec {
  pub csi: Option<CsiVolumeSource>,
  pub access_modes: Vec<PersistentVolumeAccessMode>,
  /// The claim this volume is bound to.
  pub claim_ref: Option<ObjectKey>,
  pub volume_mode: PersistentVolumeMode,
  pub mount_options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsiVolumeSource {
  pub driver: String,
  pub volume_handle: String,
  pub read_only: bool,
  pub fs_type: Option<String>,
  pub volume_attributes: HashMap<String, String>,
  pub controller_publish_secret_ref: Option<ObjectKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
  Pending,
  Running,
  Succeeded,
  Failed,
  Unknown,
}

impl PodPhase {
  /// Pods in a terminal phase no longer use their volumes.
  #[inline]
  pub fn is_terminated(self) -> bool {
    matches!(self, PodPhase::Succeeded | PodPhase::Failed)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
  pub meta: ObjectMeta,
  pub spec: PodSpec,
  pub phase: PodPhase,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSpec {
  pub node_name: String,
  pub volumes: Vec<PodVolume>,
  pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodVolume {
  pub name: String,
  pub persistent_volume_claim: Option<ClaimVolumeSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimVolumeSource {
  pub claim_name: String,
  pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
  pub name: String,
  pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
  pub name: String,
  pub mount_path: String,
  pub read_only: bool,
}

impl Pod {
  /// Names of the claims this pod mounts through a pod volume.
  pub fn claim_names(&self) -> impl Iterator<Item = &str> {
    self
      .spec
      .volumes
      .iter()
      .filter_map(|v| v.persistent_volume_claim.as_ref())
      .map(|c| &*c.claim_name)
  }

  /// Whether this pod still needs write access to the given claim: it has
  /// not terminated, its pod volume for the claim is not read-only, and at
  /// least one container mounts that volume read-write.
  pub fn writes_claim(&self, claim: &ObjectKey) -> bool {
    if self.meta.namespace != claim.namespace || self.phase.is_terminated() {
      return false;
    }

    self
      .spec
      .volumes
      .iter()
      .filter(|v| match &v.persistent_volume_claim {
        Some(c) => c.claim_name == claim.name && !c.read_only,
        None => false,
      })
      .any(|v| {
        self
          .spec
          .containers
          .iter()
          .flat_map(|c| c.volume_mounts.iter())
          .any(|m| m.name == v.name && !m.read_only)
      })
  }
}
