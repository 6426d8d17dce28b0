//! Single writer, many readers arbitration between the attachments of one
//! volume.
//!
//! An attachment is published read-only when nothing on its node needs to
//! write to the volume. Read-only attachments may coexist on any number of
//! nodes. A read-write attachment excludes every other node.
//!
//! Decisions are made from the lister's current view of sibling
//! attachments. A sibling whose attach is still in flight has not recorded
//! `attached` or its read-only tag yet and is invisible here, so two
//! attachments starting at the same time on different nodes can both be
//! admitted. There is no lock between them; the window is bounded by the
//! duration of one publish call.

use crate::{
  model::{
    ObjectKey, PersistentVolume, PersistentVolumeAccessMode, VolumeAttachment,
    VolumeAttachmentSource,
  },
  store::AttachmentLister,
};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub const CONFLICTING_READ_WRITE: &str = "conflicting read-write attachment";
pub const CONFLICTING_READ_ONLY: &str = "volume is attached read-only on another node";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachMode {
  ReadOnly,
  ReadWrite,
}

impl AttachMode {
  #[inline]
  pub fn is_readonly(self) -> bool {
    self == AttachMode::ReadOnly
  }
}

impl fmt::Display for AttachMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AttachMode::ReadOnly => f.write_str("ro"),
      AttachMode::ReadWrite => f.write_str("rw"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  pub permit: bool,
  pub required_mode: AttachMode,
  pub reason: String,
}

impl Decision {
  fn permit(required_mode: AttachMode, reason: impl Into<String>) -> Self {
    Self {
      permit: true,
      required_mode,
      reason: reason.into(),
    }
  }

  fn deny(required_mode: AttachMode, reason: impl Into<String>) -> Self {
    Self {
      permit: false,
      required_mode,
      reason: reason.into(),
    }
  }
}

/// The attachment refers to something that does not resolve. Retrying
/// without an outside change cannot help.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArbiterError {
  #[error("persistent volume {0} not found")]
  VolumeNotFound(String),

  #[error("can not get claim ref for persistent volume {0}")]
  Unbound(String),
}

pub struct AccessModeArbiter {
  lister: Arc<dyn AttachmentLister>,
}

impl AccessModeArbiter {
  pub fn new(lister: Arc<dyn AttachmentLister>) -> Self {
    Self { lister }
  }

  /// Decides whether `va` may be attached and in which mode. Sibling state is
  /// read fresh from the lister on every call.
  pub fn decide(&self, va: &VolumeAttachment) -> Result<Decision, ArbiterError> {
    let pv_name = match &va.spec.source {
      VolumeAttachmentSource::Inline(spec) => {
        let read_only = spec.csi.as_ref().map(|c| c.read_only).unwrap_or(false);
        let mode = if read_only {
          AttachMode::ReadOnly
        } else {
          AttachMode::ReadWrite
        };
        return Ok(Decision::permit(mode, "inline volume"));
      }
      VolumeAttachmentSource::PersistentVolume(name) => name,
    };

    let pv = self
      .lister
      .persistent_volume(pv_name)
      .ok_or_else(|| ArbiterError::VolumeNotFound(pv_name.clone()))?;
    let claim = pv
      .spec
      .claim_ref
      .as_ref()
      .ok_or_else(|| ArbiterError::Unbound(pv_name.clone()))?;

    let mode = self.required_mode(va, &pv, claim);
    debug!(volume = %pv_name, node = %va.spec.node_name, %mode, "resolved attach mode");

    let mut readers = 0;
    for sibling in self.attached_siblings(va, pv_name) {
      if !sibling.is_readonly_attached() {
        debug!(
          volume = %pv_name,
          sibling = %sibling.name(),
          node = %sibling.spec.node_name,
          "volume is attached read-write elsewhere"
        );
        return Ok(Decision::deny(mode, CONFLICTING_READ_WRITE));
      }

      readers += 1;
    }

    match (readers, mode) {
      (0, _) => Ok(Decision::permit(mode, "no attachment on other nodes")),
      (_, AttachMode::ReadOnly) => Ok(Decision::permit(mode, "joining read-only attachments")),
      (_, AttachMode::ReadWrite) => Ok(Decision::deny(mode, CONFLICTING_READ_ONLY)),
    }
  }

  fn required_mode(
    &self,
    va: &VolumeAttachment,
    pv: &PersistentVolume,
    claim: &ObjectKey,
  ) -> AttachMode {
    let declared_read_only = pv.spec.csi.as_ref().map(|c| c.read_only).unwrap_or(false);
    let rox_only = !pv.spec.access_modes.is_empty()
      && pv
        .spec
        .access_modes
        .iter()
        .all(|m| *m == PersistentVolumeAccessMode::ReadOnlyMany);
    if declared_read_only || rox_only {
      return AttachMode::ReadOnly;
    }

    let node = &va.spec.node_name;
    let writer = self
      .lister
      .pods()
      .into_iter()
      .filter(|p| &p.spec.node_name == node)
      .find(|p| p.writes_claim(claim));

    match writer {
      Some(pod) => {
        debug!(pod = %pod.meta.name, claim = %claim, "claim is mounted read-write");
        AttachMode::ReadWrite
      }
      None => AttachMode::ReadOnly,
    }
  }

  /// Attachments of the same volume on other nodes that are recorded as
  /// attached.
  fn attached_siblings<'a>(
    &self,
    va: &'a VolumeAttachment,
    pv_name: &'a str,
  ) -> impl Iterator<Item = Arc<VolumeAttachment>> + 'a {
    self
      .lister
      .volume_attachments()
      .into_iter()
      .filter(move |s| {
        s.pv_name() == Some(pv_name)
          && s.spec.node_name != va.spec.node_name
          && s.status.attached
      })
  }
}
