use super::Handler;
use crate::{
  arbiter::{AccessModeArbiter, ArbiterError, AttachMode},
  error::SyncError,
  model::{
    finalizer_name, ObjectKey, PersistentVolumeAccessMode, PersistentVolumeMode,
    PersistentVolumeSpec, VolumeAttachment, VolumeAttachmentSource, VolumeError,
    READONLY_ATTACHMENT_KEY,
  },
  store::{AttachmentClient, AttachmentLister},
};
use async_trait::async_trait;
use csi_proto::{
  AccessMode, AccessType, ControllerPublishVolumeRequest, ControllerUnpublishVolumeRequest,
  MountVolume, Plugin, VolumeCapability,
};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use tonic::Status;
use tracing::{debug, info, instrument, warn};

/// Volume details the publish calls need, taken from the persistent volume
/// or the inline spec.
#[derive(Debug)]
struct CsiSource {
  volume_handle: String,
  fs_type: Option<String>,
  volume_attributes: HashMap<String, String>,
  secret_ref: Option<ObjectKey>,
  access_modes: Vec<PersistentVolumeAccessMode>,
  volume_mode: PersistentVolumeMode,
  mount_options: Vec<String>,
}

impl CsiSource {
  fn capability(&self, mode: AttachMode) -> VolumeCapability {
    let access_mode = if mode.is_readonly() {
      AccessMode::MultiNodeReaderOnly
    } else if self
      .access_modes
      .contains(&PersistentVolumeAccessMode::ReadWriteMany)
    {
      AccessMode::MultiNodeMultiWriter
    } else {
      AccessMode::SingleNodeWriter
    };

    let access_type = match self.volume_mode {
      PersistentVolumeMode::Block => AccessType::Block,
      PersistentVolumeMode::Filesystem => AccessType::Mount(MountVolume::new(
        self.fs_type.clone(),
        self.mount_options.clone(),
      )),
    };

    VolumeCapability::new(access_mode, access_type)
  }
}

/// Attaches through ControllerPublishVolume and detaches through
/// ControllerUnpublishVolume. Attachments are guarded by a finalizer from
/// before the first publish until the volume is confirmed unpublished.
pub struct CsiHandler {
  driver: String,
  finalizer: String,
  plugin: Arc<dyn Plugin>,
  lister: Arc<dyn AttachmentLister>,
  client: Arc<dyn AttachmentClient>,
  arbiter: AccessModeArbiter,
  timeout: Duration,
  supports_readonly: bool,
}

impl CsiHandler {
  pub fn new(
    driver: impl Into<String>,
    plugin: Arc<dyn Plugin>,
    lister: Arc<dyn AttachmentLister>,
    client: Arc<dyn AttachmentClient>,
    timeout: Duration,
    supports_readonly: bool,
  ) -> Self {
    let driver = driver.into();
    Self {
      finalizer: finalizer_name(&driver),
      driver,
      plugin,
      arbiter: AccessModeArbiter::new(lister.clone()),
      lister,
      client,
      timeout,
      supports_readonly,
    }
  }

  async fn attach(&self, va: &mut VolumeAttachment) -> Result<(), SyncError> {
    self.add_finalizer(va).await?;

    let decision = self.arbiter.decide(va)?;
    let source = self.source(va)?;
    if !decision.permit {
      return Err(SyncError::Conflict {
        volume: source.volume_handle,
        node: va.spec.node_name.clone(),
        reason: decision.reason,
      });
    }

    let node_id = self.node_id(va)?;
    let secrets = self.secrets(&source).await?;
    let readonly = decision.required_mode.is_readonly();
    let request = ControllerPublishVolumeRequest::new(
      source.volume_handle.clone(),
      node_id,
      source.capability(decision.required_mode),
    )
    .with_readonly(readonly && self.supports_readonly)
    .with_secrets(secrets)
    .with_volume_context(source.volume_attributes.clone());

    let response = self
      .call(
        "ControllerPublishVolume",
        self.plugin.controller_publish_volume(request),
      )
      .await?;

    let mut metadata = response.into_publish_context();
    metadata.insert(READONLY_ATTACHMENT_KEY.to_owned(), readonly.to_string());

    let mut updated = va.clone();
    updated.status.attached = true;
    updated.status.attachment_metadata = metadata;
    updated.status.attach_error = None;
    *va = self.client.update_status(&updated).await?;

    info!(volume = %source.volume_handle, mode = %decision.required_mode, "attached");
    Ok(())
  }

  async fn detach(&self, va: &mut VolumeAttachment) -> Result<(), SyncError> {
    // A failed attach may still have published the volume.
    let maybe_published = va.status.attached || va.status.attach_error.is_some();
    if !maybe_published {
      debug!("volume was never attached");
      return self.remove_finalizer(va).await;
    }

    let target = self
      .source(va)
      .and_then(|source| self.node_id(va).map(|node_id| (source, node_id)));
    let (source, node_id) = match target {
      Ok(v) => v,
      Err(e) if !va.status.attached => {
        warn!(error = %e, "cannot resolve volume of a failed attach, releasing it");
        return self.remove_finalizer(va).await;
      }
      Err(e) => return Err(e),
    };

    let secrets = self.secrets(&source).await?;
    let request = ControllerUnpublishVolumeRequest::new(source.volume_handle.clone(), node_id)
      .with_secrets(secrets);
    self
      .call(
        "ControllerUnpublishVolume",
        self.plugin.controller_unpublish_volume(request),
      )
      .await?;

    let mut updated = va.clone();
    updated.status.attached = false;
    updated.status.attachment_metadata.clear();
    updated.status.attach_error = None;
    updated.status.detach_error = None;
    *va = self.client.update_status(&updated).await?;
    info!(volume = %source.volume_handle, "detached");

    self.remove_finalizer(va).await
  }

  /// Runs a plugin call under the configured deadline. An expired deadline
  /// is reported like a deadline the plugin enforced itself.
  async fn call<T, E>(
    &self,
    name: &'static str,
    call: impl Future<Output = Result<T, E>>,
  ) -> Result<T, Status>
  where
    Status: From<E>,
  {
    match tokio::time::timeout(self.timeout, call).await {
      Ok(result) => result.map_err(Status::from),
      Err(_) => Err(Status::deadline_exceeded(format!(
        "{} timed out after {:?}",
        name, self.timeout
      ))),
    }
  }

  async fn add_finalizer(&self, va: &mut VolumeAttachment) -> Result<(), SyncError> {
    if va.meta.has_finalizer(&self.finalizer) {
      return Ok(());
    }

    let mut updated = va.clone();
    updated.meta.finalizers.push(self.finalizer.clone());
    *va = self.client.update(&updated).await?;
    debug!(finalizer = %self.finalizer, "added finalizer");
    Ok(())
  }

  async fn remove_finalizer(&self, va: &mut VolumeAttachment) -> Result<(), SyncError> {
    let mut updated = va.clone();
    updated.meta.finalizers.retain(|f| f != &self.finalizer);
    *va = self.client.update(&updated).await?;
    debug!(finalizer = %self.finalizer, "removed finalizer");
    Ok(())
  }

  fn source(&self, va: &VolumeAttachment) -> Result<CsiSource, SyncError> {
    match &va.spec.source {
      VolumeAttachmentSource::PersistentVolume(name) => {
        let pv = self
          .lister
          .persistent_volume(name)
          .ok_or_else(|| ArbiterError::VolumeNotFound(name.clone()))?;
        self.csi_source(&pv.spec)
      }
      VolumeAttachmentSource::Inline(spec) => self.csi_source(spec),
    }
  }

  fn csi_source(&self, spec: &PersistentVolumeSpec) -> Result<CsiSource, SyncError> {
    let csi = spec
      .csi
      .as_ref()
      .ok_or_else(|| SyncError::InvalidSource("volume is not a CSI volume".into()))?;
    if csi.driver != self.driver {
      return Err(SyncError::InvalidSource(format!(
        "volume belongs to driver {}, not {}",
        csi.driver, self.driver
      )));
    }

    Ok(CsiSource {
      volume_handle: csi.volume_handle.clone(),
      fs_type: csi.fs_type.clone(),
      volume_attributes: csi.volume_attributes.clone(),
      secret_ref: csi.controller_publish_secret_ref.clone(),
      access_modes: spec.access_modes.clone(),
      volume_mode: spec.volume_mode,
      mount_options: spec.mount_options.clone(),
    })
  }

  fn node_id(&self, va: &VolumeAttachment) -> Result<String, SyncError> {
    self
      .lister
      .csi_node_id(&va.spec.node_name, &self.driver)
      .ok_or_else(|| SyncError::MissingNodeId {
        node: va.spec.node_name.clone(),
        driver: self.driver.clone(),
      })
  }

  async fn secrets(&self, source: &CsiSource) -> Result<HashMap<String, String>, SyncError> {
    match &source.secret_ref {
      Some(key) => Ok(self.client.secret(key).await?),
      None => Ok(HashMap::new()),
    }
  }

  /// Saves the failure on the attachment so it is visible to users. Write
  /// conflicts and API outages are not saved; the next pass retries anyway.
  async fn record_error(&self, va: &VolumeAttachment, err: &SyncError, detaching: bool) {
    if let SyncError::Api(api) = err {
      if api.is_retryable() {
        return;
      }
    }

    let mut updated = va.clone();
    let error = Some(VolumeError::now(err.to_string()));
    if detaching {
      updated.status.detach_error = error;
    } else {
      updated.status.attach_error = error;
    }

    if let Err(e) = self.client.update_status(&updated).await {
      warn!(error = %e, "failed to save error status");
    }
  }
}

#[async_trait]
impl Handler for CsiHandler {
  #[instrument(
    name = "attacher.sync_attach",
    skip(self, va),
    fields(va = %va.name(), node = %va.spec.node_name)
  )]
  async fn sync_attach(&self, va: VolumeAttachment) -> Result<(), SyncError> {
    if va.status.attached {
      debug!("already attached");
      return Ok(());
    }

    let mut va = va;
    let result = self.attach(&mut va).await;
    if let Err(e) = &result {
      self.record_error(&va, e, false).await;
    }

    result
  }

  #[instrument(
    name = "attacher.sync_detach",
    skip(self, va),
    fields(va = %va.name(), node = %va.spec.node_name)
  )]
  async fn sync_detach(&self, va: VolumeAttachment) -> Result<(), SyncError> {
    if !va.meta.has_finalizer(&self.finalizer) {
      debug!("not guarded by this attacher, nothing to detach");
      return Ok(());
    }

    let mut va = va;
    let result = self.detach(&mut va).await;
    if let Err(e) = &result {
      self.record_error(&va, e, true).await;
    }

    result
  }
}
