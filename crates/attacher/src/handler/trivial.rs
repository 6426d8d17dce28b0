use super::Handler;
use crate::{
  error::SyncError,
  model::{finalizer_name, VolumeAttachment},
  store::AttachmentClient,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Handler for plugins without ControllerPublishVolume. Attachments are
/// reported attached as soon as they show up, and nothing holds up their
/// deletion.
pub struct TrivialHandler {
  finalizer: String,
  client: Arc<dyn AttachmentClient>,
}

impl TrivialHandler {
  pub fn new(driver: &str, client: Arc<dyn AttachmentClient>) -> Self {
    Self {
      finalizer: finalizer_name(driver),
      client,
    }
  }
}

#[async_trait]
impl Handler for TrivialHandler {
  #[instrument(
    name = "attacher.trivial_attach",
    skip(self, va),
    fields(va = %va.name(), node = %va.spec.node_name)
  )]
  async fn sync_attach(&self, va: VolumeAttachment) -> Result<(), SyncError> {
    if va.status.attached {
      debug!("already attached");
      return Ok(());
    }

    let mut updated = va;
    updated.status.attached = true;
    updated.status.attach_error = None;
    self.client.update_status(&updated).await?;
    info!("attached");
    Ok(())
  }

  #[instrument(
    name = "attacher.trivial_detach",
    skip(self, va),
    fields(va = %va.name(), node = %va.spec.node_name)
  )]
  async fn sync_detach(&self, va: VolumeAttachment) -> Result<(), SyncError> {
    // Left behind by a CSI handler if the plugin lost its publish capability.
    if !va.meta.has_finalizer(&self.finalizer) {
      return Ok(());
    }

    let mut updated = va;
    updated.status.attached = false;
    updated.status.attachment_metadata.clear();
    updated.status.detach_error = None;
    let mut updated = self.client.update_status(&updated).await?;

    updated.meta.finalizers.retain(|f| f != &self.finalizer);
    self.client.update(&updated).await?;
    info!("detached");
    Ok(())
  }
}
