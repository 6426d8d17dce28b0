mod csi;
mod trivial;

use crate::{
  config::Config,
  driver::Driver,
  error::SyncError,
  model::VolumeAttachment,
  store::{AttachmentClient, AttachmentLister},
};
use async_trait::async_trait;
use csi_proto::Plugin;
use std::sync::Arc;
use tracing::info;

pub use csi::CsiHandler;
pub use trivial::TrivialHandler;

/// Drives one attachment towards its desired state.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
  /// Attaches an attachment that is not marked for deletion.
  async fn sync_attach(&self, va: VolumeAttachment) -> Result<(), SyncError>;

  /// Detaches an attachment marked for deletion and releases it.
  async fn sync_detach(&self, va: VolumeAttachment) -> Result<(), SyncError>;
}

/// Picks the handler for the lifetime of the controller.
pub fn select_handler(
  driver: &Driver,
  plugin: Arc<dyn Plugin>,
  lister: Arc<dyn AttachmentLister>,
  client: Arc<dyn AttachmentClient>,
  config: &Config,
) -> Arc<dyn Handler> {
  if driver.supports_publish() {
    info!(driver = %driver.name(), "using CSI handler");
    Arc::new(CsiHandler::new(
      driver.name(),
      plugin,
      lister,
      client,
      config.timeout,
      driver.supports_readonly(),
    ))
  } else {
    info!(driver = %driver.name(), "plugin does not publish volumes, using trivial handler");
    Arc::new(TrivialHandler::new(driver.name(), client))
  }
}
