use csi_proto::{ControllerCapabilities, Plugin, PluginCapabilities};
use tonic::Status;
use tracing::{info, instrument};

/// What the plugin reported about itself at startup. Never re-queried while
/// the controller runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
  name: String,
  plugin: PluginCapabilities,
  controller: ControllerCapabilities,
}

impl Driver {
  pub fn new(
    name: impl Into<String>,
    plugin: PluginCapabilities,
    controller: ControllerCapabilities,
  ) -> Self {
    Self {
      name: name.into(),
      plugin,
      controller,
    }
  }

  /// Queries name and capabilities of a ready plugin.
  #[instrument(skip(plugin))]
  pub async fn discover(plugin: &dyn Plugin) -> Result<Self, Status> {
    if !plugin.probe().await? {
      return Err(Status::unavailable("plugin is not ready"));
    }

    let info = plugin.plugin_info().await?;
    let plugin_caps = plugin.plugin_capabilities().await?;
    let controller_caps = if plugin_caps.contains(PluginCapabilities::CONTROLLER_SERVICE) {
      plugin.controller_capabilities().await?
    } else {
      ControllerCapabilities::empty()
    };

    let driver = Driver::new(info.name(), plugin_caps, controller_caps);
    info!(
      driver = %driver.name,
      publish = driver.supports_publish(),
      readonly = driver.supports_readonly(),
      list_published = driver.supports_list_published(),
      "discovered plugin"
    );
    Ok(driver)
  }

  /// Driver name, matched against `VolumeAttachment.spec.attacher`.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Whether attach and detach go through ControllerPublishVolume and
  /// ControllerUnpublishVolume. Otherwise attaching is a formality.
  pub fn supports_publish(&self) -> bool {
    self.plugin.contains(PluginCapabilities::CONTROLLER_SERVICE) && self.controller.can_publish()
  }

  pub fn supports_readonly(&self) -> bool {
    self
      .controller
      .contains(ControllerCapabilities::PUBLISH_READONLY)
  }

  /// Whether the plugin can report where volumes are published, which the
  /// periodic reconciler depends on.
  pub fn supports_list_published(&self) -> bool {
    self.supports_publish() && self.controller.can_list_published_nodes()
  }
}
