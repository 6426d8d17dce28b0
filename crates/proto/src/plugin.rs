use bitflags::bitflags;

use crate::proto::{self, plugin_capability};

#[rustfmt::skip]
bitflags! {
  pub struct PluginCapabilities: u32 {
    /// The plugin provides RPCs for the ControllerService. Plugins
    /// SHOULD provide this capability. In rare cases certain plugins
    /// MAY wish to omit the ControllerService entirely from their
    /// implementation, but such SHOULD NOT be the common case.
    const CONTROLLER_SERVICE               = 0b_0001;

    /// Volumes for this plugin MAY NOT be equally accessible by all
    /// nodes in the cluster.
    const VOLUME_ACCESSIBILITY_CONSTRAINTS = 0b_0010;

    /// Volumes may be expanded while published and in use on a node.
    const ONLINE_EXPANSION                 = 0b_0100;

    /// Volumes may be expanded only while not published on any node.
    const OFFLINE_EXPANSION                = 0b_1000;
  }
}

impl From<proto::GetPluginCapabilitiesResponse> for PluginCapabilities {
  fn from(value: proto::GetPluginCapabilitiesResponse) -> Self {
    use plugin_capability::{service, volume_expansion};

    let mut caps = PluginCapabilities::empty();
    for cap in value.capabilities {
      match cap.r#type {
        Some(plugin_capability::Type::Service(s)) => match service::Type::try_from(s.r#type) {
          Ok(service::Type::ControllerService) => caps |= PluginCapabilities::CONTROLLER_SERVICE,
          Ok(service::Type::VolumeAccessibilityConstraints) => {
            caps |= PluginCapabilities::VOLUME_ACCESSIBILITY_CONSTRAINTS
          }
          _ => (),
        },
        Some(plugin_capability::Type::VolumeExpansion(e)) => {
          match volume_expansion::Type::try_from(e.r#type) {
            Ok(volume_expansion::Type::Online) => caps |= PluginCapabilities::ONLINE_EXPANSION,
            Ok(volume_expansion::Type::Offline) => caps |= PluginCapabilities::OFFLINE_EXPANSION,
            _ => (),
          }
        }
        None => (),
      }
    }

    caps
  }
}
