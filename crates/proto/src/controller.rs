mod capabilities;
mod list_volumes;
mod publish_volume;
mod unpublish_volume;

pub use crate::volume::*;
pub use capabilities::*;
pub use list_volumes::*;
pub use publish_volume::*;
pub use unpublish_volume::*;
