//! Attaches CSI volumes to nodes on behalf of a container orchestrator.
//!
//! The controller watches `VolumeAttachment` objects and drives each one to
//! the state it asks for through ControllerPublishVolume and
//! ControllerUnpublishVolume calls. A volume may be written from one node
//! only; read-only attachments may be spread over any number of nodes.

pub mod arbiter;
pub mod handler;
pub mod model;
pub mod store;

mod backoff;
mod config;
mod controller;
mod driver;
mod error;
#[cfg(test)]
mod fake;
mod queue;
mod reconciler;

pub use arbiter::{AccessModeArbiter, AttachMode, Decision};
pub use backoff::{ExponentialFailureRateLimiter, RateLimiter};
pub use config::Config;
pub use controller::AttachController;
pub use driver::Driver;
pub use error::{is_retryable_code, ControllerError, SyncError};
pub use queue::WorkQueue;
pub use reconciler::Reconciler;
pub use store::{ApiError, AttachmentClient, AttachmentLister, Change, Event};
