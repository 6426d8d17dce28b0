use crate::error::ControllerError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Tunables of the attacher. Durations are given in seconds when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Number of workers processing attach and detach keys.
  pub worker_threads: usize,

  /// Deadline of each plugin call.
  #[serde(deserialize_with = "seconds")]
  pub timeout: Duration,

  /// Initial retry delay of a failed attach or detach, doubled on every
  /// further failure.
  #[serde(deserialize_with = "seconds")]
  pub retry_interval_start: Duration,

  /// Upper bound of the retry delay.
  #[serde(deserialize_with = "seconds")]
  pub retry_interval_max: Duration,

  /// Period of the pass comparing attachments with the volumes the plugin
  /// reports as published.
  #[serde(deserialize_with = "seconds")]
  pub reconcile_sync: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      worker_threads: 10,
      timeout: Duration::from_secs(15),
      retry_interval_start: Duration::from_secs(1),
      retry_interval_max: Duration::from_secs(5 * 60),
      reconcile_sync: Duration::from_secs(60),
    }
  }
}

impl Config {
  pub fn validate(&self) -> Result<(), ControllerError> {
    if self.worker_threads == 0 {
      return Err(ControllerError::InvalidConfig(
        "worker_threads must be at least 1".into(),
      ));
    }

    if self.timeout.is_zero() {
      return Err(ControllerError::InvalidConfig(
        "timeout must be positive".into(),
      ));
    }

    if self.retry_interval_start.is_zero() {
      return Err(ControllerError::InvalidConfig(
        "retry_interval_start must be positive".into(),
      ));
    }

    if self.retry_interval_start > self.retry_interval_max {
      return Err(ControllerError::InvalidConfig(format!(
        "retry_interval_start ({:?}) exceeds retry_interval_max ({:?})",
        self.retry_interval_start, self.retry_interval_max
      )));
    }

    if self.reconcile_sync.is_zero() {
      return Err(ControllerError::InvalidConfig(
        "reconcile_sync must be positive".into(),
      ));
    }

    Ok(())
  }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
  let secs = f64::deserialize(deserializer)?;
  Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
