use parking_lot::Mutex;
use std::{collections::HashMap, hash::Hash, time::Duration};

/// Decides how long a failing item waits before it is retried.
pub trait RateLimiter<K>: Send + Sync {
  /// Delay before the next retry of `key`. Every call counts as one more
  /// failure.
  fn when(&self, key: &K) -> Duration;

  /// Clears the failure history of `key`, typically after it succeeded.
  fn forget(&self, key: &K);

  fn num_requeues(&self, key: &K) -> u32;
}

/// Per item exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ExponentialFailureRateLimiter<K> {
  base: Duration,
  max: Duration,
  failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash> ExponentialFailureRateLimiter<K> {
  pub fn new(base: Duration, max: Duration) -> Self {
    Self {
      base,
      max,
      failures: Mutex::new(HashMap::new()),
    }
  }

  fn delay(&self, failures: u32) -> Duration {
    2u32
      .checked_pow(failures)
      .and_then(|factor| self.base.checked_mul(factor))
      .map(|d| d.min(self.max))
      .unwrap_or(self.max)
  }
}

impl<K: Eq + Hash + Clone + Send> RateLimiter<K> for ExponentialFailureRateLimiter<K> {
  fn when(&self, key: &K) -> Duration {
    let mut failures = self.failures.lock();
    let count = failures.entry(key.clone()).or_insert(0);
    let delay = self.delay(*count);
    *count = count.saturating_add(1);
    delay
  }

  fn forget(&self, key: &K) {
    self.failures.lock().remove(key);
  }

  fn num_requeues(&self, key: &K) -> u32 {
    self.failures.lock().get(key).copied().unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  fn limiter() -> ExponentialFailureRateLimiter<&'static str> {
    ExponentialFailureRateLimiter::new(Duration::from_secs(1), Duration::from_secs(300))
  }

  #[test_case(0 => Duration::from_secs(1))]
  #[test_case(1 => Duration::from_secs(2))]
  #[test_case(4 => Duration::from_secs(16))]
  #[test_case(8 => Duration::from_secs(256))]
  #[test_case(9 => Duration::from_secs(300) ; "capped")]
  #[test_case(40 => Duration::from_secs(300) ; "overflow is capped")]
  fn delay(failures: u32) -> Duration {
    limiter().delay(failures)
  }

  #[test]
  fn delays_never_decrease() {
    let limiter = limiter();
    let mut last = Duration::ZERO;
    for _ in 0..64 {
      let next = limiter.when(&"va-1");
      assert!(next >= last);
      assert!(next <= Duration::from_secs(300));
      last = next;
    }
    assert_eq!(last, Duration::from_secs(300));
  }

  #[test]
  fn forget_resets_to_base() {
    let limiter = limiter();
    limiter.when(&"va-1");
    limiter.when(&"va-1");
    assert_eq!(limiter.num_requeues(&"va-1"), 2);

    limiter.forget(&"va-1");

    assert_eq!(limiter.num_requeues(&"va-1"), 0);
    assert_eq!(limiter.when(&"va-1"), Duration::from_secs(1));
  }

  #[test]
  fn keys_back_off_independently() {
    let limiter = limiter();
    limiter.when(&"va-1");
    limiter.when(&"va-1");

    assert_eq!(limiter.when(&"va-2"), Duration::from_secs(1));
    assert_eq!(limiter.when(&"va-1"), Duration::from_secs(4));
  }
}
