//! Rate limited work queue with per key de-duplication.
//!
//! A key is queued at most once. A key added while a worker holds it is
//! parked in the dirty set and queued again once the worker calls
//! [`WorkQueue::done`], so no two workers ever hold the same key.

use crate::backoff::RateLimiter;
use parking_lot::Mutex;
use std::{
  collections::{HashSet, VecDeque},
  fmt,
  hash::Hash,
  sync::Arc,
  time::Duration,
};
use tokio::sync::Notify;
use tracing::trace;

struct State<K> {
  queue: VecDeque<K>,
  dirty: HashSet<K>,
  processing: HashSet<K>,
  shutting_down: bool,
}

pub struct WorkQueue<K> {
  name: &'static str,
  state: Mutex<State<K>>,
  notify: Notify,
  limiter: Box<dyn RateLimiter<K>>,
}

impl<K> WorkQueue<K>
where
  K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
  pub fn new(name: &'static str, limiter: impl RateLimiter<K> + 'static) -> Arc<Self> {
    Arc::new(Self {
      name,
      state: Mutex::new(State {
        queue: VecDeque::new(),
        dirty: HashSet::new(),
        processing: HashSet::new(),
        shutting_down: false,
      }),
      notify: Notify::new(),
      limiter: Box::new(limiter),
    })
  }

  #[inline]
  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn add(&self, key: K) {
    let mut state = self.state.lock();
    if state.shutting_down || state.dirty.contains(&key) {
      return;
    }

    trace!(queue = self.name, ?key, "add");
    state.dirty.insert(key.clone());
    if state.processing.contains(&key) {
      return;
    }

    state.queue.push_back(key);
    drop(state);
    self.notify.notify_one();
  }

  /// Adds `key` once `delay` has passed.
  pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
    if self.is_shutting_down() {
      return;
    }

    if delay.is_zero() {
      self.add(key);
      return;
    }

    let queue = Arc::clone(self);
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      queue.add(key);
    });
  }

  /// Adds `key` after the delay its failure history calls for.
  pub fn add_rate_limited(self: &Arc<Self>, key: K) {
    let delay = self.limiter.when(&key);
    trace!(queue = self.name, ?key, ?delay, "requeue");
    self.add_after(key, delay);
  }

  pub fn forget(&self, key: &K) {
    self.limiter.forget(key);
  }

  pub fn num_requeues(&self, key: &K) -> u32 {
    self.limiter.num_requeues(key)
  }

  /// Waits for the next key. Returns `None` once the queue is shut down.
  /// The caller owns the key until it calls [`WorkQueue::done`].
  ///
  /// Dropping the returned future before it completes loses nothing.
  pub async fn get(&self) -> Option<K> {
    loop {
      let notified = self.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if let Some(key) = state.queue.pop_front() {
          state.dirty.remove(&key);
          state.processing.insert(key.clone());
          return Some(key);
        }

        if state.shutting_down {
          return None;
        }
      }

      notified.await;
    }
  }

  pub fn done(&self, key: &K) {
    let mut state = self.state.lock();
    state.processing.remove(key);
    if state.dirty.contains(key) {
      state.queue.push_back(key.clone());
      drop(state);
      self.notify.notify_one();
    }
  }

  /// Stops accepting keys and wakes every waiting worker. Keys still queued
  /// are dropped.
  pub fn shut_down(&self) {
    let mut state = self.state.lock();
    state.shutting_down = true;
    state.queue.clear();
    drop(state);
    self.notify.notify_waiters();
  }

  pub fn is_shutting_down(&self) -> bool {
    self.state.lock().shutting_down
  }

  /// Number of keys waiting to be handed out.
  pub fn len(&self) -> usize {
    self.state.lock().queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, key: &K) -> bool {
    self.state.lock().queue.contains(key)
  }
}
