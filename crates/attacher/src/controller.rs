//! Event driven controller. Attachment, volume and pod changes are turned
//! into keys on two work queues, one per direction, drained by a pool of
//! workers that hand each attachment to the selected handler.

use crate::{
  backoff::ExponentialFailureRateLimiter,
  config::Config,
  driver::Driver,
  error::{ControllerError, SyncError},
  handler::{select_handler, Handler},
  model::{PersistentVolume, Pod, VolumeAttachment},
  queue::WorkQueue,
  reconciler::Reconciler,
  store::{AttachmentClient, AttachmentLister, Change, Event},
};
use csi_proto::Plugin;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::{collections::HashSet, fmt, future::Future, sync::Arc};
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
  Attach,
  Detach,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Direction::Attach => f.write_str("attach"),
      Direction::Detach => f.write_str("detach"),
    }
  }
}

struct Inner {
  driver: String,
  lister: Arc<dyn AttachmentLister>,
  handler: Arc<dyn Handler>,
  attach_queue: Arc<WorkQueue<String>>,
  detach_queue: Arc<WorkQueue<String>>,
  // Keys a worker is syncing right now, in either direction.
  in_flight: Mutex<HashSet<String>>,
  config: Config,
}

pub struct AttachController {
  inner: Arc<Inner>,
  reconciler: Option<Arc<Reconciler>>,
}

impl AttachController {
  pub fn new(
    driver: &Driver,
    plugin: Arc<dyn Plugin>,
    lister: Arc<dyn AttachmentLister>,
    client: Arc<dyn AttachmentClient>,
    config: Config,
  ) -> Result<Self, ControllerError> {
    config.validate()?;

    let limiter = || {
      ExponentialFailureRateLimiter::new(config.retry_interval_start, config.retry_interval_max)
    };
    let attach_queue = WorkQueue::new("attach", limiter());
    let detach_queue = WorkQueue::new("detach", limiter());

    let handler = select_handler(
      driver,
      plugin.clone(),
      lister.clone(),
      client.clone(),
      &config,
    );

    let reconciler = if driver.supports_list_published() {
      Some(Arc::new(Reconciler::new(
        driver.name(),
        plugin,
        lister.clone(),
        client,
        attach_queue.clone(),
        detach_queue.clone(),
        config.timeout,
        config.reconcile_sync,
      )))
    } else {
      info!(driver = %driver.name(), "plugin cannot list published volumes, drift reconciliation disabled");
      None
    };

    Ok(Self {
      inner: Arc::new(Inner {
        driver: driver.name().to_owned(),
        lister,
        handler,
        attach_queue,
        detach_queue,
        in_flight: Mutex::new(HashSet::new()),
        config,
      }),
      reconciler,
    })
  }

  /// Runs until `shutdown` completes or `events` ends. Attachments already
  /// in the store are queued first, so a restarted controller picks up
  /// where the previous one left off.
  ///
  /// Workers finish the attachment they hold before this returns.
  pub async fn run<S, F>(self, mut events: S, shutdown: F) -> Result<(), ControllerError>
  where
    S: Stream<Item = Event> + Unpin,
    F: Future<Output = ()>,
  {
    let inner = self.inner;
    for va in inner.lister.volume_attachments() {
      inner.enqueue(&va);
    }

    info!(
      driver = %inner.driver,
      workers = inner.config.worker_threads,
      "starting attach controller"
    );
    let workers: Vec<_> = (0..inner.config.worker_threads)
      .map(|id| tokio::spawn(inner.clone().worker(id)))
      .collect();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let reconciler = self.reconciler.map(|reconciler| {
      tokio::spawn(async move {
        reconciler
          .run(async {
            let _ = stop_rx.await;
          })
          .await
      })
    });

    tokio::pin!(shutdown);
    let result = loop {
      tokio::select! {
        _ = &mut shutdown => break Ok(()),
        event = events.next() => match event {
          Some(event) => inner.handle_event(event),
          None => {
            error!("watch event stream terminated");
            break Err(ControllerError::WatchTerminated);
          }
        },
      }
    };

    info!("stopping attach controller");
    inner.attach_queue.shut_down();
    inner.detach_queue.shut_down();
    let _ = stop_tx.send(());

    if let Some(task) = reconciler {
      if let Err(e) = task.await {
        error!(error = %e, "reconciler task failed");
      }
    }
    for task in workers {
      if let Err(e) = task.await {
        error!(error = %e, "worker task failed");
      }
    }

    result
  }
}

impl Inner {
  fn queue(&self, direction: Direction) -> &Arc<WorkQueue<String>> {
    match direction {
      Direction::Attach => &self.attach_queue,
      Direction::Detach => &self.detach_queue,
    }
  }

  fn owns(&self, va: &VolumeAttachment) -> bool {
    va.spec.attacher == self.driver
  }

  fn enqueue(&self, va: &VolumeAttachment) {
    if !self.owns(va) {
      return;
    }

    let direction = if va.meta.is_deleting() {
      Direction::Detach
    } else {
      Direction::Attach
    };
    trace!(va = %va.name(), %direction, "enqueue");
    self.queue(direction).add(va.name().to_owned());
  }

  fn handle_event(&self, event: Event) {
    match event {
      Event::Attachment(change) => self.attachment_changed(change),
      Event::Volume(change) => self.volume_changed(change),
      Event::Pod(change) => self.pod_changed(change),
    }
  }

  fn attachment_changed(&self, change: Change<VolumeAttachment>) {
    match change {
      Change::Added(va) => self.enqueue(&va),
      Change::Updated { old, new } => {
        if only_errors_changed(&old, &new) {
          // Our own error write-back.
          trace!(va = %new.name(), "ignoring error status update");
          return;
        }

        self.enqueue(&new);
        if old.status.attached && !new.status.attached {
          self.enqueue_waiting_siblings(&new);
        }
      }
      Change::Deleted(va) => self.enqueue_waiting_siblings(&va),
    }
  }

  /// A reader or writer going away may unblock attachments of the same
  /// volume that were denied earlier.
  fn enqueue_waiting_siblings(&self, va: &VolumeAttachment) {
    let pv = match va.pv_name() {
      Some(pv) => pv,
      None => return,
    };

    for sibling in self.lister.volume_attachments() {
      if sibling.name() != va.name()
        && sibling.pv_name() == Some(pv)
        && !sibling.status.attached
        && !sibling.meta.is_deleting()
      {
        self.enqueue(&sibling);
      }
    }
  }

  fn volume_changed(&self, change: Change<PersistentVolume>) {
    if let Change::Deleted(_) = change {
      return;
    }

    let pv = change.object();
    for va in self.lister.volume_attachments() {
      if va.pv_name() == Some(pv.meta.name.as_str()) {
        self.enqueue(&va);
      }
    }
  }

  /// Pods decide whether a pending attachment is published read-only or
  /// read-write, so pending attachments on the pod's node are retried.
  fn pod_changed(&self, change: Change<Pod>) {
    let pod = change.object();
    if pod.spec.node_name.is_empty() {
      return;
    }

    let claims: HashSet<_> = pod.claim_names().collect();
    if claims.is_empty() {
      return;
    }

    for va in self.lister.volume_attachments() {
      if va.status.attached || va.spec.node_name != pod.spec.node_name {
        continue;
      }

      let bound_to_pod = va
        .pv_name()
        .and_then(|name| self.lister.persistent_volume(name))
        .and_then(|pv| pv.spec.claim_ref.clone())
        .map(|claim| claim.namespace == pod.meta.namespace && claims.contains(claim.name.as_str()))
        .unwrap_or(false);
      if bound_to_pod {
        self.enqueue(&va);
      }
    }
  }

  async fn worker(self: Arc<Self>, id: usize) {
    debug!(worker = id, "worker started");
    loop {
      let (direction, key) = tokio::select! {
        Some(key) = self.attach_queue.get() => (Direction::Attach, key),
        Some(key) = self.detach_queue.get() => (Direction::Detach, key),
        else => break,
      };

      self.process(direction, key).await;
    }
    debug!(worker = id, "worker stopped");
  }

  /// Syncs one key taken from the `direction` queue and settles its retry
  /// state.
  async fn process(&self, direction: Direction, key: String) {
    let queue = self.queue(direction);

    if !self.in_flight.lock().insert(key.clone()) {
      // The other direction holds it. Look again shortly.
      debug!(va = %key, %direction, "key is busy");
      queue.done(&key);
      queue.add_after(key, self.config.retry_interval_start);
      return;
    }

    let result = self.sync(direction, &key).await;
    self.in_flight.lock().remove(&key);

    match result {
      Ok(()) => queue.forget(&key),
      Err(e) if e.is_retryable() => {
        warn!(
          va = %key,
          %direction,
          error = %e,
          requeues = queue.num_requeues(&key),
          "sync failed, retrying"
        );
        queue.add_rate_limited(key.clone());
      }
      Err(e) => {
        error!(va = %key, %direction, error = %e, "sync failed permanently");
        queue.forget(&key);
      }
    }

    queue.done(&key);
  }

  #[instrument(name = "attacher.sync", skip(self, direction), fields(%direction))]
  async fn sync(&self, direction: Direction, key: &str) -> Result<(), SyncError> {
    // Always act on the latest state, not on the event that queued the key.
    let va = match self.lister.volume_attachment(key) {
      Some(va) => va,
      None => {
        debug!("attachment is gone");
        return Ok(());
      }
    };
    if !self.owns(&va) {
      return Ok(());
    }

    match (direction, va.meta.is_deleting()) {
      (Direction::Attach, false) => self.handler.sync_attach((*va).clone()).await,
      (Direction::Detach, true) => self.handler.sync_detach((*va).clone()).await,
      (Direction::Attach, true) => {
        debug!("attachment is being deleted, moving to detach");
        self.detach_queue.add(key.to_owned());
        Ok(())
      }
      (Direction::Detach, false) => {
        self.attach_queue.add(key.to_owned());
        Ok(())
      }
    }
  }
}

/// Whether `new` differs from `old` only in its attach or detach error.
fn only_errors_changed(old: &VolumeAttachment, new: &VolumeAttachment) -> bool {
  let strip = |va: &VolumeAttachment| {
    let mut va = va.clone();
    va.meta.resource_version = 0;
    va.status.attach_error = None;
    va.status.detach_error = None;
    va
  };

  strip(old) == strip(new)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    fake::{self, FakePlugin, FakeStore, PluginCall},
    model::{finalizer_name, VolumeError},
  };
  use csi_proto::{ControllerCapabilities, PluginCapabilities};
  use std::time::Duration;
  use test_case::test_case;
  use tonic::Status;

  struct Fixture {
    store: Arc<FakeStore>,
    plugin: Arc<FakePlugin>,
    controller: AttachController,
  }

  impl Fixture {
    fn inner(&self) -> &Inner {
      &self.controller.inner
    }

    fn queued(&self, direction: Direction, key: &str) -> bool {
      self.inner().queue(direction).contains(&key.to_owned())
    }
  }

  fn fixture(caps: ControllerCapabilities) -> Fixture {
    let store = Arc::new(FakeStore::new());
    store.add_volume(fake::volume("v1", "c1"));
    store.set_csi_node_id("n1", fake::DRIVER, "node-1");
    store.set_csi_node_id("n2", fake::DRIVER, "node-2");
    let plugin = Arc::new(FakePlugin::new(caps));
    let driver = Driver::new(fake::DRIVER, PluginCapabilities::CONTROLLER_SERVICE, caps);

    let controller = AttachController::new(
      &driver,
      plugin.clone(),
      store.clone(),
      store.clone(),
      Config::default(),
    )
    .unwrap();

    Fixture {
      store,
      plugin,
      controller,
    }
  }

  fn csi() -> Fixture {
    fixture(ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME)
  }

  #[test]
  fn rejects_invalid_config() {
    let store = Arc::new(FakeStore::new());
    let plugin = Arc::new(FakePlugin::new(ControllerCapabilities::empty()));
    let driver = Driver::new(fake::DRIVER, PluginCapabilities::empty(), ControllerCapabilities::empty());
    let config = Config {
      worker_threads: 0,
      ..Config::default()
    };

    let result = AttachController::new(&driver, plugin, store.clone(), store, config);

    assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
  }

  #[test_case(ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME => false ; "publish only")]
  #[test_case(ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME | ControllerCapabilities::LIST_VOLUMES | ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES => true ; "list published")]
  fn reconciler_depends_on_capabilities(caps: ControllerCapabilities) -> bool {
    fixture(caps).controller.reconciler.is_some()
  }

  #[tokio::test]
  async fn trivial_driver_attaches_without_calls() {
    let f = fixture(ControllerCapabilities::empty());
    for name in ["va-1", "va-2", "va-3"] {
      f.store.add_attachment(fake::attachment(name, "v1", "n1"));
      f.inner().process(Direction::Attach, name.to_owned()).await;
    }

    for name in ["va-1", "va-2", "va-3"] {
      assert!(f.store.volume_attachment(name).unwrap().status.attached);
    }
    assert!(f.plugin.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn deadline_exceeded_requeues_after_min_backoff() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.plugin
      .push_publish_result(Err(Status::deadline_exceeded("plugin too slow")));

    f.inner().process(Direction::Attach, "va-1".to_owned()).await;

    let va = f.store.volume_attachment("va-1").unwrap();
    assert!(!va.status.attached);
    assert!(va.status.attach_error.is_some());
    assert!(!f.queued(Direction::Attach, "va-1"));

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert!(f.queued(Direction::Attach, "va-1"));
  }

  #[tokio::test(start_paused = true)]
  async fn terminal_failure_is_not_retried() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.plugin
      .push_publish_result(Err(Status::invalid_argument("bad volume")));

    f.inner().process(Direction::Attach, "va-1".to_owned()).await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(f.store.volume_attachment("va-1").unwrap().status.attach_error.is_some());
    assert!(!f.queued(Direction::Attach, "va-1"));
    assert_eq!(f.inner().attach_queue.num_requeues(&"va-1".to_owned()), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn success_resets_backoff() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.plugin
      .push_publish_result(Err(Status::unavailable("restarting")));
    f.plugin
      .push_publish_result(Err(Status::unavailable("restarting")));

    let key = "va-1".to_owned();
    f.inner().process(Direction::Attach, key.clone()).await;
    f.inner().process(Direction::Attach, key.clone()).await;
    assert_eq!(f.inner().attach_queue.num_requeues(&key), 2);

    f.inner().process(Direction::Attach, key.clone()).await;
    assert_eq!(f.inner().attach_queue.num_requeues(&key), 0);
    assert!(f.store.volume_attachment("va-1").unwrap().status.attached);
  }

  #[tokio::test]
  async fn attached_attachment_is_left_alone() {
    let f = csi();
    f.store.add_attachment(fake::attached("va-1", "v1", "n1", false));

    f.inner().process(Direction::Attach, "va-1".to_owned()).await;
    f.inner().process(Direction::Attach, "va-1".to_owned()).await;

    assert!(f.plugin.calls().is_empty());
    assert!(f.store.writes().is_empty());
  }

  #[tokio::test]
  async fn deletion_waits_for_detach() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.inner().process(Direction::Attach, "va-1".to_owned()).await;

    f.store.delete_attachment("va-1");
    let va = f.store.volume_attachment("va-1").unwrap();
    assert!(va.status.attached);
    assert!(va.meta.is_deleting());

    f.inner().process(Direction::Detach, "va-1".to_owned()).await;

    assert!(f.store.volume_attachment("va-1").is_none());
    assert!(matches!(
      &f.plugin.calls()[..],
      [PluginCall::Publish { .. }, PluginCall::Unpublish { .. }]
    ));
  }

  #[tokio::test]
  async fn failed_detach_keeps_attachment() {
    let f = csi();
    f.store.add_attachment(fake::attached("va-1", "v1", "n1", false));
    f.store.delete_attachment("va-1");
    f.plugin
      .push_unpublish_result(Err(Status::internal("stuck")));

    f.inner().process(Direction::Detach, "va-1".to_owned()).await;

    let va = f.store.volume_attachment("va-1").unwrap();
    assert!(va.status.attached);
    assert!(va.status.detach_error.is_some());
    assert!(va.meta.has_finalizer(&finalizer_name(fake::DRIVER)));
  }

  #[tokio::test]
  async fn wrong_direction_is_moved() {
    let f = csi();
    f.store.add_attachment(fake::attached("va-1", "v1", "n1", false));
    f.store.delete_attachment("va-1");

    f.inner().process(Direction::Attach, "va-1".to_owned()).await;

    assert!(f.plugin.calls().is_empty());
    assert!(f.queued(Direction::Detach, "va-1"));
  }

  #[tokio::test]
  async fn other_attachers_are_ignored() {
    let f = csi();
    let mut va = fake::attachment("va-1", "v1", "n1");
    va.spec.attacher = "other.example.com".into();
    f.store.add_attachment(va.clone());

    f.inner().handle_event(Event::Attachment(Change::Added(Arc::new(va))));
    f.inner().process(Direction::Attach, "va-1".to_owned()).await;

    assert!(!f.queued(Direction::Attach, "va-1"));
    assert!(f.plugin.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn busy_key_is_deferred() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.inner().in_flight.lock().insert("va-1".to_owned());

    f.inner().process(Direction::Attach, "va-1".to_owned()).await;
    assert!(f.plugin.calls().is_empty());

    f.inner().in_flight.lock().remove("va-1");
    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert!(f.queued(Direction::Attach, "va-1"));
  }

  #[test]
  fn error_write_back_is_not_requeued() {
    let f = csi();
    let old = Arc::new(fake::attachment("va-1", "v1", "n1"));
    let mut new = (*old).clone();
    new.meta.resource_version += 1;
    new.status.attach_error = Some(VolumeError::now("boom"));

    f.inner().handle_event(Event::Attachment(Change::Updated {
      old,
      new: Arc::new(new),
    }));

    assert!(f.inner().attach_queue.is_empty());
  }

  #[test]
  fn deletion_event_goes_to_detach_queue() {
    let f = csi();
    let old = Arc::new(fake::attached("va-1", "v1", "n1", false));
    let mut new = (*old).clone();
    new.meta.deletion_timestamp = Some(std::time::SystemTime::now());

    f.inner().handle_event(Event::Attachment(Change::Updated {
      old,
      new: Arc::new(new),
    }));

    assert!(f.queued(Direction::Detach, "va-1"));
    assert!(f.inner().attach_queue.is_empty());
  }

  #[test]
  fn detached_writer_wakes_waiting_readers() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-2", "v1", "n2"));
    let old = Arc::new(fake::attached("va-1", "v1", "n1", false));

    f.inner().handle_event(Event::Attachment(Change::Deleted(old)));

    assert!(f.queued(Direction::Attach, "va-2"));
  }

  #[test]
  fn pod_event_requeues_pending_attachment_on_its_node() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.store.add_attachment(fake::attachment("va-2", "v1", "n2"));
    f.store.add_attachment(fake::attached("va-3", "v1", "n1", true));

    let pod = Arc::new(fake::pod("app", "c1", "n1", false));
    f.inner().handle_event(Event::Pod(Change::Added(pod)));

    assert!(f.queued(Direction::Attach, "va-1"));
    assert!(!f.queued(Direction::Attach, "va-2"));
    assert!(!f.queued(Direction::Attach, "va-3"));
  }

  #[test]
  fn volume_event_requeues_its_attachments() {
    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    f.store.add_volume(fake::volume("v2", "c2"));
    f.store.add_attachment(fake::attachment("va-2", "v2", "n1"));

    let pv = f.store.persistent_volume("v1").unwrap();
    f.inner().handle_event(Event::Volume(Change::Added(pv)));

    assert!(f.queued(Direction::Attach, "va-1"));
    assert!(!f.queued(Direction::Attach, "va-2"));
  }

  #[tokio::test(start_paused = true)]
  async fn run_attaches_existing_and_new_attachments() {
    let _ = tracing_subscriber::fmt()
      .with_test_writer()
      .with_env_filter("csi_attacher=debug")
      .try_init();

    let f = csi();
    f.store.add_attachment(fake::attachment("va-1", "v1", "n1"));
    let events = f.store.subscribe();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(f.controller.run(events, async {
      let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    f.store.add_attachment(fake::attachment("va-2", "v1", "n2"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ = tx.send(());
    task.await.unwrap().unwrap();

    assert!(f.store.volume_attachment("va-1").unwrap().status.attached);
    assert!(f.store.volume_attachment("va-2").unwrap().status.attached);
    assert_eq!(f.plugin.publish_calls(), 2);
  }

  #[tokio::test]
  async fn run_fails_when_watch_ends() {
    let f = csi();

    let result = f
      .controller
      .run(futures::stream::empty::<Event>(), futures::future::pending::<()>())
      .await;

    assert!(matches!(result, Err(ControllerError::WatchTerminated)));
  }
}
