//! In-memory store and plugin for exercising the attacher without a cluster
//! or a driver.

use crate::{
  model::*,
  store::{ApiError, AttachmentClient, AttachmentLister, Change, Event},
};
use async_trait::async_trait;
use csi_proto::{
  AccessMode, ControllerCapabilities, ControllerPublishVolumeError,
  ControllerPublishVolumeRequest, ControllerPublishVolumeResponse,
  ControllerUnpublishVolumeError, ControllerUnpublishVolumeRequest, ListVolumesError,
  ListVolumesRequest, ListVolumesResponse, Plugin, PluginCapabilities, PluginInfo,
  VolumeListEntry, VolumeStatus,
};
use futures::channel::mpsc;
use parking_lot::Mutex;
use std::{
  collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
  sync::Arc,
  time::{Duration, SystemTime},
};
use tonic::Status;
use tracing::info;

pub const DRIVER: &str = "csi.example.com";
pub const NAMESPACE: &str = "default";

/// A bound CSI persistent volume with handle `handle-<name>`.
pub fn volume(name: &str, claim: &str) -> PersistentVolume {
  PersistentVolume {
    meta: ObjectMeta::named(name),
    spec: PersistentVolumeSpec {
      csi: Some(CsiVolumeSource {
        driver: DRIVER.into(),
        volume_handle: format!("handle-{}", name),
        fs_type: Some("ext4".into()),
        ..Default::default()
      }),
      access_modes: vec![PersistentVolumeAccessMode::ReadWriteOnce],
      claim_ref: Some(ObjectKey::namespaced(NAMESPACE, claim)),
      volume_mode: PersistentVolumeMode::Filesystem,
      mount_options: Vec::new(),
    },
  }
}

/// A fresh attachment of persistent volume `pv` to `node`.
pub fn attachment(name: &str, pv: &str, node: &str) -> VolumeAttachment {
  VolumeAttachment {
    meta: ObjectMeta::named(name),
    spec: VolumeAttachmentSpec {
      attacher: DRIVER.into(),
      node_name: node.into(),
      source: VolumeAttachmentSource::PersistentVolume(pv.into()),
    },
    status: VolumeAttachmentStatus::default(),
  }
}

/// An attachment already attached by this driver.
pub fn attached(name: &str, pv: &str, node: &str, readonly: bool) -> VolumeAttachment {
  let mut va = attachment(name, pv, node);
  va.meta.finalizers.push(finalizer_name(DRIVER));
  va.status.attached = true;
  va
    .status
    .attachment_metadata
    .insert(READONLY_ATTACHMENT_KEY.into(), readonly.to_string());
  va
}

/// A running pod on `node` mounting `claim` in a single container.
pub fn pod(name: &str, claim: &str, node: &str, read_only: bool) -> Pod {
  Pod {
    meta: ObjectMeta {
      name: name.into(),
      namespace: NAMESPACE.into(),
      ..Default::default()
    },
    spec: PodSpec {
      node_name: node.into(),
      volumes: vec![PodVolume {
        name: "data".into(),
        persistent_volume_claim: Some(ClaimVolumeSource {
          claim_name: claim.into(),
          read_only: false,
        }),
      }],
      containers: vec![Container {
        name: "app".into(),
        volume_mounts: vec![VolumeMount {
          name: "data".into(),
          mount_path: "/data".into(),
          read_only,
        }],
      }],
    },
    phase: PodPhase::Running,
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeWrite {
  Status(String),
  Metadata(String),
}

#[derive(Default)]
struct FakeStoreInner {
  attachments: BTreeMap<String, Arc<VolumeAttachment>>,
  volumes: BTreeMap<String, Arc<PersistentVolume>>,
  pods: BTreeMap<ObjectKey, Arc<Pod>>,
  node_ids: HashMap<(String, String), String>,
  secrets: HashMap<ObjectKey, HashMap<String, String>>,
  resource_version: u64,
  failures: VecDeque<ApiError>,
  log: Vec<FakeWrite>,
  subscribers: Vec<mpsc::UnboundedSender<Event>>,
}

impl FakeStoreInner {
  fn next_version(&mut self) -> u64 {
    self.resource_version += 1;
    self.resource_version
  }

  fn emit(&mut self, event: Event) {
    self
      .subscribers
      .retain(|s| s.unbounded_send(event.clone()).is_ok());
  }

  fn store_attachment(&mut self, mut va: VolumeAttachment) -> Arc<VolumeAttachment> {
    va.meta.resource_version = self.next_version();
    let va = Arc::new(va);
    let change = match self.attachments.insert(va.meta.name.clone(), va.clone()) {
      Some(old) => Change::Updated {
        old,
        new: va.clone(),
      },
      None => Change::Added(va.clone()),
    };

    self.emit(Event::Attachment(change));
    va
  }

  fn remove_attachment(&mut self, name: &str) {
    if let Some(va) = self.attachments.remove(name) {
      self.emit(Event::Attachment(Change::Deleted(va)));
    }
  }

  /// Current stored copy of `va`, provided `va` is based on it.
  fn current(&mut self, va: &VolumeAttachment) -> Result<Arc<VolumeAttachment>, ApiError> {
    if let Some(err) = self.failures.pop_front() {
      return Err(err);
    }

    let current = self
      .attachments
      .get(&va.meta.name)
      .cloned()
      .ok_or_else(|| ApiError::NotFound {
        kind: "VolumeAttachment",
        name: va.meta.name.clone(),
      })?;

    if current.meta.resource_version != va.meta.resource_version {
      return Err(ApiError::Conflict {
        kind: "VolumeAttachment",
        name: va.meta.name.clone(),
      });
    }

    Ok(current)
  }
}

/// Orchestrator API double. Writes bump the resource version, are checked
/// for conflicts and are fed back to subscribers as events.
#[derive(Default)]
pub struct FakeStore(Mutex<FakeStoreInner>);

impl FakeStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Events for every change from now on.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded();
    self.0.lock().subscribers.push(tx);
    rx
  }

  /// Creates or replaces an attachment, like its owner would.
  pub fn add_attachment(&self, va: VolumeAttachment) {
    self.0.lock().store_attachment(va);
  }

  /// Requests deletion. The attachment stays until its finalizers are gone.
  pub fn delete_attachment(&self, name: &str) {
    let mut inner = self.0.lock();
    let va = match inner.attachments.get(name) {
      Some(va) => va.clone(),
      None => return,
    };

    if va.meta.finalizers.is_empty() {
      inner.remove_attachment(name);
      return;
    }

    if !va.meta.is_deleting() {
      let mut va = (*va).clone();
      va.meta.deletion_timestamp = Some(SystemTime::now());
      inner.store_attachment(va);
    }
  }

  pub fn add_volume(&self, pv: PersistentVolume) {
    let mut inner = self.0.lock();
    let pv = Arc::new(pv);
    let change = match inner.volumes.insert(pv.meta.name.clone(), pv.clone()) {
      Some(old) => Change::Updated { old, new: pv },
      None => Change::Added(pv),
    };
    inner.emit(Event::Volume(change));
  }

  pub fn add_pod(&self, pod: Pod) {
    let mut inner = self.0.lock();
    let pod = Arc::new(pod);
    let key = ObjectKey::namespaced(pod.meta.namespace.clone(), pod.meta.name.clone());
    let change = match inner.pods.insert(key, pod.clone()) {
      Some(old) => Change::Updated { old, new: pod },
      None => Change::Added(pod),
    };
    inner.emit(Event::Pod(change));
  }

  pub fn remove_pod(&self, namespace: &str, name: &str) {
    let mut inner = self.0.lock();
    if let Some(pod) = inner.pods.remove(&ObjectKey::namespaced(namespace, name)) {
      inner.emit(Event::Pod(Change::Deleted(pod)));
    }
  }

  pub fn set_csi_node_id(&self, node: &str, driver: &str, node_id: &str) {
    self
      .0
      .lock()
      .node_ids
      .insert((node.into(), driver.into()), node_id.into());
  }

  pub fn add_secret<'a>(&self, key: ObjectKey, data: impl IntoIterator<Item = (&'a str, &'a str)>) {
    let data = data
      .into_iter()
      .map(|(k, v)| (k.to_owned(), v.to_owned()))
      .collect();
    self.0.lock().secrets.insert(key, data);
  }

  /// Makes the next write fail with `err`.
  pub fn fail_next_write(&self, err: ApiError) {
    self.0.lock().failures.push_back(err);
  }

  /// Writes issued through [`AttachmentClient`], oldest first.
  pub fn writes(&self) -> Vec<FakeWrite> {
    self.0.lock().log.clone()
  }

  pub fn reset_writes(&self) {
    self.0.lock().log.clear();
  }
}

impl AttachmentLister for FakeStore {
  fn volume_attachment(&self, name: &str) -> Option<Arc<VolumeAttachment>> {
    self.0.lock().attachments.get(name).cloned()
  }

  fn volume_attachments(&self) -> Vec<Arc<VolumeAttachment>> {
    self.0.lock().attachments.values().cloned().collect()
  }

  fn persistent_volume(&self, name: &str) -> Option<Arc<PersistentVolume>> {
    self.0.lock().volumes.get(name).cloned()
  }

  fn pods(&self) -> Vec<Arc<Pod>> {
    self.0.lock().pods.values().cloned().collect()
  }

  fn csi_node_id(&self, node_name: &str, driver: &str) -> Option<String> {
    self
      .0
      .lock()
      .node_ids
      .get(&(node_name.to_owned(), driver.to_owned()))
      .cloned()
  }
}

#[async_trait]
impl AttachmentClient for FakeStore {
  async fn update_status(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, ApiError> {
    let mut inner = self.0.lock();
    let current = inner.current(va)?;

    let mut next = (*current).clone();
    next.status = va.status.clone();
    inner.log.push(FakeWrite::Status(va.meta.name.clone()));
    Ok((*inner.store_attachment(next)).clone())
  }

  async fn update(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, ApiError> {
    let mut inner = self.0.lock();
    let current = inner.current(va)?;

    let mut next = (*current).clone();
    next.meta.finalizers = va.meta.finalizers.clone();
    next.meta.annotations = va.meta.annotations.clone();
    inner.log.push(FakeWrite::Metadata(va.meta.name.clone()));

    if next.meta.is_deleting() && next.meta.finalizers.is_empty() {
      inner.remove_attachment(&next.meta.name);
      return Ok(next);
    }

    Ok((*inner.store_attachment(next)).clone())
  }

  async fn secret(&self, key: &ObjectKey) -> Result<HashMap<String, String>, ApiError> {
    self
      .0
      .lock()
      .secrets
      .get(key)
      .cloned()
      .ok_or_else(|| ApiError::NotFound {
        kind: "Secret",
        name: key.to_string(),
      })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginCall {
  Publish {
    volume_id: String,
    node_id: String,
    readonly: bool,
    access_mode: AccessMode,
  },
  Unpublish {
    volume_id: String,
    node_id: String,
  },
  ListVolumes {
    starting_token: Option<String>,
  },
}

struct FakePluginInner {
  ready: bool,
  plugin: PluginCapabilities,
  controller: ControllerCapabilities,
  publish_results: VecDeque<Result<(), Status>>,
  unpublish_results: VecDeque<Result<(), Status>>,
  publish_context: HashMap<String, String>,
  published: BTreeMap<String, BTreeSet<String>>,
  last_secrets: HashMap<String, String>,
  calls: Vec<PluginCall>,
  delay: Duration,
  page_size: Option<usize>,
}

/// Plugin double. Calls succeed unless a failure was queued, and
/// publishing state is tracked so `list_volumes` reflects it.
pub struct FakePlugin(Mutex<FakePluginInner>);

impl FakePlugin {
  pub fn new(controller: ControllerCapabilities) -> Self {
    Self(Mutex::new(FakePluginInner {
      ready: true,
      plugin: PluginCapabilities::CONTROLLER_SERVICE,
      controller,
      publish_results: VecDeque::new(),
      unpublish_results: VecDeque::new(),
      publish_context: HashMap::new(),
      published: BTreeMap::new(),
      last_secrets: HashMap::new(),
      calls: Vec::new(),
      delay: Duration::ZERO,
      page_size: None,
    }))
  }

  pub fn set_ready(&self, ready: bool) {
    self.0.lock().ready = ready;
  }

  pub fn set_plugin_capabilities(&self, caps: PluginCapabilities) {
    self.0.lock().plugin = caps;
  }

  /// Result of the next publish call. Unscripted calls succeed.
  pub fn push_publish_result(&self, result: Result<(), Status>) {
    self.0.lock().publish_results.push_back(result);
  }

  pub fn push_unpublish_result(&self, result: Result<(), Status>) {
    self.0.lock().unpublish_results.push_back(result);
  }

  pub fn set_publish_context<'a>(&self, context: impl IntoIterator<Item = (&'a str, &'a str)>) {
    self.0.lock().publish_context = context
      .into_iter()
      .map(|(k, v)| (k.to_owned(), v.to_owned()))
      .collect();
  }

  /// Delay before every publish and unpublish call completes.
  pub fn set_delay(&self, delay: Duration) {
    self.0.lock().delay = delay;
  }

  /// Splits `list_volumes` responses into pages of `size` entries.
  pub fn set_page_size(&self, size: usize) {
    self.0.lock().page_size = Some(size);
  }

  /// Records `volume_id` as published on `node_id` behind the
  /// attacher's back.
  pub fn set_published(&self, volume_id: &str, node_id: &str) {
    self
      .0
      .lock()
      .published
      .entry(volume_id.into())
      .or_default()
      .insert(node_id.into());
  }

  /// Forgets a publication behind the attacher's back.
  pub fn unpublish_silently(&self, volume_id: &str, node_id: &str) {
    if let Some(nodes) = self.0.lock().published.get_mut(volume_id) {
      nodes.remove(node_id);
    }
  }

  pub fn is_published(&self, volume_id: &str, node_id: &str) -> bool {
    self
      .0
      .lock()
      .published
      .get(volume_id)
      .map(|nodes| nodes.contains(node_id))
      .unwrap_or(false)
  }

  pub fn calls(&self) -> Vec<PluginCall> {
    self.0.lock().calls.clone()
  }

  /// Number of publish and unpublish calls made so far.
  pub fn publish_calls(&self) -> usize {
    self
      .0
      .lock()
      .calls
      .iter()
      .filter(|c| !matches!(c, PluginCall::ListVolumes { .. }))
      .count()
  }

  pub fn last_secrets(&self) -> HashMap<String, String> {
    self.0.lock().last_secrets.clone()
  }

  fn delay(&self) -> Duration {
    self.0.lock().delay
  }
}

#[async_trait]
impl Plugin for FakePlugin {
  async fn plugin_info(&self) -> Result<PluginInfo, Status> {
    Ok(PluginInfo::new(DRIVER, "0.1.0"))
  }

  async fn probe(&self) -> Result<bool, Status> {
    Ok(self.0.lock().ready)
  }

  async fn plugin_capabilities(&self) -> Result<PluginCapabilities, Status> {
    Ok(self.0.lock().plugin)
  }

  async fn controller_capabilities(&self) -> Result<ControllerCapabilities, Status> {
    Ok(self.0.lock().controller)
  }

  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    {
      let mut inner = self.0.lock();
      inner.calls.push(PluginCall::Publish {
        volume_id: request.volume_id().to_owned(),
        node_id: request.node_id().to_owned(),
        readonly: request.readonly(),
        access_mode: request.volume_capability().access_mode(),
      });
      inner.last_secrets = request.secrets().clone();
    }

    let delay = self.delay();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }

    let mut inner = self.0.lock();
    inner
      .publish_results
      .pop_front()
      .unwrap_or(Ok(()))
      .map_err(ControllerPublishVolumeError::from_status)?;

    info!(volume = %request.volume_id(), node = %request.node_id(), "fake publish");
    inner
      .published
      .entry(request.volume_id().to_owned())
      .or_default()
      .insert(request.node_id().to_owned());
    Ok(ControllerPublishVolumeResponse::new(
      inner.publish_context.clone(),
    ))
  }

  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    self.0.lock().calls.push(PluginCall::Unpublish {
      volume_id: request.volume_id().to_owned(),
      node_id: request.node_id().to_owned(),
    });

    let delay = self.delay();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }

    let mut inner = self.0.lock();
    inner.unpublish_results.pop_front().unwrap_or(Ok(()))?;

    if let Some(nodes) = inner.published.get_mut(request.volume_id()) {
      nodes.remove(request.node_id());
    }
    Ok(())
  }

  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    let mut inner = self.0.lock();
    inner.calls.push(PluginCall::ListVolumes {
      starting_token: request.starting_token().map(ToOwned::to_owned),
    });

    if !inner.controller.contains(ControllerCapabilities::LIST_VOLUMES) {
      return Err(Status::unimplemented("ListVolumes is not supported").into());
    }

    let start = match request.starting_token() {
      None => 0,
      Some(token) => token
        .parse::<usize>()
        .ok()
        .filter(|start| *start <= inner.published.len())
        .ok_or_else(|| ListVolumesError::InvalidStartingToken(token.to_owned()))?,
    };
    let size = request
      .max_entries()
      .map(|n| n.get() as usize)
      .or(inner.page_size)
      .unwrap_or(usize::MAX);

    let entries: Vec<_> = inner
      .published
      .iter()
      .skip(start)
      .take(size)
      .map(|(volume_id, nodes)| {
        VolumeListEntry::new(
          volume_id.clone(),
          Some(VolumeStatus::new(nodes.iter().cloned().collect())),
        )
      })
      .collect();

    let end = start + entries.len();
    let next_token = if end < inner.published.len() {
      Some(end.to_string())
    } else {
      None
    };

    Ok(ListVolumesResponse::new(entries, next_token))
  }
}
