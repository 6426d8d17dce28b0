//! Periodic comparison of the attachments in the store with the volumes the
//! plugin reports as published. Catches detaches and publishes that happened
//! behind the controller's back, for instance while it was not running.

use crate::{
  model::{VolumeAttachment, VolumeAttachmentSource},
  queue::WorkQueue,
  store::{AttachmentClient, AttachmentLister},
};
use csi_proto::{ListVolumesRequest, Plugin};
use std::{
  collections::{HashMap, HashSet},
  future::Future,
  sync::Arc,
  time::Duration,
};
use tonic::Status;
use tracing::{debug, info, instrument, warn};

pub struct Reconciler {
  driver: String,
  plugin: Arc<dyn Plugin>,
  lister: Arc<dyn AttachmentLister>,
  client: Arc<dyn AttachmentClient>,
  attach_queue: Arc<WorkQueue<String>>,
  detach_queue: Arc<WorkQueue<String>>,
  timeout: Duration,
  period: Duration,
}

impl Reconciler {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    driver: impl Into<String>,
    plugin: Arc<dyn Plugin>,
    lister: Arc<dyn AttachmentLister>,
    client: Arc<dyn AttachmentClient>,
    attach_queue: Arc<WorkQueue<String>>,
    detach_queue: Arc<WorkQueue<String>>,
    timeout: Duration,
    period: Duration,
  ) -> Self {
    Self {
      driver: driver.into(),
      plugin,
      lister,
      client,
      attach_queue,
      detach_queue,
      timeout,
      period,
    }
  }

  /// Reconciles every `period` until `shutdown` completes. The first pass
  /// runs one period after start, once the queues had a chance to drain.
  pub async fn run(&self, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    let start = tokio::time::Instant::now() + self.period;
    let mut ticks = tokio::time::interval_at(start, self.period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        _ = ticks.tick() => {
          if let Err(e) = self.reconcile().await {
            warn!(error = %e, "failed to list published volumes, retrying next period");
          }
        }
      }
    }

    debug!("reconciler stopped");
  }

  /// One pass over all attachments of this driver.
  #[instrument(name = "attacher.reconcile", skip(self), fields(driver = %self.driver))]
  pub async fn reconcile(&self) -> Result<(), Status> {
    let published = self.published().await?;
    let mut known = HashSet::new();

    for va in self.lister.volume_attachments() {
      if va.spec.attacher != self.driver {
        continue;
      }

      let (handle, node_id) = match self.target(&va) {
        Some(v) => v,
        None => continue,
      };

      let is_published = published
        .get(&handle)
        .map(|nodes| nodes.contains(&node_id))
        .unwrap_or(false);
      known.insert((handle.clone(), node_id.clone()));

      match (va.status.attached, is_published) {
        (true, false) => {
          info!(va = %va.name(), volume = %handle, node = %node_id, "attached volume is no longer published");
          self.mark(&va, false).await;
          self.enqueue(&va);
        }
        (false, true) if va.meta.is_deleting() => {
          info!(va = %va.name(), volume = %handle, node = %node_id, "deleted attachment is still published");
          self.mark(&va, true).await;
          self.enqueue(&va);
        }
        // A failed attach is already retried by its queue if it can succeed
        // at all.
        (false, true) if va.status.attach_error.is_none() => {
          debug!(va = %va.name(), volume = %handle, "volume is published ahead of its attachment");
          self.enqueue(&va);
        }
        _ => {}
      }
    }

    for (handle, nodes) in &published {
      for node_id in nodes {
        if !known.contains(&(handle.clone(), node_id.clone())) {
          debug!(volume = %handle, node = %node_id, "published volume has no attachment");
        }
      }
    }

    Ok(())
  }

  /// Published node ids per volume handle, following pagination.
  async fn published(&self) -> Result<HashMap<String, HashSet<String>>, Status> {
    let mut published = HashMap::new();
    let mut token = None;

    loop {
      let request = ListVolumesRequest::new().with_starting_token(token.take());
      let response = tokio::time::timeout(self.timeout, self.plugin.list_volumes(request))
        .await
        .map_err(|_| {
          Status::deadline_exceeded(format!("ListVolumes timed out after {:?}", self.timeout))
        })??;

      let (entries, next_token) = response.into_parts();
      for entry in entries {
        published
          .entry(entry.volume_id().to_owned())
          .or_insert_with(HashSet::new)
          .extend(entry.published_node_ids().iter().cloned());
      }

      match next_token {
        Some(next) => token = Some(next),
        None => return Ok(published),
      }
    }
  }

  /// Volume handle and CSI node id the attachment maps to, when both can be
  /// resolved right now.
  fn target(&self, va: &VolumeAttachment) -> Option<(String, String)> {
    let csi = match &va.spec.source {
      VolumeAttachmentSource::PersistentVolume(name) => self
        .lister
        .persistent_volume(name)
        .and_then(|pv| pv.spec.csi.clone()),
      VolumeAttachmentSource::Inline(spec) => spec.csi.clone(),
    }?;
    if csi.driver != self.driver {
      return None;
    }

    let node_id = self.lister.csi_node_id(&va.spec.node_name, &self.driver)?;
    Some((csi.volume_handle, node_id))
  }

  async fn mark(&self, va: &VolumeAttachment, attached: bool) {
    let mut updated = va.clone();
    updated.status.attached = attached;
    if !attached {
      updated.status.attachment_metadata.clear();
    }

    if let Err(e) = self.client.update_status(&updated).await {
      // The workers pick the attachment up from the resulting event or the
      // next pass.
      warn!(va = %va.name(), error = %e, "failed to record drift");
    }
  }

  fn enqueue(&self, va: &VolumeAttachment) {
    let key = va.name().to_owned();
    if va.meta.is_deleting() {
      self.detach_queue.add(key);
    } else {
      self.attach_queue.add(key);
    }
  }
}
