//! Single-flight leases keyed by workflow id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::ScheduleError;

#[derive(Debug, Clone)]
struct Lease {
  run_id: String,
  token: u64,
  expires_at: Instant,
}

/// At most one live lease per workflow id.
///
/// A lease carries an expiry so a run that never releases it cannot block its
/// workflow forever. An expired lease is taken over by the next acquirer.
#[derive(Debug)]
pub struct LeaseTable {
  ttl: Duration,
  next_token: AtomicU64,
  leases: Mutex<HashMap<String, Lease>>,
}

impl LeaseTable {
  pub fn new(ttl: Duration) -> Arc<Self> {
    Arc::new(Self {
      ttl,
      next_token: AtomicU64::new(1),
      leases: Mutex::new(HashMap::new()),
    })
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Lease>> {
    self.leases.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Take the lease for a workflow, or report the run holding it.
  pub fn acquire(
    self: &Arc<Self>,
    workflow_id: &str,
    run_id: &str,
  ) -> Result<LeaseGuard, ScheduleError> {
    let now = Instant::now();
    let mut leases = self.lock();

    if let Some(held) = leases.get(workflow_id) {
      if held.expires_at > now {
        return Err(ScheduleError::Conflict {
          workflow_id: workflow_id.to_string(),
          run_id: held.run_id.clone(),
        });
      }
      warn!(
        workflow_id = %workflow_id,
        expired_run_id = %held.run_id,
        run_id = %run_id,
        "lease_expired_takeover"
      );
    }

    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
    leases.insert(
      workflow_id.to_string(),
      Lease {
        run_id: run_id.to_string(),
        token,
        expires_at: now + self.ttl,
      },
    );

    Ok(LeaseGuard {
      table: Arc::clone(self),
      workflow_id: workflow_id.to_string(),
      token,
    })
  }

  /// The run holding a live lease for the workflow.
  pub fn holder(&self, workflow_id: &str) -> Option<String> {
    let now = Instant::now();
    self
      .lock()
      .get(workflow_id)
      .filter(|lease| lease.expires_at > now)
      .map(|lease| lease.run_id.clone())
  }

  fn release(&self, workflow_id: &str, token: u64) {
    let mut leases = self.lock();
    // A lease taken over after expiry belongs to someone else now.
    if leases.get(workflow_id).is_some_and(|l| l.token == token) {
      leases.remove(workflow_id);
    }
  }
}

/// Releases its lease when dropped, whatever the run's outcome.
#[derive(Debug)]
pub struct LeaseGuard {
  table: Arc<LeaseTable>,
  workflow_id: String,
  token: u64,
}

impl Drop for LeaseGuard {
  fn drop(&mut self) {
    self.table.release(&self.workflow_id, self.token);
  }
}
