//! Deciding when runs start.
//!
//! The scheduler owns the single-flight leases: every run it starts holds its
//! workflow's lease until the run task ends, whatever the outcome. Automatic
//! fires come from each workflow's cron expression, evaluated in UTC.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use certloom_config::WorkflowDef;
use certloom_store::{StoreError, TriggerReason, WorkflowStore};
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{ExecutionError, ScheduleError};
use crate::executor::{Executor, RunReport};
use crate::lease::LeaseTable;

/// Parse a cron expression. Five fields are minute precision; six include
/// seconds.
pub fn parse_cron(expression: &str) -> Result<Schedule, ScheduleError> {
  let trimmed = expression.trim();
  let normalized = match trimmed.split_whitespace().count() {
    5 => format!("0 {trimmed}"),
    _ => trimmed.to_string(),
  };
  Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
    expression: expression.to_string(),
    message: e.to_string(),
  })
}

/// The first fire time strictly after `after`.
pub fn next_fire(
  expression: &str,
  after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
  Ok(parse_cron(expression)?.after(&after).next())
}

/// A run that has been started.
#[derive(Debug)]
pub struct RunHandle {
  pub run_id: String,
  pub workflow_id: String,
  join: JoinHandle<Result<RunReport, ExecutionError>>,
}

impl RunHandle {
  /// Wait for the run to reach a terminal state.
  pub async fn wait(self) -> Result<RunReport, ScheduleError> {
    Ok(self.join.await??)
  }
}

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Removes a run from the in-flight map when its task ends, including by panic.
struct InFlightGuard {
  running: InFlight,
  run_id: String,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    lock(&self.running).remove(&self.run_id);
  }
}

pub struct Scheduler {
  executor: Arc<Executor>,
  workflows: Arc<dyn WorkflowStore>,
  leases: Arc<LeaseTable>,
  running: InFlight,
  last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
  shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
  pub fn new(executor: Arc<Executor>, workflows: Arc<dyn WorkflowStore>) -> Self {
    let leases = LeaseTable::new(executor.config().lease_ttl());
    Self {
      executor,
      workflows,
      leases,
      running: Arc::new(Mutex::new(HashMap::new())),
      last_fired: Mutex::new(HashMap::new()),
      shutdown: CancellationToken::new(),
    }
  }

  pub fn executor(&self) -> &Arc<Executor> {
    &self.executor
  }

  /// Start a run now. Disabled workflows can still be run by hand.
  pub async fn trigger_manual(&self, workflow_id: &str) -> Result<RunHandle, ScheduleError> {
    let workflow = self.workflow(workflow_id).await?;
    self.start(&workflow, TriggerReason::Manual).await
  }

  /// Cancel an in-flight run.
  pub fn cancel(&self, run_id: &str) -> Result<(), ScheduleError> {
    let token = lock(&self.running)
      .get(run_id)
      .cloned()
      .ok_or_else(|| ScheduleError::RunNotFound(run_id.to_string()))?;
    info!(run_id = %run_id, "run_cancel_requested");
    token.cancel();
    Ok(())
  }

  /// Run ids currently in flight.
  pub fn in_flight(&self) -> Vec<String> {
    lock(&self.running).keys().cloned().collect()
  }

  /// Stop the loop in [`Scheduler::run`] and cancel every in-flight run.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }

  /// Seed last fire times from the most recent recorded run of each
  /// scheduled workflow. Workflows that never ran start from `now`.
  pub async fn recover(&self, now: DateTime<Utc>) -> Result<(), ScheduleError> {
    let recorder = self.executor.recorder();
    let mut recovered = HashMap::new();
    for workflow in self.workflows.list().await? {
      if !workflow.is_auto_scheduled() {
        continue;
      }
      let last = recorder
        .latest_run(&workflow.id)
        .await?
        .map(|run| run.started_at)
        .unwrap_or(now);
      recovered.insert(workflow.id, last);
    }
    info!(workflows = recovered.len(), "scheduler_recovered");
    lock(&self.last_fired).extend(recovered);
    Ok(())
  }

  /// Fire every scheduled workflow that is due at `now`.
  ///
  /// Fire times missed since the last fire collapse into a single run.
  #[instrument(name = "scheduler_tick", skip(self))]
  pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<RunHandle>, ScheduleError> {
    let mut started = Vec::new();
    for workflow in self.workflows.list().await? {
      if !workflow.is_auto_scheduled() {
        continue;
      }
      let Some(expression) = workflow.trigger_cron.as_deref() else {
        continue;
      };
      let schedule = match parse_cron(expression) {
        Ok(schedule) => schedule,
        Err(e) => {
          warn!(workflow_id = %workflow.id, error = %e, "cron_invalid");
          continue;
        }
      };

      let last = *lock(&self.last_fired)
        .entry(workflow.id.clone())
        .or_insert(now);
      let due = schedule.after(&last).next().is_some_and(|at| at <= now);
      if !due {
        continue;
      }
      lock(&self.last_fired).insert(workflow.id.clone(), now);

      match self.start(&workflow, TriggerReason::Auto).await {
        Ok(handle) => started.push(handle),
        Err(ScheduleError::Conflict { run_id, .. }) => {
          info!(workflow_id = %workflow.id, run_id = %run_id, "fire_skipped_in_flight");
        }
        Err(e) => error!(workflow_id = %workflow.id, error = %e, "fire_failed"),
      }
    }
    Ok(started)
  }

  /// Tick until [`Scheduler::shutdown`] is called.
  pub async fn run(&self) -> Result<(), ScheduleError> {
    self.recover(Utc::now()).await?;
    let mut interval = tokio::time::interval(self.executor.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = self.shutdown.cancelled() => break,
        _ = interval.tick() => {
          if let Err(e) = self.tick(Utc::now()).await {
            error!(error = %e, "scheduler_tick_failed");
          }
        }
      }
    }
    info!("scheduler_stopped");
    Ok(())
  }

  async fn workflow(&self, workflow_id: &str) -> Result<WorkflowDef, ScheduleError> {
    self.workflows.get(workflow_id).await.map_err(|e| match e {
      StoreError::NotFound(_) => ScheduleError::WorkflowNotFound(workflow_id.to_string()),
      other => ScheduleError::Store(other),
    })
  }

  /// Take the lease, record the run and spawn it.
  async fn start(
    &self,
    workflow: &WorkflowDef,
    reason: TriggerReason,
  ) -> Result<RunHandle, ScheduleError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let lease = self.leases.acquire(&workflow.id, &run_id)?;
    let prepared = self
      .executor
      .prepare_with_id(workflow, reason, run_id.clone())
      .await?;

    let token = self.shutdown.child_token();
    lock(&self.running).insert(run_id.clone(), token.clone());
    info!(workflow_id = %workflow.id, run_id = %run_id, reason = ?reason, "run_triggered");

    let executor = Arc::clone(&self.executor);
    let in_flight = InFlightGuard {
      running: Arc::clone(&self.running),
      run_id: run_id.clone(),
    };
    let join = tokio::spawn(async move {
      let _lease = lease;
      let in_flight = in_flight;
      let result = executor.execute(prepared, token).await;
      if let Err(e) = &result {
        error!(run_id = %in_flight.run_id, error = %e, "run_aborted");
      }
      result
    });

    Ok(RunHandle {
      run_id,
      workflow_id: workflow.id.clone(),
      join,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_panicked_run_leaves_in_flight_map() {
    let running: InFlight = Arc::default();
    lock(&running).insert("run-1".to_string(), CancellationToken::new());

    let guard = InFlightGuard {
      running: Arc::clone(&running),
      run_id: "run-1".to_string(),
    };
    let join = tokio::spawn(async move {
      let _in_flight = guard;
      panic!("provider blew up");
    });

    assert!(join.await.unwrap_err().is_panic());
    assert!(lock(&running).is_empty());
  }
}
