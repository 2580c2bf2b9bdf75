use certloom_store::{
  IssuedCertificate, NodeEntry, NodeStatus, ProviderIdentifier, Recorder, RunArtifacts,
  RunOutcome, RunRecord, RunStatus, SqliteRecorder, StoreError, TriggerReason,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

async fn recorder() -> SqliteRecorder {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  let recorder = SqliteRecorder::new(pool);
  recorder.migrate().await.unwrap();
  recorder
}

#[tokio::test]
async fn test_run_lifecycle() {
  let recorder = recorder().await;
  let run = RunRecord::pending(
    "run-1",
    "wf-1",
    TriggerReason::Manual,
    json!({ "id": "start", "type": "start" }),
  );
  recorder.create_run(&run).await.unwrap();
  recorder.mark_running("run-1").await.unwrap();

  let first = recorder
    .append("run-1", NodeEntry::new("apply", NodeStatus::Running).attempt(1))
    .await
    .unwrap();
  let second = recorder
    .append(
      "run-1",
      NodeEntry::new("apply", NodeStatus::Succeeded)
        .attempt(1)
        .output(json!({ "certificate": { "certificate": "C", "privateKey": "K" } })),
    )
    .await
    .unwrap();
  assert_eq!(first.seq, 1);
  assert_eq!(second.seq, 2);

  let mut outcome = RunOutcome::new(RunStatus::Succeeded);
  outcome.artifacts = RunArtifacts {
    certificates: vec![IssuedCertificate {
      node_id: "apply".into(),
      domains: vec!["example.com".into()],
      certificate: "C".into(),
      private_key: "K".into(),
    }],
    identifiers: vec![ProviderIdentifier {
      node_id: "upload".into(),
      provider: "cdn".into(),
      id: "cert-42".into(),
    }],
  };
  recorder.finalize("run-1", outcome).await.unwrap();

  let stored = recorder.get_run("run-1").await.unwrap();
  assert_eq!(stored.status, RunStatus::Succeeded);
  assert!(stored.completed_at.is_some());
  assert_eq!(stored.artifacts.identifiers[0].id, "cert-42");
  assert_eq!(stored.graph.0["type"], "start");

  let timeline = recorder.timeline("run-1").await.unwrap();
  assert_eq!(timeline.len(), 2);
  assert_eq!(timeline[1].status, NodeStatus::Succeeded);
  assert_eq!(
    timeline[1].output.as_ref().unwrap().0["certificate"]["privateKey"],
    "K"
  );
}

#[tokio::test]
async fn test_finalize_is_rejected_twice() {
  let recorder = recorder().await;
  recorder
    .create_run(&RunRecord::pending("run-1", "wf-1", TriggerReason::Auto, json!({})))
    .await
    .unwrap();

  let mut failed = RunOutcome::new(RunStatus::Failed);
  failed.error = Some("apply failed".into());
  failed.error_node = Some("apply".into());
  recorder.finalize("run-1", failed).await.unwrap();

  let err = recorder
    .finalize("run-1", RunOutcome::new(RunStatus::Succeeded))
    .await
    .unwrap_err();
  assert!(matches!(err, StoreError::AlreadyFinalized(_)));

  let err = recorder
    .finalize("run-1", RunOutcome::new(RunStatus::Running))
    .await
    .unwrap_err();
  assert!(matches!(err, StoreError::NotTerminal(RunStatus::Running)));

  let err = recorder
    .finalize("missing", RunOutcome::new(RunStatus::Canceled))
    .await
    .unwrap_err();
  assert!(matches!(err, StoreError::NotFound(_)));

  let stored = recorder.get_run("run-1").await.unwrap();
  assert_eq!(stored.status, RunStatus::Failed);
  assert_eq!(stored.error_node.as_deref(), Some("apply"));
}

#[tokio::test]
async fn test_list_runs_newest_first() {
  let recorder = recorder().await;
  let mut older = RunRecord::pending("run-1", "wf-1", TriggerReason::Auto, json!({}));
  older.started_at = older.started_at - chrono::Duration::minutes(5);
  recorder.create_run(&older).await.unwrap();
  recorder
    .create_run(&RunRecord::pending("run-2", "wf-1", TriggerReason::Manual, json!({})))
    .await
    .unwrap();
  recorder
    .create_run(&RunRecord::pending("run-3", "wf-2", TriggerReason::Manual, json!({})))
    .await
    .unwrap();

  let ids: Vec<String> = recorder
    .list_runs("wf-1")
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.run_id)
    .collect();
  assert_eq!(ids, vec!["run-2", "run-1"]);

  let latest = recorder.latest_run("wf-1").await.unwrap().unwrap();
  assert_eq!(latest.run_id, "run-2");
  assert!(recorder.latest_run("wf-9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_append_to_unknown_run() {
  let recorder = recorder().await;
  let err = recorder
    .append("missing", NodeEntry::new("apply", NodeStatus::Running))
    .await
    .unwrap_err();
  assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_open_creates_database_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("runs.db");

  let recorder = SqliteRecorder::open(&path).await.unwrap();
  assert!(path.exists());
  assert!(recorder.list_runs("wf").await.unwrap().is_empty());
}
