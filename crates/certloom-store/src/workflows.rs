use std::collections::BTreeMap;

use async_trait::async_trait;
use certloom_config::WorkflowDef;
use tokio::sync::RwLock;

use crate::{StoreError, WorkflowStore};

/// In-memory workflow repository.
#[derive(Default)]
pub struct MemoryWorkflowStore {
  workflows: RwLock<BTreeMap<String, WorkflowDef>>,
}

impl MemoryWorkflowStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl FromIterator<WorkflowDef> for MemoryWorkflowStore {
  fn from_iter<I: IntoIterator<Item = WorkflowDef>>(iter: I) -> Self {
    Self {
      workflows: RwLock::new(iter.into_iter().map(|w| (w.id.clone(), w)).collect()),
    }
  }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
  async fn get(&self, workflow_id: &str) -> Result<WorkflowDef, StoreError> {
    self
      .workflows
      .read()
      .await
      .get(workflow_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))
  }

  async fn list(&self) -> Result<Vec<WorkflowDef>, StoreError> {
    Ok(self.workflows.read().await.values().cloned().collect())
  }

  async fn save(&self, workflow: &WorkflowDef) -> Result<(), StoreError> {
    self
      .workflows
      .write()
      .await
      .insert(workflow.id.clone(), workflow.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_save_replaces_record() {
    let store: MemoryWorkflowStore = [WorkflowDef::new("b", "B"), WorkflowDef::new("a", "A")]
      .into_iter()
      .collect();

    let mut a = store.get("a").await.unwrap();
    a.enabled = false;
    store.save(&a).await.unwrap();

    let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|w| w.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(!store.get("a").await.unwrap().enabled);
    assert!(matches!(store.get("c").await, Err(StoreError::NotFound(_))));
  }
}
