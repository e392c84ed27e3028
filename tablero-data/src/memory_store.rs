//! In-memory backend used by engine tests and offline experiments.
//!
//! Behaves like the cloud store including the echo: every save is
//! broadcast back to subscribers, so echo-suppression paths get exercised
//! without a deployment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::store::{DocumentSnapshot, DocumentSubscription, MemberRemoval, WorkspaceStore};
use crate::types::{WorkspaceDocument, WorkspaceSummary};

#[derive(Clone)]
pub struct MemoryWorkspaceStore {
    inner: Arc<Mutex<HashMap<String, WorkspaceDocument>>>,
    changes: broadcast::Sender<String>,
    save_count: Arc<AtomicUsize>,
}

impl Default for MemoryWorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkspaceStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            changes,
            save_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed a document without counting as a save, then notify subscribers
    /// as a remote change would.
    pub fn insert(&self, workspace_id: &str, document: WorkspaceDocument) {
        self.inner
            .lock()
            .unwrap()
            .insert(workspace_id.to_string(), document);
        let _ = self.changes.send(workspace_id.to_string());
    }

    /// Current stored document, if any.
    pub fn document(&self, workspace_id: &str) -> Option<WorkspaceDocument> {
        self.inner.lock().unwrap().get(workspace_id).cloned()
    }

    pub fn exists(&self, workspace_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(workspace_id)
    }

    /// Number of `save` calls observed (seeding via `insert` not counted).
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    fn snapshot(&self, workspace_id: &str) -> DocumentSnapshot {
        match self.inner.lock().unwrap().get(workspace_id) {
            Some(doc) => DocumentSnapshot::Data(doc.clone()),
            None => DocumentSnapshot::NotFound,
        }
    }
}

#[async_trait]
impl WorkspaceStore for MemoryWorkspaceStore {
    async fn subscribe(&self, workspace_id: &str) -> Result<DocumentSubscription> {
        let id = workspace_id.to_string();
        let store = self.clone();
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            if tx.send(store.snapshot(&id)).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == id => {
                        if tx.send(store.snapshot(&id)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(DocumentSubscription::new(rx, task))
    }

    async fn save(&self, workspace_id: &str, document: &WorkspaceDocument) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(workspace_id.to_string(), document.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        // The backend echoes the write back to every subscriber, the
        // writer included.
        let _ = self.changes.send(workspace_id.to_string());
        Ok(())
    }

    async fn list_for_member(
        &self,
        member_id: &str,
        member_email: Option<&str>,
    ) -> Result<Vec<WorkspaceSummary>> {
        let inner = self.inner.lock().unwrap();
        let mut summaries = Vec::new();
        for (id, doc) in inner.iter() {
            let matched = doc.users.iter().any(|u| {
                u.id == member_id || (member_email.is_some() && u.email.as_deref() == member_email)
            });
            if matched {
                summaries.push(doc.summary(id));
            }
        }
        Ok(summaries)
    }

    async fn remove_member(&self, workspace_id: &str, member_id: &str) -> Result<MemberRemoval> {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            match inner.get_mut(workspace_id) {
                Some(doc) => {
                    doc.users.retain(|u| u.id != member_id);
                    if doc.users.is_empty() {
                        inner.remove(workspace_id);
                        MemberRemoval::WorkspaceDeleted
                    } else {
                        MemberRemoval::MemberRemoved
                    }
                }
                None => MemberRemoval::WorkspaceDeleted,
            }
        };
        let _ = self.changes.send(workspace_id.to_string());
        Ok(outcome)
    }

    async fn set_list_order(&self, workspace_id: &str, order: u32) -> Result<()> {
        if let Some(doc) = self.inner.lock().unwrap().get_mut(workspace_id) {
            doc.order = order;
        }
        Ok(())
    }

    async fn delete(&self, workspace_id: &str) -> Result<()> {
        self.inner.lock().unwrap().remove(workspace_id);
        let _ = self.changes.send(workspace_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::User;

    fn doc_with_member(id: &str) -> WorkspaceDocument {
        WorkspaceDocument {
            users: vec![User {
                id: id.to_string(),
                name: id.to_string(),
                avatar_color: String::new(),
                picture: None,
                email: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_subscribe_sees_initial_then_echo() {
        let store = MemoryWorkspaceStore::new();
        let mut sub = store.subscribe("ws-1").await.unwrap();
        assert_eq!(sub.next().await, Some(DocumentSnapshot::NotFound));

        store.save("ws-1", &doc_with_member("user-1")).await.unwrap();
        match sub.next().await {
            Some(DocumentSnapshot::Data(doc)) => assert_eq!(doc.users[0].id, "user-1"),
            other => panic!("expected echo, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_last_member_deletes() {
        let store = MemoryWorkspaceStore::new();
        store.insert("ws-1", doc_with_member("user-1"));

        let outcome = store.remove_member("ws-1", "user-1").await.unwrap();
        assert_eq!(outcome, MemberRemoval::WorkspaceDeleted);
        assert!(!store.exists("ws-1"));
    }

    #[tokio::test]
    async fn test_save_count_ignores_seeding() {
        let store = MemoryWorkspaceStore::new();
        store.insert("ws-1", doc_with_member("user-1"));
        assert_eq!(store.save_count(), 0);

        store.save("ws-1", &doc_with_member("user-2")).await.unwrap();
        assert_eq!(store.save_count(), 1);
    }
}
