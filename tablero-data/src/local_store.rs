//! Local-mode backend: the [`LocalVault`] dressed up as a
//! [`WorkspaceStore`].
//!
//! Documents live under per-workspace vault keys; changes made by sibling
//! processes surface through the vault watcher so every open instance
//! converges, mirroring cross-tab storage events.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::store::{
    document_key, DocumentSnapshot, DocumentSubscription, MemberRemoval, WorkspaceStore,
    ROSTER_KEY,
};
use crate::types::{WorkspaceDocument, WorkspaceSummary};
use crate::vault::LocalVault;
use crate::watcher::VaultWatcher;

pub struct LocalWorkspaceStore {
    vault: LocalVault,
    /// Subject claim of the session identity; personal document keys are
    /// namespaced by it.
    profile_sub: String,
}

impl LocalWorkspaceStore {
    pub fn new(vault: LocalVault, profile_sub: &str) -> Self {
        Self {
            vault,
            profile_sub: profile_sub.to_string(),
        }
    }

    fn read_snapshot(vault: &LocalVault, key: &str) -> DocumentSnapshot {
        match vault.get_json::<WorkspaceDocument>(key) {
            Ok(Some(doc)) => DocumentSnapshot::Data(doc),
            Ok(None) => DocumentSnapshot::NotFound,
            Err(e) => DocumentSnapshot::Error(e.to_string()),
        }
    }

    fn read_roster(&self) -> Vec<WorkspaceSummary> {
        match self.vault.get_json::<Vec<WorkspaceSummary>>(ROSTER_KEY) {
            Ok(Some(list)) => list,
            Ok(None) => vec![],
            Err(e) => {
                warn!(error = %e, "failed to parse stored roster");
                vec![]
            }
        }
    }
}

#[async_trait]
impl WorkspaceStore for LocalWorkspaceStore {
    async fn subscribe(&self, workspace_id: &str) -> Result<DocumentSubscription> {
        let key = document_key(&self.profile_sub, workspace_id);
        let vault = self.vault.clone();
        let (tx, rx) = mpsc::channel(16);

        // Current state first, then re-reads on every file change for the
        // same key.
        let initial = Self::read_snapshot(&vault, &key);
        let mut watcher = VaultWatcher::new(vault.root())?;

        let task = tokio::spawn(async move {
            if tx.send(initial).await.is_err() {
                return;
            }
            while let Some(event) = watcher.rx.recv().await {
                if event.key != key {
                    continue;
                }
                if tx.send(Self::read_snapshot(&vault, &key)).await.is_err() {
                    break;
                }
            }
        });

        Ok(DocumentSubscription::new(rx, task))
    }

    async fn save(&self, workspace_id: &str, document: &WorkspaceDocument) -> Result<()> {
        let key = document_key(&self.profile_sub, workspace_id);
        self.vault.set_json(&key, document)
    }

    async fn list_for_member(
        &self,
        member_id: &str,
        member_email: Option<&str>,
    ) -> Result<Vec<WorkspaceSummary>> {
        let list = self.read_roster();
        Ok(list
            .into_iter()
            .filter(|ws| {
                ws.members.iter().any(|m| {
                    m.id == member_id
                        || (member_email.is_some() && m.email.as_deref() == member_email)
                })
            })
            .collect())
    }

    async fn remove_member(&self, workspace_id: &str, member_id: &str) -> Result<MemberRemoval> {
        let key = document_key(&self.profile_sub, workspace_id);
        let mut doc = match self.vault.get_json::<WorkspaceDocument>(&key)? {
            Some(doc) => doc,
            // Nothing stored: nothing left to remove the member from.
            None => return Ok(MemberRemoval::WorkspaceDeleted),
        };

        doc.users.retain(|u| u.id != member_id);
        if doc.users.is_empty() {
            self.vault.remove(&key)?;
            Ok(MemberRemoval::WorkspaceDeleted)
        } else {
            self.vault.set_json(&key, &doc)?;
            Ok(MemberRemoval::MemberRemoved)
        }
    }

    async fn set_list_order(&self, workspace_id: &str, order: u32) -> Result<()> {
        let mut list = self.read_roster();
        if let Some(entry) = list.iter_mut().find(|ws| ws.id == workspace_id) {
            entry.order = order;
            self.vault.set_json(ROSTER_KEY, &list)?;
        }
        Ok(())
    }

    async fn delete(&self, workspace_id: &str) -> Result<()> {
        let key = document_key(&self.profile_sub, workspace_id);
        self.vault.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::User;
    use tempfile::TempDir;

    fn member(id: &str, email: Option<&str>) -> User {
        User {
            id: id.to_string(),
            name: id.to_string(),
            avatar_color: "#E24A4A".to_string(),
            picture: None,
            email: email.map(|e| e.to_string()),
        }
    }

    fn store(dir: &TempDir) -> LocalWorkspaceStore {
        let vault = LocalVault::open(dir.path()).unwrap();
        LocalWorkspaceStore::new(vault, "sub-1")
    }

    #[tokio::test]
    async fn test_subscribe_missing_document_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut sub = store.subscribe("ws-collab-1").await.unwrap();
        assert_eq!(sub.next().await, Some(DocumentSnapshot::NotFound));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_saved_document() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let doc = WorkspaceDocument {
            name: "Equipo".to_string(),
            users: vec![member("user-1", None)],
            ..Default::default()
        };
        store.save("ws-collab-1", &doc).await.unwrap();

        let mut sub = store.subscribe("ws-collab-1").await.unwrap();
        assert_eq!(sub.next().await, Some(DocumentSnapshot::Data(doc)));
    }

    #[tokio::test]
    async fn test_subscribe_malformed_payload_is_error_not_not_found() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();
        vault.set("data_ws-collab-1", "{broken").unwrap();

        let store = LocalWorkspaceStore::new(vault, "sub-1");
        let mut sub = store.subscribe("ws-collab-1").await.unwrap();
        match sub.next().await {
            Some(DocumentSnapshot::Error(_)) => {}
            other => panic!("expected error snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_last_member_deletes_document() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let doc = WorkspaceDocument {
            users: vec![member("user-1", None)],
            ..Default::default()
        };
        store.save("ws-collab-1", &doc).await.unwrap();

        let outcome = store.remove_member("ws-collab-1", "user-1").await.unwrap();
        assert_eq!(outcome, MemberRemoval::WorkspaceDeleted);

        let mut sub = store.subscribe("ws-collab-1").await.unwrap();
        assert_eq!(sub.next().await, Some(DocumentSnapshot::NotFound));
    }

    #[tokio::test]
    async fn test_remove_non_last_member_keeps_remaining() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let doc = WorkspaceDocument {
            users: vec![member("user-1", None), member("user-2", None)],
            ..Default::default()
        };
        store.save("ws-collab-1", &doc).await.unwrap();

        let outcome = store.remove_member("ws-collab-1", "user-1").await.unwrap();
        assert_eq!(outcome, MemberRemoval::MemberRemoved);

        let mut sub = store.subscribe("ws-collab-1").await.unwrap();
        match sub.next().await {
            Some(DocumentSnapshot::Data(doc)) => {
                assert_eq!(doc.users.len(), 1);
                assert_eq!(doc.users[0].id, "user-2");
            }
            other => panic!("expected data snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_for_member_matches_by_id_or_email() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();
        let roster = vec![
            WorkspaceSummary {
                id: "ws-a".to_string(),
                name: "A".to_string(),
                is_personal: false,
                members: vec![member("real-42", None)],
                icon: None,
                theme: None,
                order: 0,
            },
            WorkspaceSummary {
                id: "ws-b".to_string(),
                name: "B".to_string(),
                is_personal: false,
                members: vec![member("prov-1", Some("a@x.com"))],
                icon: None,
                theme: None,
                order: 1,
            },
            WorkspaceSummary {
                id: "ws-c".to_string(),
                name: "C".to_string(),
                is_personal: false,
                members: vec![member("someone-else", None)],
                icon: None,
                theme: None,
                order: 2,
            },
        ];
        vault.set_json(ROSTER_KEY, &roster).unwrap();

        let store = LocalWorkspaceStore::new(vault, "real-42");
        let list = store
            .list_for_member("real-42", Some("a@x.com"))
            .await
            .unwrap();
        let ids: Vec<_> = list.iter().map(|ws| ws.id.as_str()).collect();
        assert_eq!(ids, vec!["ws-a", "ws-b"]);
    }
}
