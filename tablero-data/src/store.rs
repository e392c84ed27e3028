//! The pluggable backend store contract.
//!
//! Every backend (Convex cloud, local file vault, in-memory test store)
//! satisfies the same contract; the sync engine never talks to a vendor
//! SDK directly. I/O failures are folded into [`DocumentSnapshot::Error`]
//! at this boundary instead of being thrown into the engine, so that a
//! transient fetch error can never be mistaken for "document does not
//! exist" (which would destroy remote data on the next save).

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{WorkspaceDocument, WorkspaceSummary};

/// One delivery on a workspace document subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSnapshot {
    /// The current full document.
    Data(WorkspaceDocument),
    /// The backend explicitly reports no such document. This is the only
    /// signal that may trigger default initialization.
    NotFound,
    /// A transient failure (network, permissions, malformed payload).
    Error(String),
}

/// Outcome of a member removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRemoval {
    /// The departing member was the last one; the document was deleted.
    WorkspaceDeleted,
    /// The member list was persisted minus the departing member.
    MemberRemoved,
}

/// A cancelable stream of document snapshots. Dropping the subscription
/// tears down the underlying backend listener.
pub struct DocumentSubscription {
    rx: mpsc::Receiver<DocumentSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl DocumentSubscription {
    pub fn new(rx: mpsc::Receiver<DocumentSnapshot>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Next snapshot, or `None` once the backend stream ends.
    pub async fn next(&mut self) -> Option<DocumentSnapshot> {
        self.rx.recv().await
    }
}

impl Drop for DocumentSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Contract a workspace backend must fulfill.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Point subscription to one workspace document. Pushes a snapshot for
    /// the current state immediately and again on every change.
    async fn subscribe(&self, workspace_id: &str) -> Result<DocumentSubscription>;

    /// Whole-document upsert. Overwrites, never patches.
    async fn save(&self, workspace_id: &str, document: &WorkspaceDocument) -> Result<()>;

    /// Workspace summaries where the identity is a member, matched by id
    /// OR email. The email match lets an invited-by-email user claim a
    /// workspace before ever logging in.
    async fn list_for_member(
        &self,
        member_id: &str,
        member_email: Option<&str>,
    ) -> Result<Vec<WorkspaceSummary>>;

    /// Remove a member; deletes the document outright when the departing
    /// member was the last one. A workspace never lingers with zero
    /// members.
    async fn remove_member(&self, workspace_id: &str, member_id: &str) -> Result<MemberRemoval>;

    /// Persist a workspace's position in the roster list.
    async fn set_list_order(&self, workspace_id: &str, order: u32) -> Result<()>;

    /// Hard-delete a workspace document.
    async fn delete(&self, workspace_id: &str) -> Result<()>;
}

/// Storage key for a workspace document in the local vault. Personal
/// workspaces are namespaced per identity so two profiles on one machine
/// do not share a board.
pub fn document_key(profile_sub: &str, workspace_id: &str) -> String {
    if crate::types::is_personal_workspace(workspace_id) {
        format!("data_{}_{}", profile_sub, workspace_id)
    } else {
        format!("data_{}", workspace_id)
    }
}

/// Storage key for the collaborative roster list in the local vault.
pub const ROSTER_KEY: &str = "collaborative_workspaces";

/// Storage key for an identity's personal workspace customization.
pub fn personal_meta_key(profile_sub: &str) -> String {
    format!("personal_meta_{}", profile_sub)
}
