//! Engine facade: one per identity session.
//!
//! Owns the selected backend, the roster, the notification center, and at
//! most one open workspace session. The presentation layer talks to this
//! and to the [`SessionHandle`] it hands out, never to a store directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use tablero_data::defaults::avatar_color;
use tablero_data::{
    document_key, LocalVault, MemberRemoval, User, UserProfile, WorkspaceDocument, WorkspaceStore,
    WorkspaceSummary,
};

use crate::mode::{select_backend, StorageMode};
use crate::moves::reorder_summaries;
use crate::notify::{NotificationCenter, NotificationState};
use crate::roster::{
    personal_workspace, save_local_roster, save_personal_meta, spawn_roster, RosterState,
};
use crate::session::{spawn_session, SessionContext, SessionHandle};

/// Engine bootstrap parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cloud deployment URL; `None` selects local mode outright.
    pub convex_url: Option<String>,
    /// Root directory of the local vault.
    pub vault_root: PathBuf,
}

/// Metadata fields a workspace update may touch.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub theme: Option<String>,
}

pub struct Engine {
    profile: UserProfile,
    mode: StorageMode,
    store: Arc<dyn WorkspaceStore>,
    vault: LocalVault,
    roster_tx: Arc<watch::Sender<RosterState>>,
    roster_rx: watch::Receiver<RosterState>,
    notifications: NotificationCenter,
    session: Mutex<Option<SessionHandle>>,
    cancel: CancellationToken,
}

impl Engine {
    /// Select the storage mode for this identity and start the engine.
    pub async fn start(config: EngineConfig, profile: UserProfile) -> Result<Arc<Self>> {
        let vault = LocalVault::open(&config.vault_root)?;
        let backend = select_backend(config.convex_url.as_deref(), &vault, &profile).await;
        info!(mode = ?backend.mode, sub = %profile.sub, "storage mode selected");
        Ok(Self::with_backend(
            backend.mode,
            backend.store,
            vault,
            profile,
        ))
    }

    /// Wire the engine around an already-selected backend. Used directly
    /// by tests with the in-memory store.
    pub fn with_backend(
        mode: StorageMode,
        store: Arc<dyn WorkspaceStore>,
        vault: LocalVault,
        profile: UserProfile,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let notifications = NotificationCenter::spawn(cancel.clone());
        let (roster_tx, roster_rx) = spawn_roster(
            mode,
            Arc::clone(&store),
            vault.clone(),
            profile.clone(),
            cancel.clone(),
        );

        Arc::new(Self {
            profile,
            mode,
            store,
            vault,
            roster_tx,
            roster_rx,
            notifications,
            session: Mutex::new(None),
            cancel,
        })
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Collaborative workspace list (personal excluded), plus loading flag.
    pub fn roster(&self) -> watch::Receiver<RosterState> {
        self.roster_rx.clone()
    }

    /// The synthesized personal workspace; never part of the roster query.
    pub fn personal_workspace(&self) -> WorkspaceSummary {
        personal_workspace(&self.vault, &self.profile)
    }

    pub fn notifications(&self) -> watch::Receiver<NotificationState> {
        self.notifications.state()
    }

    pub fn notification_center(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Open a workspace, tearing down any previously open session first
    /// so a stale subscription can never overwrite the new workspace.
    pub async fn open_workspace(&self, workspace_id: &str) -> SessionHandle {
        let mut current = self.session.lock().await;
        if let Some(previous) = current.take() {
            previous.close();
        }

        let meta = self.workspace_meta(workspace_id);
        let handle = spawn_session(
            SessionContext {
                store: Arc::clone(&self.store),
                mode: self.mode,
                profile: self.profile.clone(),
                meta,
                events: self.notifications.events(),
            },
            workspace_id,
            self.cancel.child_token(),
        );
        *current = Some(handle.clone());
        handle
    }

    pub async fn close_workspace(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            handle.close();
        }
    }

    /// Handle to the currently open session, if any.
    pub async fn session(&self) -> Option<SessionHandle> {
        self.session.lock().await.clone()
    }

    fn workspace_meta(&self, workspace_id: &str) -> WorkspaceSummary {
        let personal = self.personal_workspace();
        if personal.id == workspace_id {
            return personal;
        }
        self.roster_rx
            .borrow()
            .workspaces
            .iter()
            .find(|ws| ws.id == workspace_id)
            .cloned()
            .unwrap_or(WorkspaceSummary {
                id: workspace_id.to_string(),
                name: "Workspace".to_string(),
                is_personal: false,
                members: vec![],
                icon: None,
                theme: None,
                order: 0,
            })
    }

    /// Create a collaborative workspace with the creator as sole member.
    pub async fn add_workspace(&self, name: &str) -> Result<WorkspaceSummary> {
        let workspace_id = format!("ws-collab-{}", Uuid::new_v4());
        let creator = User {
            id: self.profile.sub.clone(),
            name: self.profile.name.clone(),
            avatar_color: avatar_color(0),
            picture: self.profile.picture.clone(),
            email: Some(self.profile.email.clone()),
        };

        let order = self.roster_rx.borrow().workspaces.len() as u32;
        let document = WorkspaceDocument {
            users: vec![creator],
            name: name.to_string(),
            is_personal: false,
            icon: Some("🚀".to_string()),
            theme: Some("#4A90E2".to_string()),
            order,
            ..Default::default()
        };
        self.store.save(&workspace_id, &document).await?;

        let summary = document.summary(&workspace_id);
        let list = self.push_roster(summary.clone());
        if self.mode == StorageMode::Local {
            save_local_roster(&self.vault, &list);
        }
        info!(workspace = %workspace_id, "workspace created");
        Ok(summary)
    }

    /// Update workspace metadata. Personal customization persists to the
    /// per-identity vault key; collaborative updates ride the document
    /// save path of the open session.
    pub async fn update_workspace(&self, workspace_id: &str, update: WorkspaceUpdate) -> Result<()> {
        let personal = self.personal_workspace();
        if personal.id == workspace_id {
            let mut meta = personal;
            apply_update(&mut meta, &update);
            save_personal_meta(&self.vault, &self.profile, &meta);
            return Ok(());
        }

        let list = self.mutate_roster(|list| {
            if let Some(ws) = list.iter_mut().find(|ws| ws.id == workspace_id) {
                apply_update(ws, &update);
            }
        });
        if self.mode == StorageMode::Local {
            save_local_roster(&self.vault, &list);
        }

        if let Some(session) = self.session().await {
            if session.workspace_id() == workspace_id {
                session
                    .send(crate::session::SessionCommand::UpdateMeta {
                        name: update.name,
                        icon: update.icon,
                        theme: update.theme,
                    })
                    .await;
            }
        }
        Ok(())
    }

    /// Leave a workspace. Removing the last member hard-deletes the
    /// document; otherwise the member list minus this identity persists.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        if let Some(session) = self.session().await {
            if session.workspace_id() == workspace_id {
                self.close_workspace().await;
            }
        }

        let list = self.mutate_roster(|list| list.retain(|ws| ws.id != workspace_id));

        match self.mode {
            StorageMode::Cloud => {
                match self.store.remove_member(workspace_id, &self.profile.sub).await? {
                    MemberRemoval::WorkspaceDeleted => {
                        info!(workspace = %workspace_id, "workspace deleted (last member left)");
                    }
                    MemberRemoval::MemberRemoved => {
                        info!(workspace = %workspace_id, "left workspace");
                    }
                }
            }
            StorageMode::Local => {
                save_local_roster(&self.vault, &list);
                let key = document_key(&self.profile.sub, workspace_id);
                if let Err(e) = self.vault.remove(&key) {
                    warn!(workspace = %workspace_id, error = %e, "failed to drop workspace data");
                }
            }
        }
        Ok(())
    }

    /// Rearrange the collaborative list; order values become dense again.
    pub async fn reorder_workspaces(&self, ordered_ids: &[String]) -> Result<()> {
        let current = self.roster_rx.borrow().workspaces.clone();
        let mut ordered: Vec<WorkspaceSummary> = ordered_ids
            .iter()
            .filter_map(|id| current.iter().find(|ws| &ws.id == id).cloned())
            .collect();
        // Anything the caller forgot keeps its relative position at the end.
        for ws in &current {
            if !ordered_ids.contains(&ws.id) {
                ordered.push(ws.clone());
            }
        }

        let reordered = reorder_summaries(ordered);
        let _ = self.roster_tx.send(RosterState {
            workspaces: reordered.clone(),
            loaded: true,
        });

        match self.mode {
            StorageMode::Local => save_local_roster(&self.vault, &reordered),
            StorageMode::Cloud => {
                for ws in &reordered {
                    if let Err(e) = self.store.set_list_order(&ws.id, ws.order).await {
                        warn!(workspace = %ws.id, error = %e, "failed to persist list order");
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop every background task this engine spawned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn push_roster(&self, summary: WorkspaceSummary) -> Vec<WorkspaceSummary> {
        self.mutate_roster(|list| list.push(summary))
    }

    fn mutate_roster(
        &self,
        mutate: impl FnOnce(&mut Vec<WorkspaceSummary>),
    ) -> Vec<WorkspaceSummary> {
        let mut list = self.roster_rx.borrow().workspaces.clone();
        mutate(&mut list);
        let _ = self.roster_tx.send(RosterState {
            workspaces: list.clone(),
            loaded: true,
        });
        list
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn apply_update(meta: &mut WorkspaceSummary, update: &WorkspaceUpdate) {
    if let Some(ref name) = update.name {
        meta.name = name.clone();
    }
    if let Some(ref icon) = update.icon {
        meta.icon = Some(icon.clone());
    }
    if let Some(ref theme) = update.theme {
        meta.theme = Some(theme.clone());
    }
}
