//! The per-workspace synchronization session.
//!
//! One actor per open workspace owns the in-memory document and is its
//! single writer. The presentation layer observes state through a watch
//! channel and requests mutations through commands; the backend pushes
//! snapshots through the store subscription. All per-workspace tracking
//! state (previous tasks, initial-load flag, echo window) lives inside
//! the actor, so switching workspaces tears everything down with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tablero_data::defaults::{avatar_color, sample_projects, sample_tasks, sample_users};
use tablero_data::{
    is_personal_workspace, DocumentSnapshot, DocumentSubscription, Message, Project, Task,
    TaskStatus, User, UserProfile, WorkspaceDocument, WorkspaceStore, WorkspaceSummary,
};

use crate::mode::StorageMode;
use crate::moves::move_task;
use crate::notify::EngineEvent;
use crate::reconcile::{
    derive_assignment_events, ensure_member, reconcile_identity, repair_member_names,
};

/// Debounce window: rapid successive edits coalesce into one write.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);
/// Grace after a write completes during which incoming snapshots (the
/// backend's echo of that write included) are still suppressed.
pub const SAVE_GRACE: Duration = Duration::from_millis(500);
/// Bound on the initial document load.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(7);
/// Delay before writing a reconciled document back to the backend.
pub const RECONCILE_WRITEBACK_DELAY: Duration = Duration::from_secs(1);

/// Engine state visible to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub document: WorkspaceDocument,
    pub loaded: bool,
    pub syncing: bool,
}

/// Mutations the presentation layer may request. The engine applies them
/// optimistically and persists through the debounced save path.
#[derive(Debug)]
pub enum SessionCommand {
    SetTasks(Vec<Task>),
    SetProjects(Vec<Project>),
    SetUsers(Vec<User>),
    SetMessages(Vec<Message>),
    MoveTask {
        task_id: String,
        status: TaskStatus,
        index: usize,
    },
    AddUser {
        name: String,
        email: Option<String>,
    },
    PostMessage {
        text: String,
        task_id: Option<String>,
    },
    UpdateMeta {
        name: Option<String>,
        icon: Option<String>,
        theme: Option<String>,
    },
}

/// Cheap cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    workspace_id: String,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub async fn send(&self, command: SessionCommand) {
        if self.commands.send(command).await.is_err() {
            warn!(workspace = %self.workspace_id, "session is gone, command dropped");
        }
    }

    pub async fn move_task(&self, task_id: &str, status: TaskStatus, index: usize) {
        self.send(SessionCommand::MoveTask {
            task_id: task_id.to_string(),
            status,
            index,
        })
        .await;
    }

    /// Tear the session down (unsubscribes from the backend).
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Everything a session needs from its surroundings.
pub struct SessionContext {
    pub store: Arc<dyn WorkspaceStore>,
    pub mode: StorageMode,
    pub profile: UserProfile,
    /// Roster metadata for this workspace; seeds name/icon/theme/members
    /// when the document does not exist yet.
    pub meta: WorkspaceSummary,
    pub events: mpsc::Sender<EngineEvent>,
}

/// Spawn a session for the given workspace.
pub fn spawn_session(
    ctx: SessionContext,
    workspace_id: &str,
    cancel: CancellationToken,
) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = watch::channel(SessionState {
        document: WorkspaceDocument::default(),
        loaded: false,
        syncing: ctx.mode == StorageMode::Cloud,
    });

    let session = WorkspaceSession {
        ctx,
        workspace_id: workspace_id.to_string(),
        state: SessionState {
            document: WorkspaceDocument::default(),
            loaded: false,
            syncing: false,
        },
        state_tx,
        previous_tasks: Vec::new(),
        initial_snapshot: true,
        dirty: false,
        save_at: None,
        suppress_until: None,
        writeback_at: None,
        load_timed_out: false,
    };

    let handle = SessionHandle {
        workspace_id: workspace_id.to_string(),
        commands: commands_tx,
        state: state_rx,
        cancel: cancel.clone(),
    };

    tokio::spawn(session.run(commands_rx, cancel));
    handle
}

struct WorkspaceSession {
    ctx: SessionContext,
    workspace_id: String,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    /// Baseline for assignment detection. Refreshed on every local
    /// mutation as well, so the echo of our own save never reads as a
    /// foreign reassignment.
    previous_tasks: Vec<Task>,
    initial_snapshot: bool,
    dirty: bool,
    save_at: Option<Instant>,
    suppress_until: Option<Instant>,
    writeback_at: Option<Instant>,
    load_timed_out: bool,
}

impl WorkspaceSession {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        self.state.syncing = self.ctx.mode == StorageMode::Cloud;
        let load_deadline = Instant::now() + LOAD_TIMEOUT;

        let mut subscription = match self.ctx.store.subscribe(&self.workspace_id).await {
            Ok(sub) => {
                debug!(workspace = %self.workspace_id, "subscribed");
                Some(sub)
            }
            Err(e) => {
                error!(workspace = %self.workspace_id, error = %e, "subscription failed");
                None
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Do not lose edits still sitting in the debounce
                    // window on teardown.
                    if self.dirty {
                        self.flush_save().await;
                    }
                    debug!(workspace = %self.workspace_id, "session closed");
                    break;
                }

                command = commands.recv() => {
                    match command {
                        Some(command) => self.apply_command(command),
                        None => {
                            if self.dirty {
                                self.flush_save().await;
                            }
                            break;
                        }
                    }
                }

                snapshot = next_snapshot(&mut subscription) => {
                    match snapshot {
                        Some(snapshot) => self.handle_snapshot(snapshot),
                        None => {
                            warn!(workspace = %self.workspace_id, "subscription ended");
                            subscription = None;
                        }
                    }
                }

                _ = sleep_until_opt(self.save_at), if self.save_at.is_some() => {
                    self.flush_save().await;
                }

                _ = sleep_until_opt(self.writeback_at), if self.writeback_at.is_some() => {
                    self.flush_reconcile_writeback().await;
                }

                _ = tokio::time::sleep_until(load_deadline),
                    if !self.state.loaded && !self.load_timed_out => {
                    self.handle_load_timeout();
                }
            }
        }
    }

    fn publish(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }

    fn suppressed(&self) -> bool {
        if self.dirty {
            return true;
        }
        match self.suppress_until {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Schedule the debounced save and open the echo window.
    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.save_at = Some(Instant::now() + SAVE_DEBOUNCE);
        self.suppress_until = Some(Instant::now() + SAVE_DEBOUNCE + SAVE_GRACE);
    }

    fn apply_command(&mut self, command: SessionCommand) {
        if !self.state.loaded {
            warn!(workspace = %self.workspace_id, "mutation before load, ignored");
            return;
        }

        let doc = &mut self.state.document;
        match command {
            SessionCommand::SetTasks(tasks) => doc.tasks = tasks,
            SessionCommand::SetProjects(projects) => doc.projects = projects,
            SessionCommand::SetUsers(users) => doc.users = users,
            SessionCommand::SetMessages(messages) => doc.messages = messages,
            SessionCommand::MoveTask {
                task_id,
                status,
                index,
            } => {
                doc.tasks = move_task(&doc.tasks, &task_id, status, index);
            }
            SessionCommand::AddUser { name, email } => {
                let index = doc.users.len();
                doc.users.push(User {
                    id: format!("user-{}", Uuid::new_v4()),
                    name,
                    avatar_color: avatar_color(index),
                    picture: None,
                    email,
                });
            }
            SessionCommand::PostMessage { text, task_id } => {
                doc.messages.push(Message {
                    id: format!("msg-{}", Uuid::new_v4()),
                    text,
                    user_id: self.ctx.profile.sub.clone(),
                    created_at: Utc::now().to_rfc3339(),
                    task_id,
                });
            }
            SessionCommand::UpdateMeta { name, icon, theme } => {
                if let Some(name) = name {
                    doc.name = name;
                }
                if let Some(icon) = icon {
                    doc.icon = Some(icon);
                }
                if let Some(theme) = theme {
                    doc.theme = Some(theme);
                }
            }
        }

        // Local writes update the assignment baseline immediately, not
        // only when the backend echoes them back.
        self.previous_tasks = self.state.document.tasks.clone();
        self.mark_dirty();
        self.publish();
    }

    fn handle_snapshot(&mut self, snapshot: DocumentSnapshot) {
        match snapshot {
            DocumentSnapshot::Data(doc) => {
                if self.suppressed() {
                    debug!(workspace = %self.workspace_id, "snapshot suppressed during local-save window");
                    return;
                }
                self.apply_remote(doc);
            }
            DocumentSnapshot::NotFound => {
                if self.state.loaded {
                    warn!(workspace = %self.workspace_id, "document disappeared, keeping in-memory state");
                    return;
                }
                debug!(workspace = %self.workspace_id, "document does not exist, initializing defaults");
                self.initialize_defaults();
            }
            DocumentSnapshot::Error(msg) => match self.ctx.mode {
                // Nothing remote can be destroyed in local mode; a broken
                // payload falls back to defaults for this workspace only.
                StorageMode::Local => {
                    warn!(workspace = %self.workspace_id, error = %msg, "local payload unreadable");
                    if !self.state.loaded {
                        self.initialize_defaults();
                    }
                }
                // A transient cloud failure must not be treated as
                // not-found: fabricated defaults would be saved over real
                // remote data. Hold the loading state instead.
                StorageMode::Cloud => {
                    error!(workspace = %self.workspace_id, error = %msg, "workspace fetch failed, holding state");
                }
            },
        }
    }

    fn apply_remote(&mut self, mut doc: WorkspaceDocument) {
        repair_member_names(&mut doc);

        for event in derive_assignment_events(
            &self.previous_tasks,
            &doc.tasks,
            &self.ctx.profile.sub,
            self.initial_snapshot,
        ) {
            let _ = self.ctx.events.try_send(EngineEvent::Assigned {
                workspace_id: self.workspace_id.clone(),
                task_id: event.task_id,
                title: event.title,
            });
        }
        self.initial_snapshot = false;

        if let Some(old_id) = reconcile_identity(&mut doc, &self.ctx.profile) {
            info!(
                workspace = %self.workspace_id,
                old_id = %old_id,
                "migrating invited member to authenticated identity"
            );
            self.writeback_at = Some(Instant::now() + RECONCILE_WRITEBACK_DELAY);
        }

        ensure_member(&mut doc, &self.ctx.profile);

        // Baseline the post-reconciliation tasks: the delayed write-back
        // echoes this exact array, and it must not read as foreign
        // reassignments.
        self.previous_tasks = doc.tasks.clone();

        if self.ctx.mode == StorageMode::Local {
            // Local snapshots refresh our own profile fields; other
            // members' data is whatever the document says.
            let profile = &self.ctx.profile;
            if let Some(me) = doc.users.iter_mut().find(|u| u.id == profile.sub) {
                me.name = profile.name.clone();
                me.picture = profile.picture.clone();
                me.email = Some(profile.email.clone());
            }
        }

        self.state.document = doc;
        self.state.loaded = true;
        self.state.syncing = false;
        self.publish();
    }

    /// Brand-new workspace: seed defaults and persist them through the
    /// normal save path (this is how lazy document creation happens).
    fn initialize_defaults(&mut self) {
        let profile = &self.ctx.profile;
        let me = User {
            id: profile.sub.clone(),
            name: profile.name.clone(),
            avatar_color: avatar_color(sample_users().len()),
            picture: profile.picture.clone(),
            email: Some(profile.email.clone()),
        };

        let meta = &self.ctx.meta;
        let mut doc = WorkspaceDocument {
            name: meta.name.clone(),
            is_personal: meta.is_personal,
            icon: meta.icon.clone(),
            theme: meta.theme.clone(),
            order: meta.order,
            ..Default::default()
        };

        if is_personal_workspace(&self.workspace_id) {
            doc.tasks = sample_tasks()
                .into_iter()
                .enumerate()
                .map(|(i, mut t)| {
                    t.order = i as u32;
                    t
                })
                .collect();
            doc.projects = sample_projects();
            let mut users = vec![me];
            users.extend(sample_users());
            doc.users = users;
        } else if !meta.members.is_empty() {
            doc.users = meta.members.clone();
        } else {
            doc.users = vec![me];
        }

        self.previous_tasks = doc.tasks.clone();
        self.state.document = doc;
        self.state.loaded = true;
        self.state.syncing = false;
        self.mark_dirty();
        self.publish();
    }

    fn handle_load_timeout(&mut self) {
        self.load_timed_out = true;
        match self.ctx.mode {
            StorageMode::Local => {
                warn!(workspace = %self.workspace_id, "local load timed out, force initializing");
                self.initialize_defaults();
            }
            StorageMode::Cloud => {
                // Guessing here could overwrite remote data with defaults.
                warn!(workspace = %self.workspace_id, "cloud load timed out, staying in loading state");
            }
        }
    }

    async fn flush_save(&mut self) {
        self.dirty = false;
        self.save_at = None;
        self.state.syncing = true;
        self.publish();

        let result = self
            .ctx
            .store
            .save(&self.workspace_id, &self.state.document)
            .await;

        match result {
            Ok(()) => debug!(workspace = %self.workspace_id, "saved"),
            Err(e) => {
                error!(workspace = %self.workspace_id, error = %e, "save failed");
                let _ = self.ctx.events.try_send(EngineEvent::SaveFailed {
                    workspace_id: self.workspace_id.clone(),
                });
            }
        }

        // Keep the echo window open a little past the write so the
        // backend's reflection of it is skipped, not re-applied.
        self.suppress_until = Some(Instant::now() + SAVE_GRACE);
        self.state.syncing = false;
        self.publish();
    }

    /// Persist a reconciled document shortly after reconciliation,
    /// without blocking the snapshot that triggered it.
    async fn flush_reconcile_writeback(&mut self) {
        self.writeback_at = None;
        let result = self
            .ctx
            .store
            .save(&self.workspace_id, &self.state.document)
            .await;
        match result {
            Ok(()) => info!(workspace = %self.workspace_id, "persisted reconciled identities"),
            Err(e) => warn!(workspace = %self.workspace_id, error = %e, "reconciliation write-back failed"),
        }
        self.suppress_until = Some(Instant::now() + SAVE_GRACE);
    }
}

async fn next_snapshot(
    subscription: &mut Option<DocumentSubscription>,
) -> Option<DocumentSnapshot> {
    match subscription {
        Some(sub) => sub.next().await,
        None => futures::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}
