//! In-memory notification service: toasts plus a bounded history log,
//! fed by the sync engine's derived events.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events the sync engine derives for the notification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A task became assigned to the current identity by someone else.
    Assigned {
        workspace_id: String,
        task_id: String,
        title: String,
    },
    /// A debounced save failed; surfaced as a generic toast.
    SaveFailed { workspace_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: String,
    pub read: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    /// Currently visible toasts, oldest first.
    pub toasts: Vec<Notification>,
    /// Newest first, capped at [`HISTORY_LIMIT`].
    pub history: Vec<Notification>,
}

/// Toasts auto-dismiss after this long.
pub const TOAST_TTL: Duration = Duration::from_secs(5);
/// History keeps the most recent entries only.
pub const HISTORY_LIMIT: usize = 20;

enum CenterCommand {
    Dismiss(String),
    MarkAllRead,
}

#[derive(Clone)]
pub struct NotificationCenter {
    events: mpsc::Sender<EngineEvent>,
    commands: mpsc::Sender<CenterCommand>,
    state: watch::Receiver<NotificationState>,
}

impl NotificationCenter {
    /// Spawn the notification actor. It runs until `cancel` fires.
    pub fn spawn(cancel: CancellationToken) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(NotificationState::default());

        tokio::spawn(run(events_rx, commands_rx, state_tx, cancel));

        Self {
            events: events_tx,
            commands: commands_tx,
            state: state_rx,
        }
    }

    /// Sender half handed to workspace sessions.
    pub fn events(&self) -> mpsc::Sender<EngineEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> watch::Receiver<NotificationState> {
        self.state.clone()
    }

    pub async fn dismiss(&self, id: &str) {
        let _ = self.commands.send(CenterCommand::Dismiss(id.to_string())).await;
    }

    pub async fn mark_all_read(&self) {
        let _ = self.commands.send(CenterCommand::MarkAllRead).await;
    }
}

fn message_for(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Assigned { title, .. } => {
            format!("Te han asignado la tarea: \"{}\"", title)
        }
        EngineEvent::SaveFailed { .. } => {
            "No se pudieron guardar los cambios del espacio de trabajo".to_string()
        }
    }
}

async fn run(
    mut events: mpsc::Receiver<EngineEvent>,
    mut commands: mpsc::Receiver<CenterCommand>,
    state_tx: watch::Sender<NotificationState>,
    cancel: CancellationToken,
) {
    let mut state = NotificationState::default();
    // Dismissal deadlines, oldest first.
    let mut expirations: VecDeque<(Instant, String)> = VecDeque::new();

    loop {
        let next_expiry = expirations.front().map(|(at, _)| *at);

        tokio::select! {
            _ = cancel.cancelled() => break,

            event = events.recv() => {
                let Some(event) = event else { break };
                let notification = Notification {
                    id: format!("notif-{}", Uuid::new_v4()),
                    message: message_for(&event),
                    kind: NotificationKind::Info,
                    created_at: chrono::Utc::now().to_rfc3339(),
                    read: false,
                };
                expirations.push_back((Instant::now() + TOAST_TTL, notification.id.clone()));
                state.toasts.push(notification.clone());
                state.history.insert(0, notification);
                state.history.truncate(HISTORY_LIMIT);
                let _ = state_tx.send(state.clone());
            }

            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    CenterCommand::Dismiss(id) => {
                        state.toasts.retain(|n| n.id != id);
                    }
                    CenterCommand::MarkAllRead => {
                        for n in &mut state.history {
                            n.read = true;
                        }
                    }
                }
                let _ = state_tx.send(state.clone());
            }

            _ = sleep_until_opt(next_expiry), if next_expiry.is_some() => {
                if let Some((_, id)) = expirations.pop_front() {
                    state.toasts.retain(|n| n.id != id);
                    let _ = state_tx.send(state.clone());
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}
