//! The workspace roster: collaborative workspaces the identity belongs
//! to, plus the synthesized personal workspace.
//!
//! Cloud mode polls the member-list query; local mode reads the stored
//! list and seeds the built-in samples on first run. A failed list query
//! degrades to an empty roster instead of erroring the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tablero_data::defaults::sample_collaborative_workspaces;
use tablero_data::{
    personal_meta_key, personal_workspace_id, LocalVault, UserProfile, WorkspaceStore,
    WorkspaceSummary, ROSTER_KEY,
};

use crate::mode::StorageMode;

/// Cadence of the cloud member-list poll.
pub const LIST_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct RosterState {
    pub workspaces: Vec<WorkspaceSummary>,
    pub loaded: bool,
}

/// Drop personal entries, de-duplicate by workspace id (the by-id and
/// by-email matches can return the same document twice), and sort by the
/// manual order field.
pub fn clean_roster(list: Vec<WorkspaceSummary>) -> Vec<WorkspaceSummary> {
    let mut seen = std::collections::HashSet::new();
    let mut cleaned: Vec<WorkspaceSummary> = list
        .into_iter()
        .filter(|ws| !ws.is_personal)
        .filter(|ws| seen.insert(ws.id.clone()))
        .collect();
    cleaned.sort_by_key(|ws| ws.order);
    cleaned
}

/// Synthesize the personal workspace for an identity, merging any locally
/// persisted customization. Never sourced from the member-list query.
pub fn personal_workspace(vault: &LocalVault, profile: &UserProfile) -> WorkspaceSummary {
    let key = personal_meta_key(&profile.sub);
    match vault.get_json::<WorkspaceSummary>(&key) {
        Ok(Some(stored)) => stored,
        Ok(None) => default_personal_workspace(profile),
        Err(e) => {
            warn!(error = %e, "failed to parse stored personal workspace metadata");
            default_personal_workspace(profile)
        }
    }
}

fn default_personal_workspace(profile: &UserProfile) -> WorkspaceSummary {
    WorkspaceSummary {
        id: personal_workspace_id(&profile.sub),
        name: "Mi Espacio de Trabajo".to_string(),
        is_personal: true,
        members: vec![],
        icon: Some("🏠".to_string()),
        theme: Some("#254467".to_string()),
        order: 0,
    }
}

/// Persist personal workspace customization for this identity. Kept in
/// the local vault in both storage modes; the personal workspace is never
/// a member-list query target.
pub fn save_personal_meta(vault: &LocalVault, profile: &UserProfile, meta: &WorkspaceSummary) {
    let key = personal_meta_key(&profile.sub);
    if let Err(e) = vault.set_json(&key, meta) {
        warn!(error = %e, "failed to persist personal workspace metadata");
    }
}

/// Load the local-mode roster, seeding the samples on first run. A
/// malformed stored list falls back to the seeds rather than erroring.
pub fn load_local_roster(vault: &LocalVault) -> Vec<WorkspaceSummary> {
    match vault.get_json::<Vec<WorkspaceSummary>>(ROSTER_KEY) {
        Ok(Some(list)) => clean_roster(list),
        Ok(None) => {
            let seeds = sample_collaborative_workspaces();
            save_local_roster(vault, &seeds);
            seeds
        }
        Err(e) => {
            warn!(error = %e, "failed to parse stored roster, reseeding");
            sample_collaborative_workspaces()
        }
    }
}

pub fn save_local_roster(vault: &LocalVault, list: &[WorkspaceSummary]) {
    if let Err(e) = vault.set_json(ROSTER_KEY, &list) {
        warn!(error = %e, "failed to persist roster");
    }
}

/// Start roster maintenance for the session and return the shared state
/// sender (lifecycle operations publish optimistic updates through it).
pub fn spawn_roster(
    mode: StorageMode,
    store: Arc<dyn WorkspaceStore>,
    vault: LocalVault,
    profile: UserProfile,
    cancel: CancellationToken,
) -> (Arc<watch::Sender<RosterState>>, watch::Receiver<RosterState>) {
    let (tx, rx) = watch::channel(RosterState::default());
    let tx = Arc::new(tx);

    match mode {
        StorageMode::Local => {
            let workspaces = load_local_roster(&vault);
            let _ = tx.send(RosterState {
                workspaces,
                loaded: true,
            });
        }
        StorageMode::Cloud => {
            let poll_tx = Arc::clone(&tx);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(LIST_POLL_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            refresh_cloud_roster(&store, &profile, &poll_tx).await;
                        }
                    }
                }
            });
        }
    }

    (tx, rx)
}

async fn refresh_cloud_roster(
    store: &Arc<dyn WorkspaceStore>,
    profile: &UserProfile,
    tx: &watch::Sender<RosterState>,
) {
    match store
        .list_for_member(&profile.sub, Some(&profile.email))
        .await
    {
        Ok(list) => {
            let cleaned = clean_roster(list);
            let changed = {
                let current = tx.borrow();
                !current.loaded || current.workspaces != cleaned
            };
            if changed {
                debug!(count = cleaned.len(), "roster refreshed");
                let _ = tx.send(RosterState {
                    workspaces: cleaned,
                    loaded: true,
                });
            }
        }
        Err(e) => {
            // Degraded but non-fatal: the list stays as it was.
            warn!(error = %e, "workspace list query failed");
            let loaded = tx.borrow().loaded;
            if !loaded {
                let _ = tx.send(RosterState {
                    workspaces: vec![],
                    loaded: true,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary(id: &str, order: u32, personal: bool) -> WorkspaceSummary {
        WorkspaceSummary {
            id: id.to_string(),
            name: id.to_string(),
            is_personal: personal,
            members: vec![],
            icon: None,
            theme: None,
            order,
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            sub: "sub-1".to_string(),
            name: "Ana".to_string(),
            email: "a@x.com".to_string(),
            picture: None,
        }
    }

    #[test]
    fn test_clean_roster_dedupes_by_id() {
        let list = vec![
            summary("ws-a", 1, false),
            summary("ws-a", 1, false),
            summary("ws-b", 0, false),
        ];
        let cleaned = clean_roster(list);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].id, "ws-b");
        assert_eq!(cleaned[1].id, "ws-a");
    }

    #[test]
    fn test_clean_roster_drops_personal_entries() {
        let list = vec![
            summary("ws-personal-sub-1", 0, true),
            summary("ws-a", 1, false),
        ];
        let cleaned = clean_roster(list);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].id, "ws-a");
    }

    #[test]
    fn test_personal_workspace_defaults() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let personal = personal_workspace(&vault, &profile());
        assert_eq!(personal.id, "ws-personal-sub-1");
        assert!(personal.is_personal);
        assert_eq!(personal.name, "Mi Espacio de Trabajo");
    }

    #[test]
    fn test_personal_workspace_merges_stored_customization() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let mut custom = default_personal_workspace(&profile());
        custom.name = "Mis Cosas".to_string();
        custom.icon = Some("🎯".to_string());
        save_personal_meta(&vault, &profile(), &custom);

        let personal = personal_workspace(&vault, &profile());
        assert_eq!(personal.name, "Mis Cosas");
        assert_eq!(personal.icon.as_deref(), Some("🎯"));
    }

    #[test]
    fn test_local_roster_seeds_on_first_run() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        let roster = load_local_roster(&vault);
        assert!(!roster.is_empty());

        // Seeds are persisted, so the second load reads them back.
        let again = load_local_roster(&vault);
        assert_eq!(roster, again);
    }

    #[test]
    fn test_local_roster_malformed_falls_back_to_seeds() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();
        vault.set(ROSTER_KEY, "{{{").unwrap();

        let roster = load_local_roster(&vault);
        assert_eq!(roster, sample_collaborative_workspaces());
    }
}
