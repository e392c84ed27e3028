//! Storage mode selection.
//!
//! Decided once per identity: a configured cloud backend that
//! authenticates within the timeout wins, anything else degrades to the
//! local vault. The decision is sticky for the session; callers re-run it
//! only when the identity changes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tablero_data::{ConvexWorkspaceStore, LocalVault, LocalWorkspaceStore, UserProfile, WorkspaceStore};

/// Bound on cloud authentication; beyond this the session runs local.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Cloud,
    Local,
}

pub struct SelectedBackend {
    pub mode: StorageMode,
    pub store: Arc<dyn WorkspaceStore>,
}

/// Pick the backend for this identity's session.
///
/// All subsequent subscription and save traffic routes through the
/// returned store exclusively; cloud and local are never mixed.
pub async fn select_backend(
    convex_url: Option<&str>,
    vault: &LocalVault,
    profile: &UserProfile,
) -> SelectedBackend {
    if let Some(url) = convex_url {
        match tokio::time::timeout(AUTH_TIMEOUT, ConvexWorkspaceStore::connect(url)).await {
            Ok(Ok(store)) => {
                info!(url = %url, "cloud backend authenticated");
                return SelectedBackend {
                    mode: StorageMode::Cloud,
                    store: Arc::new(store),
                };
            }
            Ok(Err(e)) => {
                warn!(error = %e, "cloud authentication failed, falling back to local storage");
            }
            Err(_) => {
                warn!("cloud authentication timed out, falling back to local storage");
            }
        }
    }

    SelectedBackend {
        mode: StorageMode::Local,
        store: Arc::new(LocalWorkspaceStore::new(vault.clone(), &profile.sub)),
    }
}
