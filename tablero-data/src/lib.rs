//! Shared data layer for Tablero workspace synchronization
//!
//! This crate provides the domain model, the pluggable backend store
//! contract and its drivers (Convex cloud, local file vault, in-memory),
//! and the cross-process change watcher. Used by tablero-engine (the sync
//! engine) and tablero-daemon (the HTTP surface).

pub mod convex_store;
pub mod defaults;
pub mod local_store;
pub mod memory_store;
pub mod store;
pub mod text;
pub mod types;
pub mod vault;
pub mod watcher;

pub use convex_store::ConvexWorkspaceStore;
pub use local_store::LocalWorkspaceStore;
pub use memory_store::MemoryWorkspaceStore;
pub use store::{
    document_key, personal_meta_key, DocumentSnapshot, DocumentSubscription, MemberRemoval,
    WorkspaceStore, ROSTER_KEY,
};
pub use text::repair_mojibake;
pub use types::{
    is_personal_workspace, personal_workspace_id, Message, Project, Subtask, Task, TaskDuration,
    TaskPriority, TaskStatus, User, UserProfile, WorkspaceDocument, WorkspaceSummary,
};
pub use vault::LocalVault;
pub use watcher::{VaultEvent, VaultWatcher};
