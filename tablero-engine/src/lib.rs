//! Workspace synchronization engine for Tablero
//!
//! Arbitrates between the local vault and a cloud document store: selects
//! the storage mode once per identity, keeps the workspace roster
//! current, owns the in-memory document of the open workspace, persists
//! optimistic local mutations through a debounced save with echo
//! suppression, reconciles invited-member identities, and derives the
//! assignment notifications the UI shows.

pub mod engine;
pub mod mode;
pub mod moves;
pub mod notify;
pub mod reconcile;
pub mod roster;
pub mod session;

pub use engine::{Engine, EngineConfig, WorkspaceUpdate};
pub use mode::{select_backend, SelectedBackend, StorageMode, AUTH_TIMEOUT};
pub use moves::{move_task, reorder_summaries};
pub use notify::{
    EngineEvent, Notification, NotificationCenter, NotificationKind, NotificationState,
    HISTORY_LIMIT, TOAST_TTL,
};
pub use reconcile::{
    derive_assignment_events, ensure_member, reconcile_identity, AssignmentEvent,
};
pub use roster::{clean_roster, personal_workspace, RosterState, LIST_POLL_INTERVAL};
pub use session::{
    SessionCommand, SessionHandle, SessionState, LOAD_TIMEOUT, RECONCILE_WRITEBACK_DELAY,
    SAVE_DEBOUNCE, SAVE_GRACE,
};
