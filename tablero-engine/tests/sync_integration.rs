//! End-to-end engine tests driven by the in-memory store (which echoes
//! saves back like the cloud backend) and a scripted store for failure
//! injection. Time is paused, so debounce and grace windows elapse
//! deterministically.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use tablero_data::{
    personal_workspace_id, DocumentSnapshot, DocumentSubscription, LocalVault,
    LocalWorkspaceStore, MemberRemoval, MemoryWorkspaceStore, Task, TaskStatus, User, UserProfile,
    WorkspaceDocument, WorkspaceStore, WorkspaceSummary,
};
use tablero_engine::{Engine, SessionCommand, StorageMode};

fn profile() -> UserProfile {
    UserProfile {
        sub: "real-42".to_string(),
        name: "Ana Gómez".to_string(),
        email: "a@x.com".to_string(),
        picture: None,
    }
}

fn me_user() -> User {
    User {
        id: "real-42".to_string(),
        name: "Ana Gómez".to_string(),
        avatar_color: "#E24A4A".to_string(),
        picture: None,
        email: Some("a@x.com".to_string()),
    }
}

fn other_user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: id.to_string(),
        avatar_color: "#23B2F5".to_string(),
        picture: None,
        email: None,
    }
}

fn task(id: &str, status: TaskStatus, order: u32, responsible: &str) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Tarea {}", id),
        description: String::new(),
        status,
        project_id: String::new(),
        responsible_id: responsible.to_string(),
        subtasks: vec![],
        created_at: "2024-01-01T00:00:00Z".to_string(),
        completed_at: None,
        order,
        priority: Default::default(),
        duration: Default::default(),
    }
}

fn cloud_engine(store: &MemoryWorkspaceStore, vault_dir: &tempfile::TempDir) -> Arc<Engine> {
    let vault = LocalVault::open(vault_dir.path()).unwrap();
    Engine::with_backend(
        StorageMode::Cloud,
        Arc::new(store.clone()),
        vault,
        profile(),
    )
}

/// Spin until `cond` holds; paused time makes the sleeps free.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test(start_paused = true)]
async fn test_personal_workspace_seeds_defaults_and_persists_lazily() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let engine = cloud_engine(&store, &dir);

    let ws_id = personal_workspace_id("real-42");
    let session = engine.open_workspace(&ws_id).await;
    let state = session.state();

    wait_for(|| state.borrow().loaded).await;

    let doc = state.borrow().document.clone();
    assert!(!doc.tasks.is_empty());
    assert!(!doc.projects.is_empty());
    assert_eq!(doc.users[0].id, "real-42");

    // Lazy creation: the seeded document reaches the backend through the
    // normal debounced save.
    wait_for(|| store.save_count() == 1).await;
    assert!(store.exists(&ws_id));
}

#[tokio::test(start_paused = true)]
async fn test_own_move_echo_is_suppressed_and_never_resaved() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    store.insert(
        "ws-collab-1",
        WorkspaceDocument {
            tasks: vec![task("t1", TaskStatus::InProgress, 0, "real-42")],
            users: vec![me_user(), other_user("user-2")],
            name: "Equipo".to_string(),
            ..Default::default()
        },
    );

    let engine = cloud_engine(&store, &dir);
    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();
    wait_for(|| state.borrow().loaded).await;

    session.move_task("t1", TaskStatus::ToDo, 0).await;
    wait_for(|| store.save_count() == 1).await;

    // Give the echo plenty of time past the grace window.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let doc = state.borrow().document.clone();
    let t1 = doc.tasks.iter().find(|t| t.id == "t1").unwrap();
    assert_eq!(t1.status, TaskStatus::ToDo);
    assert_eq!(t1.order, 0);

    // The echo must not bounce back as a redundant write, and the echo of
    // a task assigned to us by ourselves must not read as a reassignment.
    assert_eq!(store.save_count(), 1);
    assert!(engine.notifications().borrow().history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rapid_mutations_coalesce_into_one_save() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    store.insert(
        "ws-collab-1",
        WorkspaceDocument {
            tasks: vec![
                task("t1", TaskStatus::Backlog, 0, ""),
                task("t2", TaskStatus::Backlog, 1, ""),
            ],
            users: vec![me_user()],
            ..Default::default()
        },
    );

    let engine = cloud_engine(&store, &dir);
    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();
    wait_for(|| state.borrow().loaded).await;

    session.move_task("t1", TaskStatus::ToDo, 0).await;
    session.move_task("t2", TaskStatus::ToDo, 0).await;
    session
        .send(SessionCommand::PostMessage {
            text: "listo".to_string(),
            task_id: None,
        })
        .await;

    wait_for(|| store.save_count() >= 1).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.save_count(), 1);

    let saved = store.document("ws-collab-1").unwrap();
    assert_eq!(saved.messages.len(), 1);
    let t2 = saved.tasks.iter().find(|t| t.id == "t2").unwrap();
    assert_eq!(t2.status, TaskStatus::ToDo);
    assert_eq!(t2.order, 0);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_reassignment_fires_notification_but_initial_load_does_not() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    // A task already assigned to us exists before we open the workspace.
    store.insert(
        "ws-collab-1",
        WorkspaceDocument {
            tasks: vec![
                task("t1", TaskStatus::ToDo, 0, "real-42"),
                task("t2", TaskStatus::ToDo, 1, "user-2"),
            ],
            users: vec![me_user(), other_user("user-2")],
            ..Default::default()
        },
    );

    let engine = cloud_engine(&store, &dir);
    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();
    wait_for(|| state.borrow().loaded).await;

    // Pre-existing assignments on the first snapshot are not news.
    assert!(engine.notifications().borrow().history.is_empty());

    // Someone else reassigns t2 to us.
    let mut doc = store.document("ws-collab-1").unwrap();
    doc.tasks[1].responsible_id = "real-42".to_string();
    store.insert("ws-collab-1", doc);

    let notifications = engine.notifications();
    wait_for(|| !notifications.borrow().history.is_empty()).await;
    let history = notifications.borrow().history.clone();
    assert_eq!(history.len(), 1);
    assert!(history[0].message.contains("Tarea t2"));
}

#[tokio::test(start_paused = true)]
async fn test_invited_identity_is_reconciled_and_written_back() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let provisional = User {
        id: "prov-1".to_string(),
        name: "a@x.com".to_string(),
        avatar_color: "#E350D3".to_string(),
        picture: None,
        email: Some("a@x.com".to_string()),
    };
    store.insert(
        "ws-collab-1",
        WorkspaceDocument {
            tasks: vec![task("t1", TaskStatus::ToDo, 0, "prov-1")],
            users: vec![provisional, other_user("user-2")],
            ..Default::default()
        },
    );

    let engine = cloud_engine(&store, &dir);
    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();
    wait_for(|| state.borrow().loaded).await;

    // Visible state is reconciled immediately.
    let doc = state.borrow().document.clone();
    assert!(doc.users.iter().any(|u| u.id == "real-42"));
    assert!(doc.users.iter().all(|u| u.id != "prov-1"));
    assert_eq!(doc.tasks[0].responsible_id, "real-42");

    // The rewritten document reaches the backend shortly after.
    wait_for(|| {
        store
            .document("ws-collab-1")
            .map(|d| d.users.iter().any(|u| u.id == "real-42"))
            .unwrap_or(false)
    })
    .await;
    let saved = store.document("ws-collab-1").unwrap();
    assert!(saved.users.iter().all(|u| u.id != "prov-1"));
    assert_eq!(saved.tasks[0].responsible_id, "real-42");
    assert_eq!(
        saved.users.iter().filter(|u| u.id == "real-42").count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_leaving_as_last_member_deletes_the_document() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    store.insert(
        "ws-collab-1",
        WorkspaceDocument {
            users: vec![me_user()],
            ..Default::default()
        },
    );
    store.insert(
        "ws-collab-2",
        WorkspaceDocument {
            users: vec![me_user(), other_user("user-2")],
            ..Default::default()
        },
    );

    let engine = cloud_engine(&store, &dir);

    engine.delete_workspace("ws-collab-1").await.unwrap();
    assert!(!store.exists("ws-collab-1"));

    engine.delete_workspace("ws-collab-2").await.unwrap();
    let remaining = store.document("ws-collab-2").unwrap();
    assert_eq!(remaining.users.len(), 1);
    assert_eq!(remaining.users[0].id, "user-2");
}

#[tokio::test(start_paused = true)]
async fn test_local_mode_workspace_crud_persists_roster() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let vault = LocalVault::open(dir.path()).unwrap();
    let engine = Engine::with_backend(
        StorageMode::Local,
        Arc::new(store.clone()),
        vault.clone(),
        profile(),
    );

    // Local mode seeds the sample roster on first run.
    let roster = engine.roster();
    wait_for(|| roster.borrow().loaded).await;
    let seeded = roster.borrow().workspaces.len();
    assert!(seeded > 0);

    let created = engine.add_workspace("Nuevo Equipo").await.unwrap();
    assert_eq!(roster.borrow().workspaces.len(), seeded + 1);

    // Reorder: the new workspace moves to the front, orders become dense.
    let mut ids: Vec<String> = roster
        .borrow()
        .workspaces
        .iter()
        .map(|ws| ws.id.clone())
        .collect();
    ids.rotate_right(1);
    engine.reorder_workspaces(&ids).await.unwrap();

    let reordered = roster.borrow().workspaces.clone();
    assert_eq!(reordered[0].id, created.id);
    let orders: Vec<u32> = reordered.iter().map(|ws| ws.order).collect();
    assert_eq!(orders, (0..reordered.len() as u32).collect::<Vec<_>>());

    // A fresh engine over the same vault sees the persisted arrangement.
    let engine2 = Engine::with_backend(
        StorageMode::Local,
        Arc::new(store),
        vault,
        profile(),
    );
    let roster2 = engine2.roster();
    wait_for(|| roster2.borrow().loaded).await;
    assert_eq!(roster2.borrow().workspaces[0].id, created.id);
}

#[tokio::test(start_paused = true)]
async fn test_personal_metadata_survives_in_vault() {
    let store = MemoryWorkspaceStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let engine = cloud_engine(&store, &dir);

    engine
        .update_workspace(
            &personal_workspace_id("real-42"),
            tablero_engine::WorkspaceUpdate {
                name: Some("Mis Cosas".to_string()),
                icon: Some("🎯".to_string()),
                theme: None,
            },
        )
        .await
        .unwrap();

    let personal = engine.personal_workspace();
    assert_eq!(personal.name, "Mis Cosas");
    assert_eq!(personal.icon.as_deref(), Some("🎯"));
}

#[tokio::test(start_paused = true)]
async fn test_local_malformed_payload_falls_back_to_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let vault = LocalVault::open(dir.path()).unwrap();
    vault.set("data_ws-collab-1", "{definitely not json").unwrap();

    let store = LocalWorkspaceStore::new(vault.clone(), "real-42");
    let engine = Engine::with_backend(StorageMode::Local, Arc::new(store), vault, profile());

    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();
    wait_for(|| state.borrow().loaded).await;

    // Defaults for this workspace only, with us as a member.
    let doc = state.borrow().document.clone();
    assert!(doc.users.iter().any(|u| u.id == "real-42"));
}

// --- Failure injection via a scripted store ---

struct ScriptedStore {
    snapshots: StdMutex<Option<mpsc::Receiver<DocumentSnapshot>>>,
    saves: Arc<StdMutex<Vec<WorkspaceDocument>>>,
}

impl ScriptedStore {
    fn new() -> (Arc<Self>, mpsc::Sender<DocumentSnapshot>) {
        let (tx, rx) = mpsc::channel(16);
        let store = Arc::new(Self {
            snapshots: StdMutex::new(Some(rx)),
            saves: Arc::new(StdMutex::new(Vec::new())),
        });
        (store, tx)
    }
}

#[async_trait]
impl WorkspaceStore for ScriptedStore {
    async fn subscribe(&self, _workspace_id: &str) -> Result<DocumentSubscription> {
        let mut scripted = self
            .snapshots
            .lock()
            .unwrap()
            .take()
            .expect("scripted store supports a single subscription");
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            while let Some(snapshot) = scripted.recv().await {
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });
        Ok(DocumentSubscription::new(rx, task))
    }

    async fn save(&self, _workspace_id: &str, document: &WorkspaceDocument) -> Result<()> {
        self.saves.lock().unwrap().push(document.clone());
        Ok(())
    }

    async fn list_for_member(
        &self,
        _member_id: &str,
        _member_email: Option<&str>,
    ) -> Result<Vec<WorkspaceSummary>> {
        Ok(vec![])
    }

    async fn remove_member(&self, _workspace_id: &str, _member_id: &str) -> Result<MemberRemoval> {
        Ok(MemberRemoval::MemberRemoved)
    }

    async fn set_list_order(&self, _workspace_id: &str, _order: u32) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _workspace_id: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_cloud_error_is_not_treated_as_not_found() {
    let (store, snapshots) = ScriptedStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let vault = LocalVault::open(dir.path()).unwrap();
    let engine = Engine::with_backend(StorageMode::Cloud, store.clone(), vault, profile());

    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();

    snapshots
        .send(DocumentSnapshot::Error("network unreachable".to_string()))
        .await
        .unwrap();

    // Holding the loading state: no defaults were fabricated, nothing was
    // saved over the (possibly existing) remote document.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!state.borrow().loaded);
    assert!(store.saves.lock().unwrap().is_empty());

    // The real document arriving later loads normally.
    snapshots
        .send(DocumentSnapshot::Data(WorkspaceDocument {
            tasks: vec![task("t1", TaskStatus::ToDo, 0, "user-2")],
            users: vec![me_user()],
            ..Default::default()
        }))
        .await
        .unwrap();
    wait_for(|| state.borrow().loaded).await;
    assert_eq!(state.borrow().document.tasks.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cloud_load_timeout_stays_loading_instead_of_guessing() {
    let (store, _snapshots) = ScriptedStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let vault = LocalVault::open(dir.path()).unwrap();
    let engine = Engine::with_backend(StorageMode::Cloud, store.clone(), vault, profile());

    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();

    // Well past the safety timeout, a hung cloud subscription must not
    // have produced defaults.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!state.borrow().loaded);
    assert!(store.saves.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_not_found_initializes_a_fresh_workspace() {
    let (store, snapshots) = ScriptedStore::new();
    let dir = tempfile::TempDir::new().unwrap();
    let vault = LocalVault::open(dir.path()).unwrap();
    let engine = Engine::with_backend(StorageMode::Cloud, store.clone(), vault, profile());

    let session = engine.open_workspace("ws-collab-1").await;
    let state = session.state();

    snapshots.send(DocumentSnapshot::NotFound).await.unwrap();
    wait_for(|| state.borrow().loaded).await;

    // Fresh collaborative workspace: creator as sole member, and the
    // document persists through the debounced save.
    let doc = state.borrow().document.clone();
    assert_eq!(doc.users.len(), 1);
    assert_eq!(doc.users[0].id, "real-42");
    wait_for(|| !store.saves.lock().unwrap().is_empty()).await;
}
