//! Local HTTP surface over the sync engine.
//!
//! This is the seam the presentation layer consumes: current state,
//! loading flags, workspace lists, and the engine's mutation operations.
//! Handlers stay thin; everything delegates to [`Engine`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use tablero_data::{
    Message, Project, Task, TaskStatus, User, UserProfile, WorkspaceDocument, WorkspaceSummary,
};
use tablero_engine::{Engine, NotificationState, SessionCommand, WorkspaceUpdate};

type AppState = Arc<Engine>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacesResponse {
    pub personal: WorkspaceSummary,
    pub collaborative: Vec<WorkspaceSummary>,
    pub loaded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub workspace_id: String,
    pub document: WorkspaceDocument,
    pub loaded: bool,
    pub syncing: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspaceBody {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveTaskBody {
    pub status: TaskStatus,
    pub index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserBody {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageBody {
    pub text: String,
    pub task_id: Option<String>,
}

async fn get_profile(State(engine): State<AppState>) -> Json<UserProfile> {
    Json(engine.profile().clone())
}

async fn get_workspaces(State(engine): State<AppState>) -> Json<WorkspacesResponse> {
    let roster = engine.roster().borrow().clone();
    Json(WorkspacesResponse {
        personal: engine.personal_workspace(),
        collaborative: roster.workspaces,
        loaded: roster.loaded,
    })
}

async fn create_workspace(
    State(engine): State<AppState>,
    Json(body): Json<CreateWorkspaceBody>,
) -> Result<Json<WorkspaceSummary>, (StatusCode, String)> {
    engine
        .add_workspace(&body.name)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn update_workspace(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkspaceBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    engine
        .update_workspace(
            &id,
            WorkspaceUpdate {
                name: body.name,
                icon: body.icon,
                theme: body.theme,
            },
        )
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn delete_workspace(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    engine
        .delete_workspace(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn reorder_workspaces(
    State(engine): State<AppState>,
    Json(body): Json<ReorderBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    engine
        .reorder_workspaces(&body.ids)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn open_workspace(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    engine.open_workspace(&id).await;
    StatusCode::OK
}

async fn get_state(
    State(engine): State<AppState>,
) -> Result<Json<StateResponse>, StatusCode> {
    let session = engine.session().await.ok_or(StatusCode::NOT_FOUND)?;
    let state = session.state().borrow().clone();
    Ok(Json(StateResponse {
        workspace_id: session.workspace_id().to_string(),
        document: state.document,
        loaded: state.loaded,
        syncing: state.syncing,
    }))
}

/// Forward a mutation to the open session, 404 when none is open.
async fn send_command(engine: &Engine, command: SessionCommand) -> StatusCode {
    match engine.session().await {
        Some(session) => {
            session.send(command).await;
            StatusCode::ACCEPTED
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn move_task(
    State(engine): State<AppState>,
    Path(task_id): Path<String>,
    Json(body): Json<MoveTaskBody>,
) -> StatusCode {
    send_command(
        &engine,
        SessionCommand::MoveTask {
            task_id,
            status: body.status,
            index: body.index,
        },
    )
    .await
}

async fn set_tasks(State(engine): State<AppState>, Json(tasks): Json<Vec<Task>>) -> StatusCode {
    send_command(&engine, SessionCommand::SetTasks(tasks)).await
}

async fn set_projects(
    State(engine): State<AppState>,
    Json(projects): Json<Vec<Project>>,
) -> StatusCode {
    send_command(&engine, SessionCommand::SetProjects(projects)).await
}

async fn set_users(State(engine): State<AppState>, Json(users): Json<Vec<User>>) -> StatusCode {
    send_command(&engine, SessionCommand::SetUsers(users)).await
}

async fn set_messages(
    State(engine): State<AppState>,
    Json(messages): Json<Vec<Message>>,
) -> StatusCode {
    send_command(&engine, SessionCommand::SetMessages(messages)).await
}

async fn add_user(State(engine): State<AppState>, Json(body): Json<AddUserBody>) -> StatusCode {
    send_command(
        &engine,
        SessionCommand::AddUser {
            name: body.name,
            email: body.email,
        },
    )
    .await
}

async fn post_message(
    State(engine): State<AppState>,
    Json(body): Json<PostMessageBody>,
) -> StatusCode {
    send_command(
        &engine,
        SessionCommand::PostMessage {
            text: body.text,
            task_id: body.task_id,
        },
    )
    .await
}

async fn get_notifications(State(engine): State<AppState>) -> Json<NotificationState> {
    Json(engine.notifications().borrow().clone())
}

async fn mark_notifications_read(State(engine): State<AppState>) -> StatusCode {
    engine.notification_center().mark_all_read().await;
    StatusCode::NO_CONTENT
}

pub fn build_router(engine: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/profile", get(get_profile))
        .route("/api/workspaces", get(get_workspaces).post(create_workspace))
        .route(
            "/api/workspaces/{id}",
            axum::routing::patch(update_workspace).delete(delete_workspace),
        )
        .route("/api/workspaces/reorder", post(reorder_workspaces))
        .route("/api/workspaces/{id}/open", post(open_workspace))
        .route("/api/state", get(get_state))
        .route("/api/tasks", put(set_tasks))
        .route("/api/tasks/{id}/move", post(move_task))
        .route("/api/projects", put(set_projects))
        .route("/api/users", put(set_users).post(add_user))
        .route("/api/messages", put(set_messages).post(post_message))
        .route(
            "/api/notifications",
            get(get_notifications),
        )
        .route("/api/notifications/read", post(mark_notifications_read))
        .layer(cors)
        .with_state(engine)
}

pub async fn spawn_http_server(
    engine: AppState,
    port: u16,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, anyhow::Error> {
    let router = build_router(engine);
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!(port = port, "HTTP server listening");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .ok();
    });

    Ok(handle)
}
