use serde::{Deserialize, Serialize};

/// Status column a task lives in.
///
/// Serialized with the display strings stored documents use, so the wire
/// shape stays compatible with documents written by other clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Backlog,
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
            TaskStatus::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority tier used for workload scoring. Absent in a stored document
/// means the lowest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    #[default]
    Baja,
    Moderada,
    Media,
    Alta,
    Urgente,
}

impl TaskPriority {
    /// Scoring weight for this tier.
    pub fn weight(&self) -> u32 {
        match self {
            TaskPriority::Baja => 5,
            TaskPriority::Moderada => 8,
            TaskPriority::Media => 13,
            TaskPriority::Alta => 20,
            TaskPriority::Urgente => 40,
        }
    }
}

/// Estimated duration tier, same scoring scheme as [`TaskPriority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskDuration {
    #[default]
    #[serde(rename = "1 día")]
    OneDay,
    #[serde(rename = "2-3 días")]
    TwoToThreeDays,
    #[serde(rename = "1 semana")]
    OneWeek,
    #[serde(rename = "2 semanas")]
    TwoWeeks,
}

impl TaskDuration {
    pub fn weight(&self) -> u32 {
        match self {
            TaskDuration::OneDay => 5,
            TaskDuration::TwoToThreeDays => 8,
            TaskDuration::OneWeek => 13,
            TaskDuration::TwoWeeks => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// May dangle after a project deletion; cascades are explicit.
    #[serde(default)]
    pub project_id: String,
    /// Empty string means unassigned (Backlog items).
    #[serde(default)]
    pub responsible_id: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Set once at creation, immutable thereafter.
    pub created_at: String,
    /// Set exactly when the task enters Done, cleared when it leaves Done.
    #[serde(default)]
    pub completed_at: Option<String>,
    /// Dense per-status-column position. Only meaningful among tasks
    /// sharing the same `status`.
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub duration: TaskDuration,
}

impl Task {
    /// Combined workload score used by effort summaries.
    pub fn workload_weight(&self) -> u32 {
        self.priority.weight() + self.duration.weight()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub responsible_ids: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A workspace member.
///
/// `id` equals the identity provider's subject claim for members who have
/// logged in; members added by hand get a locally generated opaque id
/// until identity reconciliation claims them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_color: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub created_at: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// The unit of synchronization: one aggregate per workspace id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDocument {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub order: u32,
}

impl WorkspaceDocument {
    /// Metadata-only view of this document for roster display.
    pub fn summary(&self, id: &str) -> WorkspaceSummary {
        WorkspaceSummary {
            id: id.to_string(),
            name: self.name.clone(),
            is_personal: self.is_personal,
            members: self.users.clone(),
            icon: self.icon.clone(),
            theme: self.theme.clone(),
            order: self.order,
        }
    }
}

/// Metadata-only view of a workspace, as shown in the selector list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(default)]
    pub members: Vec<User>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub order: u32,
}

/// Stable profile produced by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject claim; the canonical user id everywhere.
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Prefix of the deterministically derived personal workspace id.
pub const PERSONAL_WORKSPACE_PREFIX: &str = "ws-personal-";

/// Personal workspace id for an identity's subject claim.
pub fn personal_workspace_id(sub: &str) -> String {
    format!("{}{}", PERSONAL_WORKSPACE_PREFIX, sub)
}

/// Whether a workspace id denotes a personal workspace.
pub fn is_personal_workspace(id: &str) -> bool {
    id.starts_with(PERSONAL_WORKSPACE_PREFIX)
}
