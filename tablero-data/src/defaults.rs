//! Seed content for freshly initialized workspaces.
//!
//! A personal workspace opened for the first time is populated with these
//! samples so the board is not empty; local mode also seeds the
//! collaborative roster from here when no stored list exists.

use chrono::{Duration, Utc};

use crate::types::{
    Project, Subtask, Task, TaskDuration, TaskPriority, TaskStatus, User, WorkspaceSummary,
};

/// Avatar palette, assigned round-robin as members join.
pub const USER_COLORS: &[&str] = &[
    "#E24A4A", "#23B2F5", "#E350D3", "#4AE29D", "#F5A623", "#4A90E2", "#8B572A", "#F78DA7",
];

/// Pick an avatar color for the nth member of a workspace.
pub fn avatar_color(index: usize) -> String {
    USER_COLORS[index % USER_COLORS.len()].to_string()
}

fn user(id: &str, name: &str, color: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        avatar_color: color.to_string(),
        picture: None,
        email: None,
    }
}

pub fn sample_users() -> Vec<User> {
    vec![
        user("user-1", "Ana López", "#E24A4A"),
        user("user-2", "Carlos García", "#23B2F5"),
        user("user-3", "Sofía Martínez", "#E350D3"),
    ]
}

pub fn sample_projects() -> Vec<Project> {
    vec![
        Project {
            id: "proj-1".to_string(),
            name: "Desarrollo Frontend".to_string(),
            color: "#4A90E2".to_string(),
            responsible_ids: vec!["user-1".to_string(), "user-3".to_string()],
            description: Some(
                "Creación de una interfaz de usuario moderna y responsiva para el nuevo portal de clientes.".to_string(),
            ),
        },
        Project {
            id: "proj-2".to_string(),
            name: "Campaña de Marketing".to_string(),
            color: "#F5A623".to_string(),
            responsible_ids: vec!["user-2".to_string()],
            description: Some(
                "Lanzamiento del producto Q3 enfocado en redes sociales y email marketing.".to_string(),
            ),
        },
        Project {
            id: "proj-3".to_string(),
            name: "Investigación UX".to_string(),
            color: "#50E3C2".to_string(),
            responsible_ids: vec!["user-3".to_string()],
            description: Some(
                "Estudio de usabilidad para identificar puntos de dolor en el flujo de pago actual.".to_string(),
            ),
        },
    ]
}

fn subtask(id: &str, text: &str, completed: bool) -> Subtask {
    Subtask {
        id: id.to_string(),
        text: text.to_string(),
        completed,
    }
}

pub fn sample_tasks() -> Vec<Task> {
    let now = Utc::now();
    vec![
        Task {
            id: "task-1".to_string(),
            title: "Configurar el entorno de desarrollo".to_string(),
            description: "Instalar todas las dependencias necesarias y configurar el linter."
                .to_string(),
            status: TaskStatus::Done,
            project_id: "proj-1".to_string(),
            responsible_id: "user-1".to_string(),
            subtasks: vec![
                subtask("sub-1-1", "Instalar toolchain", true),
                subtask("sub-1-2", "Crear el proyecto", true),
                subtask("sub-1-3", "Configurar el linter", true),
            ],
            created_at: (now - Duration::days(10)).to_rfc3339(),
            completed_at: Some((now - Duration::days(8)).to_rfc3339()),
            order: 0,
            priority: TaskPriority::Alta,
            duration: TaskDuration::OneDay,
        },
        Task {
            id: "task-2".to_string(),
            title: "Crear componentes de la UI".to_string(),
            description: "Desarrollar los componentes reutilizables: botones, modales y tarjetas."
                .to_string(),
            status: TaskStatus::InProgress,
            project_id: "proj-1".to_string(),
            responsible_id: "user-1".to_string(),
            subtasks: vec![
                subtask("sub-2-1", "Componente Botón", true),
                subtask("sub-2-2", "Componente Modal", false),
                subtask("sub-2-3", "Componente Tarjeta de Tarea", false),
            ],
            created_at: (now - Duration::days(5)).to_rfc3339(),
            completed_at: None,
            order: 0,
            priority: TaskPriority::Media,
            duration: TaskDuration::TwoToThreeDays,
        },
        Task {
            id: "task-3".to_string(),
            title: "Definir estrategia de redes sociales".to_string(),
            description: "Planificar el contenido para el próximo trimestre.".to_string(),
            status: TaskStatus::ToDo,
            project_id: "proj-2".to_string(),
            responsible_id: "user-2".to_string(),
            subtasks: vec![
                subtask("sub-3-1", "Investigar tendencias", false),
                subtask("sub-3-2", "Crear calendario de contenido", false),
            ],
            created_at: (now - Duration::days(2)).to_rfc3339(),
            completed_at: None,
            order: 0,
            priority: TaskPriority::Urgente,
            duration: TaskDuration::OneWeek,
        },
    ]
}

/// Sample collaborative workspaces for local mode's first run.
pub fn sample_collaborative_workspaces() -> Vec<WorkspaceSummary> {
    let users = sample_users();
    vec![
        WorkspaceSummary {
            id: "ws-collab-1".to_string(),
            name: "Equipo de Diseño".to_string(),
            is_personal: false,
            members: vec![
                users[0].clone(),
                users[2].clone(),
                user("user-4", "David", "#4AE29D"),
            ],
            icon: None,
            theme: None,
            order: 0,
        },
        WorkspaceSummary {
            id: "ws-collab-2".to_string(),
            name: "Proyecto Titán".to_string(),
            is_personal: false,
            members: vec![
                users[0].clone(),
                users[1].clone(),
                users[2].clone(),
                user("user-5", "Elena", "#F5A623"),
                user("user-6", "Frank", "#4A90E2"),
            ],
            icon: None,
            theme: None,
            order: 1,
        },
    ]
}
