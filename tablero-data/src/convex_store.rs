//! Cloud backend: a typed wrapper around the Convex Rust SDK.
//!
//! All methods map to Convex functions in the deployment's `workspaces`
//! module. The four document collections travel as JSON-encoded strings
//! inside the document row; metadata fields are plain Convex values.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use convex::{ConvexClient, FunctionResult, Value};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::store::{DocumentSnapshot, DocumentSubscription, MemberRemoval, WorkspaceStore};
use crate::types::{User, WorkspaceDocument, WorkspaceSummary};

pub struct ConvexWorkspaceStore {
    client: Mutex<ConvexClient>,
}

// --- Arg-building helpers ---

fn document_to_args(workspace_id: &str, doc: &WorkspaceDocument) -> Result<BTreeMap<String, Value>> {
    let mut args = BTreeMap::new();
    args.insert("id".into(), Value::from(workspace_id));
    args.insert("tasks".into(), Value::from(serde_json::to_string(&doc.tasks)?));
    args.insert(
        "projects".into(),
        Value::from(serde_json::to_string(&doc.projects)?),
    );
    args.insert("users".into(), Value::from(serde_json::to_string(&doc.users)?));
    args.insert(
        "messages".into(),
        Value::from(serde_json::to_string(&doc.messages)?),
    );
    args.insert("name".into(), Value::from(doc.name.as_str()));
    args.insert("isPersonal".into(), Value::from(doc.is_personal));
    if let Some(ref icon) = doc.icon {
        args.insert("icon".into(), Value::from(icon.as_str()));
    }
    if let Some(ref theme) = doc.theme {
        args.insert("theme".into(), Value::from(theme.as_str()));
    }
    // Convex v.number() validates as float64; send an f64 literal.
    args.insert("order".into(), Value::from(doc.order as f64));
    Ok(args)
}

// --- Query result extraction helpers ---

fn value_as_str(map: &BTreeMap<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn value_as_opt_str(map: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn value_as_bool(map: &BTreeMap<String, Value>, key: &str) -> bool {
    matches!(map.get(key), Some(Value::Boolean(true)))
}

fn value_as_u32(map: &BTreeMap<String, Value>, key: &str) -> u32 {
    match map.get(key) {
        Some(Value::Int64(n)) => (*n).max(0) as u32,
        Some(Value::Float64(f)) if *f >= 0.0 => *f as u32,
        _ => 0,
    }
}

fn collection_from_json<T: serde::de::DeserializeOwned>(
    map: &BTreeMap<String, Value>,
    key: &str,
) -> Result<Vec<T>> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => {
            serde_json::from_str(s).map_err(|e| anyhow::anyhow!("parsing {} collection: {}", key, e))
        }
        _ => Ok(vec![]),
    }
}

fn extract_document(obj: &BTreeMap<String, Value>) -> Result<WorkspaceDocument> {
    Ok(WorkspaceDocument {
        tasks: collection_from_json(obj, "tasks")?,
        projects: collection_from_json(obj, "projects")?,
        users: collection_from_json(obj, "users")?,
        messages: collection_from_json(obj, "messages")?,
        name: value_as_str(obj, "name"),
        is_personal: value_as_bool(obj, "isPersonal"),
        icon: value_as_opt_str(obj, "icon"),
        theme: value_as_opt_str(obj, "theme"),
        order: value_as_u32(obj, "order"),
    })
}

fn extract_summary(obj: &BTreeMap<String, Value>) -> Result<WorkspaceSummary> {
    let members: Vec<User> = collection_from_json(obj, "users")?;
    Ok(WorkspaceSummary {
        id: value_as_str(obj, "id"),
        name: value_as_str(obj, "name"),
        is_personal: value_as_bool(obj, "isPersonal"),
        members,
        icon: value_as_opt_str(obj, "icon"),
        theme: value_as_opt_str(obj, "theme"),
        order: value_as_u32(obj, "order"),
    })
}

fn extract_summary_list(result: FunctionResult) -> Result<Vec<WorkspaceSummary>> {
    match result {
        FunctionResult::Value(Value::Array(items)) => {
            let mut summaries = Vec::new();
            for item in items {
                if let Value::Object(obj) = item {
                    match extract_summary(&obj) {
                        Ok(summary) => summaries.push(summary),
                        Err(e) => warn!(error = %e, "skipping malformed workspace summary"),
                    }
                }
            }
            Ok(summaries)
        }
        FunctionResult::Value(Value::Null) => Ok(vec![]),
        FunctionResult::Value(other) => {
            bail!("expected array for workspace list, got: {:?}", other)
        }
        FunctionResult::ErrorMessage(msg) => bail!("Convex error: {}", msg),
        FunctionResult::ConvexError(err) => bail!("Convex error: {:?}", err),
    }
}

fn extract_optional_document(result: FunctionResult) -> Result<Option<WorkspaceDocument>> {
    match result {
        FunctionResult::Value(Value::Null) => Ok(None),
        FunctionResult::Value(Value::Object(obj)) => Ok(Some(extract_document(&obj)?)),
        FunctionResult::Value(other) => {
            bail!("expected object or null for workspace, got: {:?}", other)
        }
        FunctionResult::ErrorMessage(msg) => bail!("Convex error: {}", msg),
        FunctionResult::ConvexError(err) => bail!("Convex error: {:?}", err),
    }
}

/// Extract unit result (for mutations that don't return a meaningful value).
fn extract_unit(result: FunctionResult) -> Result<()> {
    match result {
        FunctionResult::Value(_) => Ok(()),
        FunctionResult::ErrorMessage(msg) => bail!("Convex error: {}", msg),
        FunctionResult::ConvexError(err) => bail!("Convex error: {:?}", err),
    }
}

/// Map one subscription delivery onto the tri-state snapshot. A `Null`
/// value is the backend's explicit not-found; everything unexpected is a
/// transient error and must never be conflated with not-found.
fn snapshot_from_result(result: FunctionResult) -> DocumentSnapshot {
    match result {
        FunctionResult::Value(Value::Null) => DocumentSnapshot::NotFound,
        FunctionResult::Value(Value::Object(obj)) => match extract_document(&obj) {
            Ok(doc) => DocumentSnapshot::Data(doc),
            Err(e) => DocumentSnapshot::Error(e.to_string()),
        },
        FunctionResult::Value(other) => {
            DocumentSnapshot::Error(format!("unexpected workspace value: {:?}", other))
        }
        FunctionResult::ErrorMessage(msg) => DocumentSnapshot::Error(msg),
        FunctionResult::ConvexError(err) => DocumentSnapshot::Error(format!("{:?}", err)),
    }
}

impl ConvexWorkspaceStore {
    /// Connect to a Convex deployment. Connection failure here is the
    /// cloud-mode authentication failure the mode selector falls back on.
    pub async fn connect(deployment_url: &str) -> Result<Self> {
        let client = ConvexClient::new(deployment_url).await?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl WorkspaceStore for ConvexWorkspaceStore {
    async fn subscribe(&self, workspace_id: &str) -> Result<DocumentSubscription> {
        let mut args = BTreeMap::new();
        args.insert("id".into(), Value::from(workspace_id));

        let mut sub = {
            let mut client = self.client.lock().await;
            client.subscribe("workspaces:get", args).await?
        };

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            while let Some(result) = sub.next().await {
                if tx.send(snapshot_from_result(result)).await.is_err() {
                    break;
                }
            }
        });

        Ok(DocumentSubscription::new(rx, task))
    }

    async fn save(&self, workspace_id: &str, document: &WorkspaceDocument) -> Result<()> {
        let args = document_to_args(workspace_id, document)?;
        let result = {
            let mut client = self.client.lock().await;
            client.mutation("workspaces:save", args).await?
        };
        extract_unit(result)
    }

    async fn list_for_member(
        &self,
        member_id: &str,
        member_email: Option<&str>,
    ) -> Result<Vec<WorkspaceSummary>> {
        let mut args = BTreeMap::new();
        args.insert("memberId".into(), Value::from(member_id));
        if let Some(email) = member_email {
            args.insert("memberEmail".into(), Value::from(email));
        }
        let result = {
            let mut client = self.client.lock().await;
            client.query("workspaces:listForMember", args).await?
        };
        extract_summary_list(result)
    }

    async fn remove_member(&self, workspace_id: &str, member_id: &str) -> Result<MemberRemoval> {
        let mut args = BTreeMap::new();
        args.insert("id".into(), Value::from(workspace_id));
        let result = {
            let mut client = self.client.lock().await;
            client.query("workspaces:get", args).await?
        };

        let mut doc = match extract_optional_document(result)? {
            Some(doc) => doc,
            // Already gone: nothing left to remove the member from.
            None => return Ok(MemberRemoval::WorkspaceDeleted),
        };

        doc.users.retain(|u| u.id != member_id);
        if doc.users.is_empty() {
            self.delete(workspace_id).await?;
            Ok(MemberRemoval::WorkspaceDeleted)
        } else {
            self.save(workspace_id, &doc).await?;
            Ok(MemberRemoval::MemberRemoved)
        }
    }

    async fn set_list_order(&self, workspace_id: &str, order: u32) -> Result<()> {
        let mut args = BTreeMap::new();
        args.insert("id".into(), Value::from(workspace_id));
        args.insert("order".into(), Value::from(order as f64));
        let result = {
            let mut client = self.client.lock().await;
            client.mutation("workspaces:setOrder", args).await?
        };
        extract_unit(result)
    }

    async fn delete(&self, workspace_id: &str) -> Result<()> {
        let mut args = BTreeMap::new();
        args.insert("id".into(), Value::from(workspace_id));
        let result = {
            let mut client = self.client.lock().await;
            client.mutation("workspaces:remove", args).await?
        };
        extract_unit(result)
    }
}
