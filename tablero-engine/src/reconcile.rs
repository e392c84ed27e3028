//! Identity reconciliation and assignment-event derivation.
//!
//! When a collaborator is invited by email before ever logging in, they
//! exist in the document under a provisional id. The first snapshot seen
//! after they authenticate migrates that provisional identity to the real
//! subject claim, including every foreign key that referenced it.

use std::collections::HashMap;

use tablero_data::defaults::avatar_color;
use tablero_data::{repair_mojibake, Task, UserProfile, WorkspaceDocument};

/// A task assignment the current identity should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentEvent {
    pub task_id: String,
    pub title: String,
}

/// Compare an incoming task array against the previously seen one and
/// collect newly arrived assignments for `me`.
///
/// The first snapshot after opening a workspace is exempt: pre-existing
/// assignments are not news. Callers must refresh `previous` with their
/// own optimistic writes at the moment those are made, otherwise the
/// backend's echo of a local save reads as a foreign reassignment.
pub fn derive_assignment_events(
    previous: &[Task],
    incoming: &[Task],
    me: &str,
    initial_snapshot: bool,
) -> Vec<AssignmentEvent> {
    if initial_snapshot {
        return vec![];
    }

    let previous_by_id: HashMap<&str, &Task> =
        previous.iter().map(|t| (t.id.as_str(), t)).collect();

    incoming
        .iter()
        .filter(|t| t.responsible_id == me)
        .filter(|t| match previous_by_id.get(t.id.as_str()) {
            None => true,                              // new task, assigned to me
            Some(old) => old.responsible_id != me,     // existed, reassigned to me
        })
        .map(|t| AssignmentEvent {
            task_id: t.id.clone(),
            title: t.title.clone(),
        })
        .collect()
}

/// Migrate a provisional invited-member identity to the authenticated one.
///
/// Finds a user whose email matches the profile but whose id differs,
/// rewrites that user to the real subject claim (refreshing name and
/// picture from the live identity), and repoints every project, task, and
/// message reference. Returns the retired provisional id when a migration
/// happened. Applying this twice is a no-op the second time.
pub fn reconcile_identity(doc: &mut WorkspaceDocument, profile: &UserProfile) -> Option<String> {
    if profile.email.is_empty() {
        return None;
    }

    let invited = doc
        .users
        .iter_mut()
        .find(|u| u.email.as_deref() == Some(profile.email.as_str()) && u.id != profile.sub)?;

    let old_id = invited.id.clone();
    invited.id = profile.sub.clone();
    invited.name = profile.name.clone();
    invited.picture = profile.picture.clone();

    for project in &mut doc.projects {
        for rid in &mut project.responsible_ids {
            if *rid == old_id {
                *rid = profile.sub.clone();
            }
        }
    }
    for task in &mut doc.tasks {
        if task.responsible_id == old_id {
            task.responsible_id = profile.sub.clone();
        }
    }
    for message in &mut doc.messages {
        if message.user_id == old_id {
            message.user_id = profile.sub.clone();
        }
    }

    Some(old_id)
}

/// Append the authenticated identity as a member when it is absent
/// entirely (first time joining a workspace). Returns whether a member
/// was added.
pub fn ensure_member(doc: &mut WorkspaceDocument, profile: &UserProfile) -> bool {
    if doc.users.iter().any(|u| u.id == profile.sub) {
        return false;
    }
    doc.users.push(tablero_data::User {
        id: profile.sub.clone(),
        name: profile.name.clone(),
        avatar_color: avatar_color(doc.users.len()),
        picture: profile.picture.clone(),
        email: Some(profile.email.clone()),
    });
    true
}

/// Repair encoding damage in member names arriving from storage.
pub fn repair_member_names(doc: &mut WorkspaceDocument) {
    for user in &mut doc.users {
        user.name = repair_mojibake(&user.name);
    }
}
