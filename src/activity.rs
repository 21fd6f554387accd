//! Activity log derivation.
//!
//! Pure functions that diff two task snapshots into the human-readable audit
//! strings appended after an accepted mutation. Deterministic — identical
//! inputs always yield identical output, and `diff(s, s)` is empty — which is
//! what makes the exactly-once audit discipline testable.

use crate::model::{Responsible, Task, TaskStatus};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

/// Diff two snapshots of the same task into one description per changed
/// category, in a fixed order: title, description, priority, due date,
/// due time, responsibles (added before removed). Unchanged fields emit
/// nothing.
pub fn diff(old: &Task, new: &Task) -> Vec<String> {
    let mut lines = Vec::new();

    if old.title != new.title {
        lines.push(format!(
            "Changed the title from \"{}\" to \"{}\"",
            old.title, new.title
        ));
    }

    if old.description != new.description {
        lines.push(match (&old.description, &new.description) {
            (None, Some(_)) => "Added a description".to_string(),
            (Some(_), None) => "Removed the description".to_string(),
            _ => "Updated the description".to_string(),
        });
    }

    if old.priority != new.priority {
        lines.push(format!(
            "Changed the priority from {} to {}",
            old.priority, new.priority
        ));
    }

    if old.due_date != new.due_date {
        lines.push(match (old.due_date, new.due_date) {
            (None, Some(d)) => format!("Set the due date to {}", d.format(DATE_FMT)),
            (Some(_), None) => "Removed the due date".to_string(),
            (Some(from), Some(to)) => format!(
                "Changed the due date from {} to {}",
                from.format(DATE_FMT),
                to.format(DATE_FMT)
            ),
            (None, None) => unreachable!(),
        });
    }

    if old.due_time != new.due_time {
        lines.push(match (old.due_time, new.due_time) {
            (None, Some(t)) => format!("Set the due time to {}", t.format(TIME_FMT)),
            (Some(_), None) => "Removed the due time".to_string(),
            (Some(from), Some(to)) => format!(
                "Changed the due time from {} to {}",
                from.format(TIME_FMT),
                to.format(TIME_FMT)
            ),
            (None, None) => unreachable!(),
        });
    }

    // Responsibles: compare by identity, added before removed, each in the
    // order they appear in the respective snapshot.
    for added in new
        .responsibles
        .iter()
        .filter(|r| !old.responsibles.iter().any(|o| o.id == r.id))
    {
        lines.push(assigned_line(added));
    }
    for removed in old
        .responsibles
        .iter()
        .filter(|r| !new.responsibles.iter().any(|n| n.id == r.id))
    {
        lines.push(unassigned_line(removed));
    }

    lines
}

/// Description for a status transition (drag between board columns).
pub fn status_line(from: TaskStatus, to: TaskStatus) -> String {
    format!("Moved the task from {from} to {to}")
}

/// Description for the archived flag flipping.
pub fn archived_line(archived: bool) -> String {
    if archived {
        "Archived the task".to_string()
    } else {
        "Restored the task from the archive".to_string()
    }
}

pub fn assigned_line(responsible: &Responsible) -> String {
    if responsible.assignee.is_team() {
        format!("Assigned team {}", responsible.assignee.display_name())
    } else {
        format!("Assigned {}", responsible.assignee.display_name())
    }
}

pub fn unassigned_line(responsible: &Responsible) -> String {
    if responsible.assignee.is_team() {
        format!("Unassigned team {}", responsible.assignee.display_name())
    } else {
        format!("Unassigned {}", responsible.assignee.display_name())
    }
}
