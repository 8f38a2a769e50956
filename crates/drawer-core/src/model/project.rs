use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CanvasId, ProjectId, canvas::advance_timestamp, now};

/// A named group of canvases.
///
/// `canvas_ids` mirrors `Canvas::project_id`; the canvas side wins when the
/// two disagree (see `library::reconcile_memberships`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub canvas_ids: Vec<CanvasId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: ProjectId::generate(),
            name: name.into(),
            canvas_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn contains(&self, canvas_id: &CanvasId) -> bool {
        self.canvas_ids.contains(canvas_id)
    }

    /// Append `canvas_id` unless already a member. Returns whether it changed.
    pub fn add_canvas(&mut self, canvas_id: &CanvasId) -> bool {
        if self.contains(canvas_id) {
            return false;
        }
        self.canvas_ids.push(canvas_id.clone());
        self.touch();
        true
    }

    /// Remove `canvas_id` if present. Returns whether it changed.
    pub fn remove_canvas(&mut self, canvas_id: &CanvasId) -> bool {
        let before = self.canvas_ids.len();
        self.canvas_ids.retain(|id| id != canvas_id);
        let changed = self.canvas_ids.len() != before;
        if changed {
            self.touch();
        }
        changed
    }

    pub fn touch(&mut self) {
        self.updated_at = advance_timestamp(self.updated_at, now());
    }
}
