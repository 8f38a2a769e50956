use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{AppState, CanvasId, Element, ProjectId, now};

/// A durable drawing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub id: CanvasId,
    pub name: String,
    pub project_id: Option<ProjectId>,
    pub elements: Vec<Element>,
    pub app_state: AppState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Canvas {
    /// A new empty canvas, optionally owned by `project_id`.
    #[must_use]
    pub fn new(name: impl Into<String>, project_id: Option<ProjectId>) -> Self {
        let now = now();
        Self {
            id: CanvasId::generate(),
            name: name.into(),
            project_id,
            elements: Vec::new(),
            app_state: AppState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of elements that are not tombstoned.
    #[must_use]
    pub fn live_element_count(&self) -> usize {
        self.elements.iter().filter(|e| !e.is_deleted()).count()
    }

    /// Move `updated_at` strictly forward, even when the wall clock has not
    /// advanced since the previous write.
    pub fn touch(&mut self) {
        self.updated_at = advance_timestamp(self.updated_at, now());
    }

    /// Copy with a fresh identity and timestamps.
    #[must_use]
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: CanvasId::generate(),
            name: name.into(),
            project_id: self.project_id.clone(),
            elements: self.elements.clone(),
            app_state: self.app_state.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// `now` if it is later than `previous`, otherwise one microsecond past it.
#[must_use]
pub fn advance_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
