pub mod canvas;
pub mod completions;
pub mod open;
pub mod project;
pub mod status;
pub mod watch;

use chrono::{DateTime, Local, Utc};
use drawer_core::model::Canvas;
use serde::Serialize;

/// Canvas summary as printed by `list`, `show`, and mutating commands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub elements: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanvasSummary {
    pub fn new(canvas: &Canvas, project_name: Option<String>) -> Self {
        Self {
            id: canvas.id.to_string(),
            name: canvas.name.clone(),
            project_id: canvas.project_id.as_ref().map(ToString::to_string),
            project_name,
            elements: canvas.live_element_count(),
            created_at: canvas.created_at,
            updated_at: canvas.updated_at,
        }
    }

    pub fn of(session: &drawer_core::Session, canvas: &Canvas) -> Self {
        let project_name = canvas.project_id.as_ref().and_then(|pid| {
            session
                .library()
                .read()
                .project(pid)
                .map(|p| p.name.clone())
        });
        Self::new(canvas, project_name)
    }
}

pub fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
