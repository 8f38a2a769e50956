use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Host color scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Zoom wrapper, stored by the host as `{"value": 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub value: f64,
}

impl Default for Zoom {
    fn default() -> Self {
        Self { value: 1.0 }
    }
}

/// View and application state of a document.
///
/// Known fields are typed; anything else the host stores is kept in `extra`
/// and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub theme: Theme,
    pub zoom: Zoom,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
    pub selected_element_ids: BTreeMap<String, bool>,
    pub view_background_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Viewport used when the host state carries no dimensions.
pub const DEFAULT_VIEWPORT: (f64, f64) = (1920.0, 1080.0);

impl Default for AppState {
    fn default() -> Self {
        Self::for_viewport(DEFAULT_VIEWPORT.0, DEFAULT_VIEWPORT.1)
    }
}

impl AppState {
    /// Defaults for a viewport: zoom 1, no scroll, light theme, no selection.
    #[must_use]
    pub fn for_viewport(width: f64, height: f64) -> Self {
        Self {
            theme: Theme::Light,
            zoom: Zoom::default(),
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
            selected_element_ids: BTreeMap::new(),
            view_background_color: "#ffffff".to_owned(),
            name: None,
            extra: Map::new(),
        }
    }

    /// Parse a host state record, falling back to viewport defaults for every
    /// field that is missing. Returns `None` when the value is not an object
    /// or a known field has the wrong shape.
    #[must_use]
    pub fn from_host_value(value: Value, viewport: (f64, f64)) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        // Width/height default to the viewport rather than the compiled-in one.
        map.entry("width").or_insert(Value::from(viewport.0));
        map.entry("height").or_insert(Value::from(viewport.1));
        serde_json::from_value(Value::Object(map)).ok()
    }
}
