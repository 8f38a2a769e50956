//! Export canvases in the host's file format and import such files back.

use serde_json::{Map, Value, json};

use crate::model::element::{elements_from_values, normalize_elements};
use crate::model::{AppState, Canvas, Element};

/// `type` field of the host's document files.
pub const DOCUMENT_TYPE: &str = "excalidraw";
/// Format version written on export.
pub const DOCUMENT_VERSION: u64 = 2;
/// `source` field written on export.
pub const DOCUMENT_SOURCE: &str = "drawer";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an excalidraw document or an element array, found {0}")]
    NotADrawing(&'static str),

    #[error("document type '{0}' is not excalidraw")]
    WrongType(String),
}

/// Elements and view state read from an imported file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedDocument {
    pub elements: Vec<Element>,
    pub app_state: Option<AppState>,
}

/// Serialize `canvas` as a host document file.
#[must_use]
pub fn export_canvas(canvas: &Canvas) -> Value {
    let elements = normalize_elements(canvas.id.as_str(), &canvas.elements);
    json!({
        "type": DOCUMENT_TYPE,
        "version": DOCUMENT_VERSION,
        "source": DOCUMENT_SOURCE,
        "elements": elements,
        "appState": canvas.app_state,
        "files": Map::new(),
    })
}

/// Parse a host document file, or a bare element array.
///
/// # Errors
///
/// Returns [`TransferError`] if the text is not JSON or not a drawing.
pub fn parse_import(text: &str) -> Result<ImportedDocument, TransferError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(values) => Ok(ImportedDocument {
            elements: elements_from_values(values),
            app_state: None,
        }),
        Value::Object(mut map) => {
            match map.get("type") {
                Some(Value::String(kind)) if kind != DOCUMENT_TYPE => {
                    return Err(TransferError::WrongType(kind.clone()));
                }
                _ => {}
            }
            let Some(Value::Array(values)) = map.remove("elements") else {
                return Err(TransferError::NotADrawing("an object without elements"));
            };
            let app_state = map
                .remove("appState")
                .and_then(|v| AppState::from_host_value(v, crate::model::app_state::DEFAULT_VIEWPORT));
            Ok(ImportedDocument {
                elements: elements_from_values(values),
                app_state,
            })
        }
        Value::Null => Err(TransferError::NotADrawing("null")),
        Value::Bool(_) => Err(TransferError::NotADrawing("a boolean")),
        Value::Number(_) => Err(TransferError::NotADrawing("a number")),
        Value::String(_) => Err(TransferError::NotADrawing("a string")),
    }
}
