use std::fmt;

use crate::model::CanvasId;

/// Machine-readable error codes for scripted callers of `drw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    CanvasNotFound,
    ProjectNotFound,
    AmbiguousId,
    NoCanvasOpen,
    HostReadFailed,
    HostWriteFailed,
    StoreWriteFailed,
    StoreUnavailable,
    InvalidImport,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::CanvasNotFound => "E2001",
            Self::ProjectNotFound => "E2002",
            Self::AmbiguousId => "E2004",
            Self::NoCanvasOpen => "E2006",
            Self::HostReadFailed => "E4001",
            Self::HostWriteFailed => "E4002",
            Self::StoreWriteFailed => "E5001",
            Self::StoreUnavailable => "E5003",
            Self::InvalidImport => "E6003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::CanvasNotFound => "Canvas not found",
            Self::ProjectNotFound => "Project not found",
            Self::AmbiguousId => "Ambiguous canvas or project ID",
            Self::NoCanvasOpen => "No canvas is open",
            Self::HostReadFailed => "Host storage read failed",
            Self::HostWriteFailed => "Host storage write failed",
            Self::StoreWriteFailed => "Entity store write failed",
            Self::StoreUnavailable => "Entity store unavailable",
            Self::InvalidImport => "Import file is not a drawing",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in drawer/config.toml and retry."),
            Self::CanvasNotFound | Self::ProjectNotFound => Some("Run `drw list` to see IDs."),
            Self::AmbiguousId => Some("Use a longer ID prefix to disambiguate."),
            Self::NoCanvasOpen => Some("Run `drw open <canvas>` first."),
            Self::HostReadFailed => None,
            Self::HostWriteFailed => Some("Check that the host directory is writable."),
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::StoreUnavailable => {
                Some("Changes are kept in memory only. Check the store path and permissions.")
            }
            Self::InvalidImport => Some("Import an .excalidraw file or a JSON element array."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures surfaced by the sync engine and the commit handler.
///
/// Transient host read failures and benign selection races never reach this
/// type: reads degrade to "no document" and races become skip outcomes.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Writing the normalized document into host storage failed.
    #[error("failed to write canvas {canvas_id} into host storage: {source}")]
    HostWrite {
        canvas_id: CanvasId,
        #[source]
        source: crate::host::HostError,
    },

    /// The entity store rejected a durable write.
    #[error("failed to persist canvas {canvas_id}: {source}")]
    Persistence {
        canvas_id: CanvasId,
        #[source]
        source: crate::store::StoreError,
    },

    /// The canvas to operate on does not exist.
    #[error("canvas {0} not found")]
    CanvasNotFound(CanvasId),

    /// An operation needed an open canvas and none is selected.
    #[error("no canvas is open")]
    NoCanvasOpen,
}

impl SyncError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::HostWrite { .. } => ErrorCode::HostWriteFailed,
            Self::Persistence { .. } => ErrorCode::StoreWriteFailed,
            Self::CanvasNotFound(_) => ErrorCode::CanvasNotFound,
            Self::NoCanvasOpen => ErrorCode::NoCanvasOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::CanvasNotFound,
            ErrorCode::ProjectNotFound,
            ErrorCode::AmbiguousId,
            ErrorCode::NoCanvasOpen,
            ErrorCode::HostReadFailed,
            ErrorCode::HostWriteFailed,
            ErrorCode::StoreWriteFailed,
            ErrorCode::StoreUnavailable,
            ErrorCode::InvalidImport,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::StoreWriteFailed.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
