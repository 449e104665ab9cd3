//! Daemon -> client progress and state notifications.

use serde::{Deserialize, Serialize};

/// Table views in the client GUI that row events address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableId {
    Users,
    Groups,
    Folders,
    Verifications,
    Uploads,
}

/// One notification flowing through the event queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub kind: EventKind,
}

/// The closed set of event kinds clients recognize.
///
/// Row payloads are deliberately opaque JSON: the daemon forwards whatever
/// record the scan subsystem produced and the UI layer owns its shape.
/// Unrecognized tags deserialize as [`EventKind::Unknown`] so a consumer can
/// log and advance past them instead of stalling its cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum EventKind {
    /// Replace the status bar text.
    StatusMessage { message: String },
    /// Tick the scan progress indicator.
    ProgressIncrement {
        scanned: u64,
        total: u64,
        message: String,
    },
    /// Append a row to a named table view.
    RowAdded {
        table: TableId,
        row: serde_json::Value,
    },
    /// Update the status of an existing row in a named table view.
    RowStatusUpdated {
        table: TableId,
        row: serde_json::Value,
    },
    /// Show a modal message dialog.
    ShowMessageDialog {
        title: String,
        message: String,
        icon: String,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_event_round_trips() {
        let event = Event {
            id: 12,
            kind: EventKind::RowAdded {
                table: TableId::Uploads,
                row: json!({"filename": "a.tif", "progress": 0}),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 12);
        match back.kind {
            EventKind::RowAdded { table, row } => {
                assert_eq!(table, TableId::Uploads);
                assert_eq!(row["filename"], "a.tif");
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_deserializes_to_unknown() {
        let json = r#"{"id":5,"kind":{"kind":"SpinnerPulse","payload":null}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(matches!(event.kind, EventKind::Unknown));
    }
}
