//! Point-in-time settings snapshot carried inside a refresh job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The settings a single scan/upload pass runs with.
///
/// A client captures this when the user requests a refresh; the daemon uses
/// the snapshot as-is so a pass is unaffected by settings edits made while
/// it is running. Persistence of the settings themselves lives outside this
/// crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    #[serde(default)]
    pub instrument_name: String,
    #[serde(default)]
    pub facility_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_email: String,
    /// Base URL of the server uploads are verified against.
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_key: String,
    /// Root directory scanned for user/group folders.
    #[serde(default)]
    pub data_directory: PathBuf,
    #[serde(default)]
    pub ignore_old_datasets: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_snapshot_fills_defaults() {
        let snapshot: SettingsSnapshot =
            serde_json::from_str(r#"{"instrument_name":"Microscope #1"}"#).unwrap();
        assert_eq!(snapshot.instrument_name, "Microscope #1");
        assert_eq!(snapshot.data_directory, PathBuf::new());
        assert!(!snapshot.ignore_old_datasets);
    }
}
