//! Settings snapshot loading for the CLI.

use std::path::Path;

use anyhow::Context;
use harvester_protocol::SettingsSnapshot;

/// Load the snapshot a refresh runs with. No path means defaults; the
/// settings file format belongs to the GUI and is only read here, never
/// written.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<SettingsSnapshot> {
    let Some(path) = path else {
        return Ok(SettingsSnapshot::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing settings from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_partial_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "instrument_name = \"Microscope #1\"\ndata_directory = \"/data/instrument1\""
        )
        .unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.instrument_name, "Microscope #1");
        assert_eq!(
            settings.data_directory,
            std::path::PathBuf::from("/data/instrument1")
        );
        assert_eq!(settings.server_url, "");
    }

    #[test]
    fn no_path_means_defaults() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings, SettingsSnapshot::default());
    }
}
