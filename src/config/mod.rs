pub mod persist;
mod source;
mod types;

pub use source::*;
pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use transcode_common::FormatProfile;

/// Load settings from a TOML file
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;

    let mut settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

    settings.expand_paths();
    settings.default_profile.bitrate =
        FormatProfile::normalize_bitrate(&settings.default_profile.bitrate);
    validate_settings(&settings)?;

    Ok(settings)
}

/// Settings file locations searched when no path is given, in order.
pub const DEFAULT_SETTINGS_PATHS: [&str; 2] = [
    "./transcode-queue.toml",
    "~/.config/transcode-queue/config.toml",
];

/// The settings file that would be loaded, if any.
///
/// An explicit path is returned as is, even if it does not exist.
pub fn resolve_settings_path(custom_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = custom_path {
        return Some(path.to_path_buf());
    }

    DEFAULT_SETTINGS_PATHS
        .iter()
        .map(|path_str| PathBuf::from(shellexpand::tilde(path_str).as_ref()))
        .find(|path| path.exists())
}

/// Load settings from default locations or return default settings
pub fn load_settings_or_default(custom_path: Option<&Path>) -> Result<Settings> {
    match resolve_settings_path(custom_path) {
        Some(path) => load_settings(&path),
        None => Ok(Settings::default()),
    }
}

/// Validate settings
fn validate_settings(settings: &Settings) -> Result<()> {
    settings
        .default_profile
        .validate()
        .context("Invalid default profile")?;

    if settings.hot_folder_enabled {
        if settings.hot_folder_path.as_os_str().is_empty() {
            anyhow::bail!("Hot folder is enabled but no hot_folder_path is set");
        }
        if !settings.hot_folder_path.is_dir() {
            tracing::warn!("Hot folder does not exist yet: {:?}", settings.hot_folder_path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("transcode-queue.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_settings() {
        let dir = tempfile::tempdir().unwrap();
        let hot = dir.path().join("incoming");
        std::fs::create_dir(&hot).unwrap();
        let path = write(
            &dir,
            &format!(
                r#"
output_path = "/srv/converted"
hot_folder_enabled = true
hot_folder_path = "{}"
notifications_enabled = true

[default_profile]
format = ".mkv"
bitrate = "2M"
fps = 25
"#,
                hot.display()
            ),
        );

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.output_path, PathBuf::from("/srv/converted"));
        assert_eq!(settings.hot_folder_path, hot);
        assert!(settings.notifications_enabled);
        assert_eq!(settings.default_profile.normalized_format(), "mkv");
        assert_eq!(settings.default_profile.fps, 25);
    }

    #[test]
    fn test_bare_number_bitrate_is_megabits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[default_profile]\nbitrate = \" 8 \"\n");
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.default_profile.bitrate, "8M");
    }

    #[test]
    fn test_invalid_bitrate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[default_profile]\nbitrate = \"fast\"\n");
        let err = load_settings(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bitrate"));
    }

    #[test]
    fn test_enabled_hot_folder_requires_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "hot_folder_enabled = true\n");
        assert!(load_settings(&path).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let custom = Path::new("/etc/custom.toml");
        assert_eq!(resolve_settings_path(Some(custom)), Some(custom.to_path_buf()));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_settings_or_default(Some(&missing)).is_err());
    }
}
