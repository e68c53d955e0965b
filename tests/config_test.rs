//! Settings loading tests.

use std::path::PathBuf;
use transcode_queue::config::{self, persist, FileSettings, Settings, SettingsSource};

#[test]
fn init_config_output_loads_back_as_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcode-queue.toml");

    persist::save_settings(&path, &Settings::default()).unwrap();
    let loaded = config::load_settings_or_default(Some(&path)).unwrap();
    assert_eq!(loaded, Settings::default());
}

#[test]
fn file_settings_reflect_live_edits() {
    let dir = tempfile::tempdir().unwrap();
    let hot = dir.path().join("hot");
    std::fs::create_dir(&hot).unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "hot_folder_enabled = false\n").unwrap();

    let source = FileSettings::new(&path);
    assert!(!source.snapshot().hot_folder_enabled);

    std::fs::write(
        &path,
        format!(
            "hot_folder_enabled = true\nhot_folder_path = {:?}\n",
            hot.display().to_string()
        ),
    )
    .unwrap();
    let snapshot = source.snapshot();
    assert!(snapshot.hot_folder_enabled);
    assert_eq!(snapshot.hot_folder_path, hot);
}

#[test]
fn tilde_paths_are_expanded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "output_path = \"~/converted\"\n").unwrap();

    let settings = config::load_settings(&path).unwrap();
    assert!(!settings.output_path.starts_with("~"));
    assert!(settings.output_path.ends_with("converted"));
    assert_ne!(settings.output_path, PathBuf::from("~/converted"));
}

#[test]
fn invalid_default_profile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[default_profile]\nresolution = \"wide\"\n").unwrap();

    let err = config::load_settings(&path).unwrap_err();
    assert!(format!("{err:#}").contains("resolution"));
}
