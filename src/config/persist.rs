//! Settings persistence using toml_edit to preserve formatting and comments.

use super::Settings;
use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::DocumentMut;

/// Write settings to `path`.
///
/// When the file already exists, only the keys we own are replaced so that
/// comments and unrelated keys survive.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let new_content =
        toml::to_string_pretty(settings).with_context(|| "Failed to serialize settings")?;
    let new_doc: DocumentMut = new_content
        .parse()
        .with_context(|| "Failed to parse serialized settings")?;

    let mut doc: DocumentMut = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?
            .parse()
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?
    } else {
        DocumentMut::new()
    };

    for (key, item) in new_doc.iter() {
        doc[key] = item.clone();
    }
    // Drop keys that serialize to nothing (e.g. an emptied extension list).
    let stale: Vec<String> = doc
        .iter()
        .filter(|(key, item)| new_doc.get(key).is_none() && is_settings_key(key) && !item.is_none())
        .map(|(key, _)| key.to_string())
        .collect();
    for key in stale {
        doc.remove(&key);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }
    std::fs::write(path, doc.to_string())
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    Ok(())
}

fn is_settings_key(key: &str) -> bool {
    matches!(
        key,
        "output_path"
            | "hot_folder_enabled"
            | "hot_folder_path"
            | "notifications_enabled"
            | "hot_folder_extensions"
            | "default_profile"
    )
}
