//! Loading and comment-preserving persistence of `config.toml`.

use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};

const CONFIG_DIR_NAME: &str = "castwatch";
const CONFIG_FILE_NAME: &str = "config.toml";

/// `<platform config dir>/castwatch/config.toml`, or `None` when the platform has no config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Reads the config at `path`, writing defaults first if the file does not exist.
/// Unreadable or invalid files fall back to defaults. Out-of-range values are
/// clamped and written back, keeping the file's comments.
pub fn load_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create config dir {}: {}", parent.display(), err);
            }
        }
        persist_config_file(&Config::default(), path);
        return Config::default();
    }

    let config_text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("Failed to read config {}: {}. Using defaults.", path.display(), err);
            return Config::default();
        }
    };
    match toml::from_str::<Config>(&config_text) {
        Ok(config) => {
            let sanitized = sanitize_config(config.clone());
            if sanitized != config {
                info!(
                    "Config {} had out-of-range values. Writing sanitized values back.",
                    path.display()
                );
                persist_config_file(&sanitized, path);
            }
            sanitized
        }
        Err(err) => {
            warn!("Failed to parse config {}: {}. Using defaults.", path.display(), err);
            Config::default()
        }
    }
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

/// Writes every value of `source` into `destination`, leaving untouched keys,
/// comments and unknown sections alone.
fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    for (key, source_item) in source.iter() {
        if let Item::Table(source_table) = source_item {
            if !destination.get(key).is_some_and(Item::is_table) {
                destination.insert(key, Item::Table(Table::new()));
            }
            if let Some(destination_table) = destination.get_mut(key).and_then(Item::as_table_mut) {
                merge_table_with_targeted_updates(destination_table, source_table);
            }
            continue;
        }
        set_table_value_preserving_decor(destination, key, source_item.clone());
    }
}

pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let next_config_text = toml::to_string(config)
        .map_err(|err| format!("failed to serialize config to TOML: {}", err))?;
    let next_document = next_config_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse serialized config TOML document: {}", err))?;
    let mut existing_document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;

    merge_table_with_targeted_updates(existing_document.as_table_mut(), next_document.as_table());
    Ok(existing_document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}
