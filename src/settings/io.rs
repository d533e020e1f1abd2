// src/settings/io.rs
use bevy::log::{debug, error, info};
use directories_next::ProjectDirs;
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use super::SettingsError;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "JobSheet";
const APPLICATION: &str = "JobSheet";
const CONFIG_FILE: &str = "app_settings.json";

pub fn get_config_path() -> Result<PathBuf, SettingsError> {
    let proj_dirs =
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or(SettingsError::NoConfigDir)?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;
    Ok(config_dir.join(CONFIG_FILE))
}

pub fn load_settings_from_file<T: for<'de> serde::de::Deserialize<'de> + Default>() -> Result<T, SettingsError> {
    load_settings_from_path(&get_config_path()?)
}

/// Missing file yields defaults; an unreadable or corrupt file is an error.
pub fn load_settings_from_path<T: for<'de> serde::de::Deserialize<'de> + Default>(
    config_file: &Path,
) -> Result<T, SettingsError> {
    info!("AppSettings: Attempting to load settings from {:?}", config_file);
    match fs::File::open(config_file) {
        Ok(file) => {
            let reader = BufReader::new(file);
            let settings = serde_json::from_reader(reader).map_err(|e| {
                error!("AppSettings: Failed to parse settings file {:?}: {}", config_file, e);
                e
            })?;
            info!("AppSettings: Successfully deserialized settings.");
            Ok(settings)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("AppSettings: Settings file not found at {:?}. Returning default.", config_file);
            Ok(Default::default())
        }
        Err(e) => {
            error!("AppSettings: Failed to open settings file {:?}: {}", config_file, e);
            Err(e.into())
        }
    }
}

pub fn save_settings_to_file<T: serde::Serialize>(settings: &T) -> Result<(), SettingsError> {
    save_settings_to_path(settings, &get_config_path()?)
}

pub fn save_settings_to_path<T: serde::Serialize>(settings: &T, config_file: &Path) -> Result<(), SettingsError> {
    info!("AppSettings: Saving settings to {:?}", config_file);
    let file = fs::File::create(config_file)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, settings).map_err(|e| {
        error!("AppSettings: Failed to serialize settings to {:?}: {}", config_file, e);
        e
    })?;
    debug!("AppSettings: settings written.");
    Ok(())
}

/// Loads settings, falling back to defaults (with an error log) when the
/// stored file cannot be used.
pub fn load_or_default() -> super::AppSettings {
    match load_settings_from_file() {
        Ok(settings) => settings,
        Err(e) => {
            error!("AppSettings: using defaults: {}", e);
            super::AppSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppSettings;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: AppSettings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn saved_pointer_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut settings = AppSettings::default();
        settings.last_used_file = Some(dir.path().join("jobs.csv"));
        save_settings_to_path(&settings, &path).unwrap();
        let loaded: AppSettings = load_settings_from_path(&path).unwrap();
        assert_eq!(loaded.last_used_file, settings.last_used_file);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();
        let loaded: Result<AppSettings, _> = load_settings_from_path(&path);
        assert!(matches!(loaded, Err(SettingsError::Parse(_))));
    }
}
