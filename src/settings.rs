use std::path::{Path, PathBuf};

use crate::config::InspectionConfig;

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("diffinspect")
        .join("settings.json")
}

pub fn save_settings(config: &InspectionConfig) -> anyhow::Result<()> {
    save_settings_to(config, &settings_path())
}

pub fn save_settings_to(config: &InspectionConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;

    log::info!("Settings saved to: {}", path.display());
    Ok(())
}

pub fn load_settings() -> InspectionConfig {
    load_settings_from(&settings_path())
}

/// Read settings, falling back to defaults when the file is missing, unreadable
/// or fails validation.
pub fn load_settings_from(path: &Path) -> InspectionConfig {
    if !path.exists() {
        log::info!("No settings file found. Using defaults.");
        return InspectionConfig::default();
    }

    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("Failed to read settings file: {}. Using defaults.", e);
            return InspectionConfig::default();
        }
    };

    match serde_json::from_str::<InspectionConfig>(&json) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                log::info!("Settings loaded from: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Rejected settings file: {}. Using defaults.", e);
                InspectionConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to parse settings file: {}. Using defaults.", e);
            InspectionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridStrategy;

    #[test]
    fn test_save_then_load() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("diffinspect_test_settings");
        let path = dir.join("settings.json");
        let mut config = InspectionConfig::default();
        config.scan.defect_threshold = 70;
        config.scan.grid = GridStrategy::FixedCellCount { per_axis: 6 };

        save_settings_to(&config, &path)?;
        let loaded = load_settings_from(&path);

        assert_eq!(loaded.scan.defect_threshold, 70);
        assert_eq!(loaded.scan.grid, GridStrategy::FixedCellCount { per_axis: 6 });
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join("diffinspect_test_settings_garbage");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        std::fs::write(&path, "{ not json")?;

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.scan.defect_threshold, 85);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
