use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::input::NudgeStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

pub(crate) const APP_DIR: &str = "thumbstage";
const APP_CONFIG_FILE: &str = "config.json";

/// Editor tuning from `config.json`. Every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub snap_threshold_px: f64,
    pub history_limit: usize,
    pub preview_debounce_ms: u64,
    pub nudge_px: f64,
    pub nudge_coarse_px: f64,
    pub nudge_fine_px: f64,
    pub view_zoom_step: f64,
    pub wheel_zoom_sensitivity: f64,
    pub recent_selection_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_threshold_px: 8.0,
            history_limit: 60,
            preview_debounce_ms: 180,
            nudge_px: 4.0,
            nudge_coarse_px: 12.0,
            nudge_fine_px: 1.0,
            view_zoom_step: 1.25,
            wheel_zoom_sensitivity: 0.0015,
            recent_selection_limit: 10,
        }
    }
}

impl EditorConfig {
    pub fn preview_debounce(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }

    pub fn nudge_distance(&self, step: NudgeStep) -> f64 {
        match step {
            NudgeStep::Default => self.nudge_px,
            NudgeStep::Coarse => self.nudge_coarse_px,
            NudgeStep::Fine => self.nudge_fine_px,
        }
    }

    /// Exponential zoom factor for a wheel delta; scrolling up (negative) zooms in.
    pub fn wheel_zoom_factor(&self, delta_y: f64) -> f64 {
        (-delta_y * self.wheel_zoom_sensitivity).exp()
    }
}

pub fn load_editor_config() -> EditorConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_editor_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_editor_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> EditorConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return EditorConfig::default(),
    };
    if !path.exists() {
        return EditorConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            EditorConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            EditorConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_path_prefers_xdg_config_home() {
        let path = app_config_path(
            "thumbstage",
            "config.json",
            Some(Path::new("/tmp/config-root")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/config-root/thumbstage/config.json")
        );
    }

    #[test]
    fn app_config_path_falls_back_to_home_dot_config() {
        let path = app_config_path("thumbstage", "config.json", None, Some(Path::new("/tmp/home")))
            .expect("path should resolve");

        assert_eq!(path, PathBuf::from("/tmp/home/.config/thumbstage/config.json"));
    }

    #[test]
    fn app_config_path_errors_when_home_missing_and_xdg_unset() {
        let error = app_config_path("thumbstage", "config.json", None, None).unwrap_err();
        assert_eq!(error, ConfigPathError::MissingHomeDirectory);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let config: EditorConfig =
            serde_json::from_str(r#"{"snap_threshold_px": 12}"#).expect("config parses");
        assert_eq!(config.snap_threshold_px, 12.0);
        assert_eq!(config.history_limit, 60);
        assert_eq!(config.preview_debounce(), Duration::from_millis(180));
    }

    #[test]
    fn load_reads_file_under_xdg_root_and_survives_garbage() {
        let root = std::env::temp_dir().join(format!("thumbstage-config-{}", std::process::id()));
        let dir = root.join(APP_DIR);
        std::fs::create_dir_all(&dir).expect("create config dir");

        std::fs::write(dir.join(APP_CONFIG_FILE), r#"{"nudge_px": 6}"#).expect("write config");
        let config = load_editor_config_with(Some(&root), None);
        assert_eq!(config.nudge_distance(NudgeStep::Default), 6.0);

        std::fs::write(dir.join(APP_CONFIG_FILE), "not json").expect("write garbage");
        assert_eq!(load_editor_config_with(Some(&root), None), EditorConfig::default());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn wheel_zoom_factor_is_exponential_and_symmetric() {
        let config = EditorConfig::default();
        let zoom_in = config.wheel_zoom_factor(-100.0);
        let zoom_out = config.wheel_zoom_factor(100.0);
        assert!(zoom_in > 1.0);
        assert!((zoom_in * zoom_out - 1.0).abs() < 1e-12);
    }
}
