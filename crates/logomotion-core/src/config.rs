use crate::types::{parse_hex_color, Color};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session-wide tunables. Every field has a default, so a partial JSON file is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StudioConfig {
    /// Export frame rate.
    pub fps: u32,
    /// Upper bound on waiting for a background-media seek to complete.
    pub seek_timeout_ms: u64,
    /// Delay between receiving generated code and executing it.
    pub settle_delay_ms: u64,
    /// Scheduler ticks to wait for the mounted scene to become queryable.
    pub settle_attempts: u32,
    /// Duration mismatch above which the truncation notice is raised.
    pub truncation_threshold_ms: f64,
    /// Flat fill behind animation-only exports (`#rrggbb`).
    pub background: String,
    /// Rhai operation budget per script run. `0` disables the limit.
    pub max_script_operations: u64,
    /// Explicit container size; the document's own size is used when absent.
    pub viewport: Option<(u32, u32)>,
    /// Duration given to still images imported as background media.
    pub still_media_ms: u64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            seek_timeout_ms: 2000,
            settle_delay_ms: 500,
            settle_attempts: 5,
            truncation_threshold_ms: 50.0,
            background: "#ffffff".to_string(),
            max_script_operations: 1_000_000,
            viewport: None,
            still_media_ms: 5000,
        }
    }
}

impl StudioConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: StudioConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn background_color(&self) -> Color {
        parse_hex_color(&self.background).unwrap_or(Color::WHITE)
    }

    pub fn frame_delay_ms(&self) -> f64 {
        1000.0 / self.fps.max(1) as f64
    }

    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn still_media_secs(&self) -> f64 {
        self.still_media_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_files_fill_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r##"{{"seek_timeout_ms": 250, "background": "#000000"}}"##).unwrap();
        let config = StudioConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.seek_timeout_ms, 250);
        assert_eq!(config.fps, 30);
        assert_eq!(config.background_color(), Color::BLACK);
    }

    #[test]
    fn frame_delay_matches_fps() {
        let config = StudioConfig::default();
        assert!((config.frame_delay_ms() - 33.333).abs() < 0.001);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(StudioConfig::from_json_file("/definitely/not/here.json").is_err());
    }
}
