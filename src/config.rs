use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Worker pool size. Concurrent high-resolution rasterization is CPU-
    /// and memory-hungry, so keep this small. Set to 1 to fully serialize
    /// backend access.
    pub worker_threads: usize,
    /// Fixed rasterization resolution multiplier, independent of UI zoom.
    pub render_scale: f32,
    /// Bound of the worker-to-control-thread delivery channel.
    pub delivery_capacity: usize,
    /// Reference page width display geometry is normalized against.
    pub base_page_width: f32,
    /// Horizontal padding subtracted from the viewport for fit-to-width.
    pub fit_margins: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            render_scale: 2.0,
            delivery_capacity: 8,
            base_page_width: 800.0,
            fit_margins: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_budget_mb: usize,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget_mb: 512,
            max_entries: 128,
        }
    }
}

impl CacheConfig {
    const MEBIBYTE: usize = 1024 * 1024;

    pub fn memory_budget_bytes(&self) -> usize {
        self.memory_budget_mb.saturating_mul(Self::MEBIBYTE).max(1)
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument(format!(
                "config path is not a regular file: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path).map_err(|source| {
            AppError::io_with_context(source, format!("failed to read config: {}", path.display()))
        })?;
        let parsed = toml::from_str::<Self>(&raw).map_err(|source| {
            AppError::invalid_argument(format!(
                "failed to parse config {}: {source}",
                path.display()
            ))
        })?;
        Ok(parsed.sanitized())
    }

    fn sanitized(mut self) -> Self {
        self.render.worker_threads = self.render.worker_threads.max(1);
        self.render.delivery_capacity = self.render.delivery_capacity.max(1);
        if !self.render.render_scale.is_finite() || self.render.render_scale <= 0.0 {
            self.render.render_scale = RenderConfig::default().render_scale;
        }
        if !self.render.base_page_width.is_finite() || self.render.base_page_width <= 0.0 {
            self.render.base_page_width = RenderConfig::default().base_page_width;
        }
        if !self.render.fit_margins.is_finite() || self.render.fit_margins < 0.0 {
            self.render.fit_margins = RenderConfig::default().fit_margins;
        }
        self.cache.max_entries = self.cache.max_entries.max(1);
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("VELLUM_CONFIG_PATH")
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("vellum").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join("vellum")
                .join("config.toml"),
        );
    }
    if let Some(appdata) = std::env::var_os("APPDATA")
        && !appdata.is_empty()
    {
        return Some(PathBuf::from(appdata).join("vellum").join("config.toml"));
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::test_support::unique_temp_path;

    use super::Config;

    #[test]
    fn load_from_path_returns_defaults_for_missing_file() {
        let missing = unique_temp_path("missing.toml");
        let config = Config::load_from_path(&missing).expect("missing config should fallback");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_path_applies_partial_overrides_and_sanitizes() {
        let path = unique_temp_path("custom.toml");
        fs::write(
            &path,
            r#"
            [render]
            worker_threads = 0
            render_scale = -1.0
            delivery_capacity = 0
            base_page_width = 640.0

            [cache]
            memory_budget_mb = 256
            "#,
        )
        .expect("config file should be written");

        let config = Config::load_from_path(&path).expect("config should parse");
        assert_eq!(config.render.worker_threads, 1);
        assert_eq!(config.render.render_scale, 2.0);
        assert_eq!(config.render.delivery_capacity, 1);
        assert_eq!(config.render.base_page_width, 640.0);
        assert_eq!(config.render.fit_margins, 60.0);
        assert_eq!(config.cache.memory_budget_mb, 256);
        assert_eq!(config.cache.max_entries, 128);

        fs::remove_file(&path).expect("config file should be removed");
    }
}
