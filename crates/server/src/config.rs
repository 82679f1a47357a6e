use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use portal::PortalSettings;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub prefix: String,
    pub title: String,
    pub templates_dir: Option<PathBuf>,
    pub render_timeout_ms: u64,
    pub event_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4444".into(),
            prefix: "/".into(),
            title: "Portal".into(),
            templates_dir: None,
            render_timeout_ms: 10_000,
            event_timeout_ms: 10_000,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.prefix.starts_with('/') {
            bail!("prefix `{}` must start with `/`", self.prefix);
        }
        if self.prefix.len() > 1 && self.prefix.ends_with('/') {
            bail!("prefix `{}` must not end with `/`", self.prefix);
        }
        if self.render_timeout_ms == 0 || self.event_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }

    pub fn portal_settings(&self) -> PortalSettings {
        let settings = PortalSettings {
            prefix: self.prefix.clone(),
            title: self.title.clone(),
            render_timeout: Duration::from_millis(self.render_timeout_ms),
            event_timeout: Duration::from_millis(self.event_timeout_ms),
            ..PortalSettings::default()
        };
        match &self.templates_dir {
            Some(dir) => settings.with_templates_override(dir.clone()),
            None => settings,
        }
    }

    /// Applies overrides from `lookup`, usually the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PORTAL_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("APP__BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("PORTAL_PREFIX") {
            self.prefix = v;
        }
        if let Some(v) = lookup("PORTAL_TITLE") {
            self.title = v;
        }
        if let Some(v) = lookup("PORTAL_TEMPLATES_DIR") {
            self.templates_dir = Some(PathBuf::from(v));
        }
        if let Some(parsed) = lookup("PORTAL_RENDER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.render_timeout_ms = parsed;
        }
        if let Some(parsed) = lookup("PORTAL_EVENT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.event_timeout_ms = parsed;
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

/// Defaults, then the settings file, then the environment.
///
/// An explicitly named file must exist; the default `portal.toml` is optional.
pub fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match config {
        Some(path) => read_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
        None => Settings::default(),
    };
    settings.apply_env(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
