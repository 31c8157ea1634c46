//! Configuration for the folio binary.
//!
//! Values are layered, later sources winning:
//! 1. Built-in defaults.
//! 2. `folio.{toml,yaml,yml,json}` in the platform config directory.
//! 3. An explicit file passed on the command line.
//! 4. `FOLIO_` environment variables, with `__` separating nested keys
//!    (`FOLIO_WORKER__FETCH_CONCURRENCY=4`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use folio_cache::{DEFAULT_CORE_FILES, DEFAULT_FETCH_CONCURRENCY, DEFAULT_RESPONSE_TIMEOUT, IMAGE_SEGMENT, WorkerConfig};
use folio_offline::{
    CONSTRAINED_READINESS_TIMEOUT, CatalogConfig, CoordinatorConfig, DEFAULT_PROBE_CONCURRENCY, DEFAULT_PROBE_PAGES,
    DEFAULT_READINESS_TIMEOUT, DEFAULT_RECONNECT_CHECK_DELAY, DEFAULT_UPDATE_COOLDOWN,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "FOLIO_";
const CONFIG_STEM: &str = "folio";
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the application shell, manuals and `version.json` are published.
    pub base_url: String,
    /// Root for cache storage and local state.
    pub data_dir: PathBuf,
    pub worker: WorkerSettings,
    pub coordinator: CoordinatorSettings,
    pub catalog: CatalogSettings,
    /// Known manuals. Page counts bound image probing when a manual's search
    /// index is unavailable.
    pub manuals: Vec<ManualEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub fetch_concurrency: usize,
    pub response_timeout_secs: u64,
    pub core_files: Vec<String>,
    pub image_segment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub readiness_timeout_secs: u64,
    pub constrained_readiness_timeout_secs: u64,
    pub constrained_platform: bool,
    pub update_cooldown_secs: u64,
    pub reconnect_check_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub default_probe_pages: u32,
    pub probe_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            data_dir: default_data_dir(),
            worker: WorkerSettings::default(),
            coordinator: CoordinatorSettings::default(),
            catalog: CatalogSettings::default(),
            manuals: Vec::new(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT.as_secs(),
            core_files: DEFAULT_CORE_FILES.iter().map(|f| f.to_string()).collect(),
            image_segment: IMAGE_SEGMENT.to_string(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT.as_secs(),
            constrained_readiness_timeout_secs: CONSTRAINED_READINESS_TIMEOUT.as_secs(),
            constrained_platform: false,
            update_cooldown_secs: DEFAULT_UPDATE_COOLDOWN.as_secs(),
            reconnect_check_delay_secs: DEFAULT_RECONNECT_CHECK_DELAY.as_secs(),
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            default_probe_pages: DEFAULT_PROBE_PAGES,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", CONFIG_STEM)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(CONFIG_STEM))
}

/// Pick the figment provider matching a file's extension.
fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let figment = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(figment)
}

impl Config {
    /// Load and validate configuration from every layer.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = ProjectDirs::from("", "", CONFIG_STEM) {
            for ext in CONFIG_EXTENSIONS {
                let path = dirs.config_dir().join(format!("{CONFIG_STEM}.{ext}"));
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "Using config file");
                    figment = file_provider(figment, &path)?;
                }
            }
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = file_provider(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason| exn::Exn::from(ErrorKind::Invalid { field, reason });
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url", "must not be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(invalid("base_url", "must be an http(s) URL"));
        }
        if !self.data_dir.is_absolute() {
            return Err(invalid("data_dir", "must be an absolute path"));
        }
        if self.worker.fetch_concurrency == 0 {
            return Err(invalid("worker.fetch_concurrency", "must be at least 1"));
        }
        if self.worker.response_timeout_secs == 0 {
            return Err(invalid("worker.response_timeout_secs", "must be at least 1"));
        }
        if self.coordinator.readiness_timeout_secs == 0 || self.coordinator.constrained_readiness_timeout_secs == 0 {
            return Err(invalid("coordinator.readiness_timeout_secs", "must be at least 1"));
        }
        if self.catalog.probe_concurrency == 0 {
            return Err(invalid("catalog.probe_concurrency", "must be at least 1"));
        }
        let mut ids: Vec<&str> = self.manuals.iter().map(|manual| manual.id.as_str()).collect();
        ids.sort_unstable();
        if ids.iter().any(|id| id.is_empty()) {
            return Err(invalid("manuals", "manual ids must not be empty"));
        }
        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(invalid("manuals", "manual ids must be unique"));
        }
        Ok(())
    }

    pub fn manual(&self, id: &str) -> Option<&ManualEntry> {
        self.manuals.iter().find(|manual| manual.id == id)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("caches")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            core_files: self.worker.core_files.clone(),
            fetch_concurrency: self.worker.fetch_concurrency,
            response_timeout: Duration::from_secs(self.worker.response_timeout_secs),
            image_segment: self.worker.image_segment.clone(),
            ..WorkerConfig::default()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let settings = &self.coordinator;
        CoordinatorConfig {
            readiness_timeout: Duration::from_secs(settings.readiness_timeout_secs),
            constrained_readiness_timeout: Duration::from_secs(settings.constrained_readiness_timeout_secs),
            constrained_platform: settings.constrained_platform,
            update_cooldown: Duration::from_secs(settings.update_cooldown_secs),
            reconnect_check_delay: Duration::from_secs(settings.reconnect_check_delay_secs),
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            default_probe_pages: self.catalog.default_probe_pages,
            probe_pages: self
                .manuals
                .iter()
                .filter_map(|manual| Some((manual.id.clone(), manual.pages?)))
                .collect(),
            probe_concurrency: self.catalog.probe_concurrency,
        }
    }
}
