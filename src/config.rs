//! Viewer configuration: built-in defaults merged with a user TOML file.

use std::path::{Path, PathBuf};

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

/// Manages the config directory and config file operations.
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing).
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name.
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Write the default configuration to `config.toml` so users have a file
    /// to edit. Refuses to clobber an existing file unless forced.
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");
        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use force to overwrite.",
                config_path.display()
            ));
        }
        self.ensure_config_dir()?;
        let toml_str = toml::to_string_pretty(&ViewerConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        std::fs::write(&config_path, toml_str)?;
        Ok(config_path)
    }
}

/// Complete viewer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Configuration format version (for future compatibility).
    pub version: String,
    pub data: DataConfig,
    pub sampling: SamplingConfig,
    pub http: HttpConfig,
    pub cloud: CloudConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Embedding names probed under `obsm/`, in catalog order.
    pub embeddings: Vec<String>,
    /// Columns always treated as numeric, overriding declared encodings.
    /// Covers datasets whose writers tag measurement columns as categorical.
    pub known_numeric: Vec<String>,
    /// Maximum dimensions taken from a plain 2D embedding array.
    pub max_embedding_dims: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Fraction of the visible set drawn each recompute, in (0, 1].
    pub fraction: f64,
    /// Hard cap on drawn points regardless of fraction.
    pub cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for chunk fetches over HTTP(S).
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CloudConfig {
    /// Custom endpoint for S3-compatible storage (e.g. MinIO). Example: "http://localhost:9000"
    pub s3_endpoint_url: Option<String>,
    /// Access key for S3-compatible backends when not using env / AWS config
    pub s3_access_key_id: Option<String>,
    /// Secret key for S3-compatible backends when not using env / AWS config
    pub s3_secret_access_key: Option<String>,
    /// Region (e.g. us-east-1). Often required when using a custom endpoint.
    pub s3_region: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            data: DataConfig::default(),
            sampling: SamplingConfig::default(),
            http: HttpConfig::default(),
            cloud: CloudConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            embeddings: [
                "Global_Spatial",
                "X_spatial",
                "spatial",
                "X_umap",
                "X_tsne",
                "X_pca",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            known_numeric: ["volume", "center_x", "center_y", "min_x", "max_x", "min_y", "max_y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_embedding_dims: 20,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fraction: 1.0,
            cap: 500_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

impl ViewerConfig {
    /// Load configuration from all layers (default → user).
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_with(&manager)
    }

    /// Load using an explicit manager (tests point this at a temp dir).
    pub fn load_with(manager: &ConfigManager) -> Result<Self> {
        let mut config = ViewerConfig::default();
        let config_path = manager.config_path("config.toml");
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                eyre!("Failed to read config file at {}: {}", config_path.display(), e)
            })?;
            let user: ViewerConfig = toml::from_str(&content).map_err(|e| {
                eyre!("Failed to parse config file at {}: {}", config_path.display(), e)
            })?;
            config.merge(user);
        }
        config
            .validate()
            .map_err(|e| eyre!("Invalid configuration in {}: {}", config_path.display(), e))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: ViewerConfig) {
        if other.version != ViewerConfig::default().version {
            self.version = other.version;
        }
        self.data.merge(other.data);
        self.sampling.merge(other.sampling);
        self.http.merge(other.http);
        self.cloud.merge(other.cloud);
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }
        if !(self.sampling.fraction > 0.0 && self.sampling.fraction <= 1.0) {
            return Err(eyre!(
                "sampling.fraction must be in (0, 1], got {}",
                self.sampling.fraction
            ));
        }
        if self.sampling.cap == 0 {
            return Err(eyre!("sampling.cap must be greater than 0"));
        }
        if self.http.timeout_seconds == 0 {
            return Err(eyre!("http.timeout_seconds must be greater than 0"));
        }
        if self.data.max_embedding_dims == 0 {
            return Err(eyre!("data.max_embedding_dims must be greater than 0"));
        }
        Ok(())
    }
}

impl DataConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DataConfig::default();
        if other.embeddings != default.embeddings {
            self.embeddings = other.embeddings;
        }
        if other.known_numeric != default.known_numeric {
            self.known_numeric = other.known_numeric;
        }
        if other.max_embedding_dims != default.max_embedding_dims {
            self.max_embedding_dims = other.max_embedding_dims;
        }
    }
}

impl SamplingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = SamplingConfig::default();
        if other.fraction != default.fraction {
            self.fraction = other.fraction;
        }
        if other.cap != default.cap {
            self.cap = other.cap;
        }
    }
}

impl HttpConfig {
    pub fn merge(&mut self, other: Self) {
        let default = HttpConfig::default();
        if other.timeout_seconds != default.timeout_seconds {
            self.timeout_seconds = other.timeout_seconds;
        }
    }
}

impl CloudConfig {
    pub fn merge(&mut self, other: Self) {
        if other.s3_endpoint_url.is_some() {
            self.s3_endpoint_url = other.s3_endpoint_url;
        }
        if other.s3_access_key_id.is_some() {
            self.s3_access_key_id = other.s3_access_key_id;
        }
        if other.s3_secret_access_key.is_some() {
            self.s3_secret_access_key = other.s3_secret_access_key;
        }
        if other.s3_region.is_some() {
            self.s3_region = other.s3_region;
        }
    }
}
