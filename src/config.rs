//! Configuration module for the embedding index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SEMSPACE_` and use double
//! underscores to separate nested levels:
//! - `SEMSPACE_SEARCH__GROWTH_FACTOR=5` sets `search.growth_factor`
//! - `SEMSPACE_FEDERATION__DEFAULT_K=20` sets `federation.default_k`
//! - `SEMSPACE_EMBEDDING__USE_MOCK=true` sets `embedding.use_mock`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndexError, IndexResult};
use crate::vector::{BitWidth, MAX_KEY_BITS, ReducedDimensions, ReductionStrategy};

const ENV_PREFIX: &str = "SEMSPACE_";
const CONFIG_DIR: &str = ".semspace";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the store snapshot and model cache
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// How new collections reduce and quantize embeddings
    #[serde(default)]
    pub index: IndexConfig,

    /// Neighbor search tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// Cross-collection search
    #[serde(default)]
    pub federation: FederationConfig,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Number of reduced dimensions (D), 2..=8
    #[serde(default = "default_reduced_dimensions")]
    pub reduced_dimensions: usize,

    /// Bits per reduced dimension (B), 1..=16
    #[serde(default = "default_bit_width")]
    pub bit_width: u32,

    /// Reduction strategy recorded on every new collection
    #[serde(default)]
    pub reduction: ReductionStrategy,

    /// Maximum number of vectors sampled to fit quantization bounds
    #[serde(default = "default_fit_sample_size")]
    pub fit_sample_size: usize,

    /// Widening applied to degenerate bounds
    #[serde(default = "default_fit_epsilon")]
    pub fit_epsilon: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Initial radius is `max(1, keyspace >> initial_radius_shift)`
    #[serde(default = "default_initial_radius_shift")]
    pub initial_radius_shift: u32,

    /// Radius multiplier per widening, 4..=5
    #[serde(default = "default_growth_factor")]
    pub growth_factor: u32,

    /// Maximum number of widenings before giving up on reaching k
    #[serde(default = "default_max_widenings")]
    pub max_widenings: u32,

    /// Lower bound on the scan limit
    #[serde(default = "default_min_scan_limit")]
    pub min_scan_limit: usize,

    /// Scan limit is `max(k * candidate_multiplier, min_scan_limit)`
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FederationConfig {
    /// Results returned when the caller does not ask for a count
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Fewer responding collections marks the response partial
    #[serde(default = "default_min_collections")]
    pub min_collections: usize,

    /// Per-collection timeout in milliseconds
    #[serde(default = "default_collection_timeout_ms")]
    pub collection_timeout_ms: u64,

    /// Peak extra boost for a just-touched collection
    #[serde(default = "default_freshness_amplitude")]
    pub freshness_amplitude: f32,

    /// Decay constant of the freshness boost, in days
    #[serde(default = "default_freshness_decay_days")]
    pub freshness_decay_days: f32,

    /// Maximum collections searched at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Timeout for one embedding call in milliseconds
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    /// Placeholder dimension when no model can be loaded
    #[serde(default = "default_fallback_dimension")]
    pub fallback_dimension: usize,

    /// Use the deterministic hash generator instead of loading a model
    #[serde(default = "default_false")]
    pub use_mock: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_path() -> PathBuf {
    PathBuf::from(".semspace/data")
}
fn default_false() -> bool {
    false
}
fn default_reduced_dimensions() -> usize {
    4
}
fn default_bit_width() -> u32 {
    8
}
fn default_fit_sample_size() -> usize {
    1024
}
fn default_fit_epsilon() -> f32 {
    crate::vector::DEFAULT_FIT_EPSILON
}
fn default_initial_radius_shift() -> u32 {
    8
}
fn default_growth_factor() -> u32 {
    4
}
fn default_max_widenings() -> u32 {
    3
}
fn default_min_scan_limit() -> usize {
    50
}
fn default_candidate_multiplier() -> usize {
    4
}
fn default_k() -> usize {
    10
}
fn default_min_collections() -> usize {
    1
}
fn default_collection_timeout_ms() -> u64 {
    2000
}
fn default_freshness_amplitude() -> f32 {
    0.2
}
fn default_freshness_decay_days() -> f32 {
    30.0
}
fn default_max_concurrency() -> usize {
    num_cpus::get()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_embedding_timeout_ms() -> u64 {
    5000
}
fn default_fallback_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_path: default_data_path(),
            debug: false,
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            federation: FederationConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            reduced_dimensions: default_reduced_dimensions(),
            bit_width: default_bit_width(),
            reduction: ReductionStrategy::default(),
            fit_sample_size: default_fit_sample_size(),
            fit_epsilon: default_fit_epsilon(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_radius_shift: default_initial_radius_shift(),
            growth_factor: default_growth_factor(),
            max_widenings: default_max_widenings(),
            min_scan_limit: default_min_scan_limit(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            min_collections: default_min_collections(),
            collection_timeout_ms: default_collection_timeout_ms(),
            freshness_amplitude: default_freshness_amplitude(),
            freshness_decay_days: default_freshness_decay_days(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            timeout_ms: default_embedding_timeout_ms(),
            fallback_dimension: default_fallback_dimension(),
            use_mock: false,
        }
    }
}

impl IndexConfig {
    pub fn dims(&self) -> IndexResult<ReducedDimensions> {
        Ok(ReducedDimensions::new(self.reduced_dimensions)?)
    }

    pub fn bits(&self) -> IndexResult<BitWidth> {
        Ok(BitWidth::new(self.bit_width)?)
    }
}

impl FederationConfig {
    #[must_use]
    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .semspace directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Rejects combinations the index cannot work with.
    pub fn validate(&self) -> IndexResult<()> {
        let dims = self.index.dims()?;
        let bits = self.index.bits()?;
        if dims.get() as u32 * bits.get() > MAX_KEY_BITS {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "reduced_dimensions x bit_width must not exceed {MAX_KEY_BITS} bits"
                ),
            });
        }
        if !(4..=5).contains(&self.search.growth_factor) {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "search.growth_factor must be 4 or 5, got {}",
                    self.search.growth_factor
                ),
            });
        }
        if self.index.fit_sample_size == 0 {
            return Err(IndexError::ConfigError {
                reason: "index.fit_sample_size must be at least 1".to_string(),
            });
        }
        if self.federation.freshness_decay_days <= 0.0 {
            return Err(IndexError::ConfigError {
                reason: "federation.freshness_decay_days must be positive".to_string(),
            });
        }
        if self.federation.max_concurrency == 0 {
            return Err(IndexError::ConfigError {
                reason: "federation.max_concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the store snapshot inside `data_path`
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path.join("store.bin")
    }

    /// Directory where downloaded embedding models are cached
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.data_path.join("models")
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_at(Path::new("."), force)
    }

    /// Create the settings template under `root/.semspace`
    pub fn init_config_file_at(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# semspace configuration file

# Version of the configuration schema
version = 1

# Directory holding the store snapshot and the model cache
data_path = ".semspace/data"

# Global debug mode
debug = false

[index]
# Reduced dimensions per embedding (2 to 8)
reduced_dimensions = 4

# Bits per reduced dimension (1 to 16); dimensions x bits must be <= 128
bit_width = 8

# "block_average" or "truncate"; fixed per collection at creation
reduction = "block_average"

# Vectors sampled when fitting quantization bounds
fit_sample_size = 1024

[search]
# Initial scan radius is keyspace >> initial_radius_shift
initial_radius_shift = 8

# Radius multiplier per widening (4 or 5)
growth_factor = 4

max_widenings = 3
min_scan_limit = 50
candidate_multiplier = 4

[federation]
default_k = 10

# Fewer responding collections marks a response as partial
min_collections = 1

collection_timeout_ms = 2000
freshness_amplitude = 0.2
freshness_decay_days = 30.0

# Collections searched concurrently (defaults to CPU count)
# max_concurrency = {}

[embedding]
model = "AllMiniLML6V2"
timeout_ms = 5000
fallback_dimension = 384

# Deterministic hash embeddings instead of a downloaded model
use_mock = false
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.data_path, PathBuf::from(".semspace/data"));
        assert_eq!(settings.index.reduced_dimensions, 4);
        assert_eq!(settings.index.reduction, ReductionStrategy::BlockAverage);
        assert_eq!(settings.search.growth_factor, 4);
        assert_eq!(settings.federation.default_k, 10);
        assert!(settings.federation.max_concurrency > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[index]
reduced_dimensions = 2
bit_width = 4
reduction = "truncate"

[federation]
freshness_amplitude = 0.5
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.index.reduced_dimensions, 2);
        assert_eq!(settings.index.bit_width, 4);
        assert_eq!(settings.index.reduction, ReductionStrategy::Truncate);
        assert_eq!(settings.federation.freshness_amplitude, 0.5);
        // Untouched sections keep defaults
        assert_eq!(settings.search.min_scan_limit, 50);
        assert_eq!(settings.embedding.timeout_ms, 5000);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.index.bit_width = 12;
        settings.embedding.use_mock = true;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.index.bit_width, 12);
        assert!(loaded.embedding.use_mock);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(
            &config_path,
            "[search]\nmax_widenings = 2\ncandidate_multiplier = 6\n",
        )
        .unwrap();

        unsafe {
            std::env::set_var("SEMSPACE_SEARCH__MAX_WIDENINGS", "7");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        // Environment variable overrides the file
        assert_eq!(settings.search.max_widenings, 7);
        // File value is used when no env var is set
        assert_eq!(settings.search.candidate_multiplier, 6);

        unsafe {
            std::env::remove_var("SEMSPACE_SEARCH__MAX_WIDENINGS");
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.index.reduced_dimensions = 9;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.index.bit_width = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.search.growth_factor = 2;
        assert!(matches!(
            settings.validate(),
            Err(IndexError::ConfigError { .. })
        ));

        let mut settings = Settings::default();
        settings.index.reduced_dimensions = 8;
        settings.index.bit_width = 16;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_init_config_file_template_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_at(temp_dir.path(), false).unwrap();
        assert!(path.exists());

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert_eq!(parsed.index.bit_width, 8);
        assert!(parsed.validate().is_ok());

        // Second init without force refuses to overwrite
        assert!(Settings::init_config_file_at(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_at(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_derived_paths() {
        let settings = Settings::default();
        assert_eq!(
            settings.snapshot_path(),
            PathBuf::from(".semspace/data/store.bin")
        );
        assert_eq!(settings.models_dir(), PathBuf::from(".semspace/data/models"));
        assert_eq!(
            settings.federation.collection_timeout(),
            Duration::from_millis(2000)
        );
    }
}
