// ABOUTME: Reconciliation config loaded once from TOML into immutable typed settings
// ABOUTME: Describes the store, report output, and per-collection key specs and sources

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::engine::{CompareSpec, DedupStrategy, DiffMode, KeySpec, Normalizer};
use crate::extract::SourceFormat;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_OUTPUT_DIR: &str = "reports";

/// Top-level reconciliation config (usually `reconcile.toml`).
///
/// # Examples
///
/// ```
/// # use collection_reconciler::config::ReconcileConfig;
/// let config = ReconcileConfig::from_toml_str(
///     r#"
///     [store]
///     url = "postgresql://localhost/catalog"
///
///     [[collections]]
///     name = "models"
///     store_collection = "public.models"
///     dedup_key = ["Model"]
///     compare_key = ["Model", "Mfr"]
///
///     [[collections.sources]]
///     path = "models.csv"
///     "#,
///     std::path::Path::new("/data"),
/// )
/// .unwrap();
/// assert_eq!(config.collections[0].sources[0].path, std::path::PathBuf::from("/data/models.csv"));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub output: OutputSettings,
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// Store connection URL; may also come from `--store` or saved state
    pub url: Option<String>,
    /// Store-assigned identity fields, overriding the store kind's default
    pub identity_fields: Option<Vec<String>>,
    /// Retries for a failed snapshot fetch (0 = single attempt)
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Initial backoff between fetch retries, doubled each attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            identity_fields: None,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Number of collections reconciled concurrently (1 = sequential)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            parallelism: default_parallelism(),
        }
    }
}

/// One collection to reconcile.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    pub name: String,
    /// Collection identifier in the store (table, `schema.table`, or Mongo collection)
    pub store_collection: String,
    /// Fields collapsing source-side repeats; omitted = full-record equality
    pub dedup_key: Option<KeySpec>,
    /// Fields aligning source records with store records
    pub compare_key: KeySpec,
    /// Restrict the match/update decision to these fields
    pub exact_match_fields: Option<Vec<String>>,
    pub identity_fields: Option<Vec<String>>,
    /// Per-field values treated as empty in addition to null/blank
    #[serde(default)]
    pub empty_values: HashMap<String, Vec<String>>,
    pub sources: Vec<SourceConfig>,
}

/// One source file feeding a collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Explicit format; detected from the file extension when omitted
    pub format: Option<SourceFormat>,
    /// Table to read from SQLite sources
    pub table: Option<String>,
    /// Source column header to business field name
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_parallelism() -> usize {
    1
}

impl ReconcileConfig {
    /// Load and validate a config file.
    ///
    /// Relative source paths and the output directory resolve against the
    /// config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_toml_str(&contents, &base_dir)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate config text, resolving relative paths against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Self> {
        let mut config: ReconcileConfig =
            toml::from_str(contents).context("Failed to parse reconciliation config")?;

        config.validate()?;

        if config.output.dir.is_relative() {
            config.output.dir = base_dir.join(&config.output.dir);
        }
        for collection in &mut config.collections {
            for source in &mut collection.sources {
                if source.path.is_relative() {
                    source.path = base_dir.join(&source.path);
                }
            }
        }

        Ok(config)
    }

    /// Check cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            bail!("Config must define at least one [[collections]] entry");
        }
        if self.output.parallelism == 0 {
            bail!("output.parallelism must be at least 1");
        }
        if let Some(fields) = &self.store.identity_fields {
            validate_field_list("store.identity_fields", fields)?;
        }

        let mut names = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                bail!("Collection '{}' is defined more than once", collection.name);
            }
            collection
                .validate(self.store.identity_fields.as_deref())
                .with_context(|| format!("Invalid collection '{}'", collection.name))?;
        }
        Ok(())
    }

    /// Find a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }
}

impl CollectionConfig {
    fn validate(&self, store_identity: Option<&[String]>) -> Result<()> {
        crate::utils::validate_collection_name(&self.name)?;

        if self.store_collection.trim().is_empty() {
            bail!("store_collection cannot be empty");
        }
        if self.sources.is_empty() {
            bail!("at least one [[collections.sources]] entry is required");
        }
        if let Some(fields) = &self.exact_match_fields {
            validate_field_list("exact_match_fields", fields)?;
        }
        if let Some(fields) = &self.identity_fields {
            validate_field_list("identity_fields", fields)?;
        }

        let identity = self.identity_fields.as_deref().or(store_identity).unwrap_or(&[]);
        let key_fields = self
            .compare_key
            .fields()
            .iter()
            .chain(self.dedup_key.iter().flat_map(|k| k.fields().iter()));
        for field in key_fields {
            if identity.contains(field) {
                bail!(
                    "key field '{}' is a store identity field and cannot be part of a key",
                    field
                );
            }
        }

        for source in &self.sources {
            source
                .validate()
                .with_context(|| format!("Invalid source {}", source.path.display()))?;
        }
        Ok(())
    }

    /// Deduplication strategy for the extracted source records.
    pub fn dedup_strategy(&self) -> DedupStrategy {
        match &self.dedup_key {
            Some(spec) => DedupStrategy::Fields(spec.clone()),
            None => DedupStrategy::FullRecord,
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::with_empty_values(&self.empty_values)
    }

    /// Identity fields for this collection, most specific setting first.
    pub fn resolve_identity_fields(
        &self,
        store: &StoreSettings,
        kind_default: &[&str],
    ) -> Vec<String> {
        self.identity_fields
            .clone()
            .or_else(|| store.identity_fields.clone())
            .unwrap_or_else(|| kind_default.iter().map(|f| f.to_string()).collect())
    }

    /// Build the compare spec handed to the reconciler.
    pub fn compare_spec(&self, identity_fields: Vec<String>) -> CompareSpec {
        let mode = match &self.exact_match_fields {
            Some(fields) => DiffMode::Subset(fields.clone()),
            None => DiffMode::Full,
        };
        CompareSpec::new(self.compare_key.clone())
            .with_mode(mode)
            .with_identity_fields(identity_fields)
            .with_normalizer(self.normalizer())
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        let format = self.resolved_format()?;
        if format == SourceFormat::Sqlite && self.table.is_none() {
            bail!("SQLite sources require a `table`");
        }
        let mut targets = HashSet::new();
        for (header, field) in &self.columns {
            if field.trim().is_empty() {
                bail!("column '{}' maps to a blank field name", header);
            }
            if !targets.insert(field.as_str()) {
                bail!("more than one column maps to field '{}'", field);
            }
        }
        Ok(())
    }

    /// Explicit format, or the one implied by the file extension.
    pub fn resolved_format(&self) -> Result<SourceFormat> {
        match self.format {
            Some(format) => Ok(format),
            None => SourceFormat::detect(&self.path),
        }
    }
}

fn validate_field_list(setting: &str, fields: &[String]) -> Result<()> {
    if fields.is_empty() {
        bail!("{} must list at least one field when set", setting);
    }
    if let Some(blank) = fields.iter().position(|f| f.trim().is_empty()) {
        bail!("{} has a blank field name at position {}", setting, blank);
    }
    Ok(())
}
