// ABOUTME: Validate command checking a reconciliation config without touching the store
// ABOUTME: Prints a per-collection summary of keys, comparison mode, and sources

use anyhow::Result;
use std::path::Path;

use crate::config::{CollectionConfig, ReconcileConfig};

/// Load and validate a config file, then print what each collection will do.
pub fn validate(config_path: &Path) -> Result<ReconcileConfig> {
    let config = ReconcileConfig::load(config_path)?;

    println!("Config {} is valid", config_path.display());
    match &config.store.url {
        Some(url) => println!("  Store: {}", crate::utils::redact_url(url)),
        None => println!("  Store: (from --store or saved state)"),
    }
    println!("  Reports: {}", config.output.dir.display());

    for collection in &config.collections {
        print_collection(collection);
    }

    let missing = missing_sources(&config);
    for path in &missing {
        tracing::warn!("Source file {} does not exist yet", path.display());
    }

    Ok(config)
}

fn print_collection(collection: &CollectionConfig) {
    println!();
    println!("  [{}] -> {}", collection.name, collection.store_collection);
    match &collection.dedup_key {
        Some(key) => println!("    dedup key:   {}", key.fields().join(", ")),
        None => println!("    dedup key:   (full record)"),
    }
    println!("    compare key: {}", collection.compare_key.fields().join(", "));
    match &collection.exact_match_fields {
        Some(fields) => println!("    compare:     subset ({})", fields.join(", ")),
        None => println!("    compare:     all fields"),
    }
    for source in &collection.sources {
        let format = source
            .resolved_format()
            .map(|f| format!("{:?}", f).to_lowercase())
            .unwrap_or_else(|_| "unknown".to_string());
        match &source.table {
            Some(table) => println!(
                "    source:      {} [{}:{}]",
                source.path.display(),
                format,
                table
            ),
            None => println!("    source:      {} [{}]", source.path.display(), format),
        }
    }
}

/// Source files referenced by the config that are not on disk.
pub fn missing_sources(config: &ReconcileConfig) -> Vec<&Path> {
    config
        .collections
        .iter()
        .flat_map(|c| c.sources.iter())
        .map(|s| s.path.as_path())
        .filter(|p| !p.exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("models.csv"), "Model\nA1\n").unwrap();
        let config_path = dir.path().join("reconcile.toml");
        std::fs::write(
            &config_path,
            r#"
            [[collections]]
            name = "models"
            store_collection = "models"
            compare_key = ["Model"]
            [[collections.sources]]
            path = "models.csv"
            [[collections.sources]]
            path = "later.csv"
            "#,
        )
        .unwrap();

        let config = validate(&config_path).unwrap();
        let missing = missing_sources(&config);
        assert_eq!(missing, vec![dir.path().join("later.csv").as_path()]);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("reconcile.toml");
        std::fs::write(
            &config_path,
            r#"
            [[collections]]
            name = "models"
            store_collection = "models"
            compare_key = []
            [[collections.sources]]
            path = "models.csv"
            "#,
        )
        .unwrap();

        assert!(validate(&config_path).is_err());
    }
}
