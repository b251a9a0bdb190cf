use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::RelationKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub kbsync: KbsyncConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Store locations
#[derive(Debug, Clone, Deserialize)]
pub struct KbsyncConfig {
    pub staging_db: PathBuf,
    pub graph_db: PathBuf,
    pub schema_db: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Industry classification service
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// What a refresh run recomputes
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Graph collection whose documents are refreshed
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Staging collection listing the entities touched in the window
    #[serde(default = "default_staging_collection")]
    pub staging_collection: String,
    /// Relation kinds to recompute: industry, division, channel, company
    #[serde(default = "default_relations")]
    pub relations: Vec<String>,
    /// Category names to reclassify; empty means every category
    #[serde(default)]
    pub industries: Vec<String>,
    /// Collection searched by name for owning companies
    #[serde(default = "default_company_collection")]
    pub company_collection: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            staging_collection: default_staging_collection(),
            relations: default_relations(),
            industries: Vec::new(),
            company_collection: default_company_collection(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    /// Cancel the run after this many seconds
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            progress_every: default_progress_every(),
            run_timeout_secs: None,
        }
    }
}

/// Exit status policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Exit non-zero when the failed share of attempted entities exceeds this
    #[serde(default)]
    pub max_failure_rate: Option<f64>,
}

/// Staged properties left out of new graph documents
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Per graph collection; replaces `default_dropped` for that collection
    #[serde(default = "default_dropped_properties")]
    pub dropped_properties: HashMap<String, Vec<String>>,
    #[serde(default = "default_dropped")]
    pub default_dropped: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dropped_properties: default_dropped_properties(),
            default_dropped: default_dropped(),
        }
    }
}

impl IngestConfig {
    pub fn dropped_for(&self, collection: &str) -> &[String] {
        self.dropped_properties
            .get(collection)
            .unwrap_or(&self.default_dropped)
    }
}

fn default_dropped_properties() -> HashMap<String, Vec<String>> {
    // Patent `content` is raw XML with almost no data in it
    HashMap::from([(
        "kb_patent".to_string(),
        vec!["html".to_string(), "content".to_string()],
    )])
}

fn default_dropped() -> Vec<String> {
    vec!["html".to_string()]
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    2
}

fn default_collection() -> String {
    "kb_company".to_string()
}

fn default_staging_collection() -> String {
    "process_company".to_string()
}

fn default_relations() -> Vec<String> {
    vec!["industry".to_string()]
}

fn default_company_collection() -> String {
    "kb_company".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_progress_every() -> usize {
    100
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// The file is `$KBSYNC_CONFIG` if set, otherwise `./config.toml`.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("KBSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_path(&config_path)
    }

    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.classifier.url)
            .with_context(|| format!("classifier.url is not a valid URL: {}", self.classifier.url))?;

        if self.classifier.timeout_secs == 0 {
            anyhow::bail!("classifier.timeout_secs must be greater than 0");
        }

        if self.pool.workers == 0 {
            anyhow::bail!("pool.workers must be greater than 0");
        }

        if self.pool.progress_every == 0 {
            anyhow::bail!("pool.progress_every must be greater than 0");
        }

        if let Some(rate) = self.run.max_failure_rate {
            if !(0.0..=1.0).contains(&rate) {
                anyhow::bail!("run.max_failure_rate must be between 0.0 and 1.0");
            }
        }

        self.relation_kinds()?;
        Ok(())
    }

    /// `refresh.relations` parsed, duplicates removed, order kept.
    pub fn relation_kinds(&self) -> Result<Vec<RelationKind>> {
        if self.refresh.relations.is_empty() {
            anyhow::bail!("refresh.relations must name at least one relation kind");
        }
        let mut kinds = Vec::new();
        for name in &self.refresh.relations {
            let kind = RelationKind::from_config_name(name)
                .with_context(|| format!("Unknown relation kind in refresh.relations: {}", name))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier.timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.pool.run_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that touch KBSYNC_CONFIG so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[kbsync]
staging_db = "./staging.db"
graph_db = "./graph.db"
schema_db = "./schema.db"

[classifier]
url = "http://127.0.0.1:9000/industry_classify"
"#;

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_applied() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_path(&write_config(&temp_dir, MINIMAL)).unwrap();
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.pool.progress_every, 100);
        assert_eq!(config.refresh.collection, "kb_company");
        assert_eq!(config.relation_kinds().unwrap(), vec![RelationKind::Industry]);
        assert!(config.refresh.industries.is_empty());
        assert_eq!(config.classifier_timeout(), Duration::from_secs(30));
        assert_eq!(config.run.max_failure_rate, None);
        assert_eq!(config.kbsync.log_level, "info");
        assert_eq!(config.ingest.dropped_for("kb_patent"), ["html", "content"]);
        assert_eq!(config.ingest.dropped_for("kb_recruit"), ["html"]);
    }

    #[test]
    fn test_dropped_properties_per_collection() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!(
            "{}
{}",
            MINIMAL,
            r#"
[ingest]
default_dropped = []

[ingest.dropped_properties]
kb_recruit = ["html", "raw_salary"]
"#
        );
        let config = Config::from_path(&write_config(&temp_dir, &content)).unwrap();
        assert_eq!(config.ingest.dropped_for("kb_recruit"), ["html", "raw_salary"]);
        assert!(config.ingest.dropped_for("kb_patent").is_empty());
    }

    #[test]
    fn test_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!(
            "{}\n{}",
            MINIMAL,
            r#"
[refresh]
collection = "kb_software"
staging_collection = "process_software"
relations = ["company", "industry", "company"]
industries = ["生物制药", "医疗器械"]

[pool]
workers = 8
run_timeout_secs = 3600

[run]
max_failure_rate = 0.2
"#
        );
        let config = Config::from_path(&write_config(&temp_dir, &content)).unwrap();
        assert_eq!(
            config.relation_kinds().unwrap(),
            vec![RelationKind::Company, RelationKind::Industry]
        );
        assert_eq!(config.refresh.industries.len(), 2);
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.run.max_failure_rate, Some(0.2));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!("{}\n[pool]\nworkers = 0\n", MINIMAL);
        let err = Config::from_path(&write_config(&temp_dir, &content)).unwrap_err();
        assert!(err.to_string().contains("pool.workers"));
    }

    #[test]
    fn test_unknown_relation_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!("{}\n[refresh]\nrelations = [\"patent\"]\n", MINIMAL);
        let err = Config::from_path(&write_config(&temp_dir, &content)).unwrap_err();
        assert!(err.to_string().contains("patent"));
    }

    #[test]
    fn test_bad_classifier_url_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let content = MINIMAL.replace("http://127.0.0.1:9000/industry_classify", "not a url");
        assert!(Config::from_path(&write_config(&temp_dir, &content)).is_err());
    }

    #[test]
    fn test_failure_rate_out_of_range_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!("{}\n[run]\nmax_failure_rate = 1.5\n", MINIMAL);
        assert!(Config::from_path(&write_config(&temp_dir, &content)).is_err());
    }

    #[test]
    fn test_load_uses_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);
        let original = std::env::var("KBSYNC_CONFIG").ok();

        std::env::set_var("KBSYNC_CONFIG", &path);
        let loaded = Config::load();
        std::env::set_var("KBSYNC_CONFIG", "nonexistent.toml");
        let missing = Config::load();

        std::env::remove_var("KBSYNC_CONFIG");
        if let Some(v) = original {
            std::env::set_var("KBSYNC_CONFIG", v);
        }
        assert!(loaded.is_ok(), "Config::load() failed: {:?}", loaded.err());
        assert!(missing.is_err());
    }
}
