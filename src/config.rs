use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::CurateError;

pub const DEFAULT_CONFIG_FILE: &str = "litcurate.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: Option<u32>,
    pub log_dir: Option<Utf8PathBuf>,
    pub http: HttpConfig,
    pub pre_agent: PreAgentConfig,
    pub pubtator_filter: PubtatorFilterConfig,
    pub agent: AgentConfig,
    pub runner: RunnerConfig,
    pub recovery: RecoveryConfig,
    pub model_species: ModelSpeciesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub eutils_timeout_secs: u64,
    pub pubtator_timeout_secs: u64,
    /// Delay between consecutive API calls.
    pub pace_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            eutils_timeout_secs: 30,
            pubtator_timeout_secs: 60,
            pace_ms: 1000,
        }
    }
}

impl HttpConfig {
    pub fn eutils_timeout(&self) -> Duration {
        Duration::from_secs(self.eutils_timeout_secs)
    }

    pub fn pubtator_timeout(&self) -> Duration {
        Duration::from_secs(self.pubtator_timeout_secs)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreAgentConfig {
    pub days_per_chunk: u32,
    pub pubtator_chunk_size: usize,
    pub metadata_chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub model_species_csv: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
}

impl Default for PreAgentConfig {
    fn default() -> Self {
        Self {
            days_per_chunk: 3,
            pubtator_chunk_size: 900,
            metadata_chunk_size: 400,
            max_retries: 3,
            retry_delay_secs: 10,
            model_species_csv: Utf8PathBuf::from("config/top20_organisms_with_taxid.csv"),
            output_dir: Utf8PathBuf::from("data/pre_agent"),
        }
    }
}

impl PreAgentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PubtatorFilterConfig {
    pub chunk_size: usize,
    pub output_dir: Utf8PathBuf,
}

impl Default for PubtatorFilterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            output_dir: Utf8PathBuf::from("results/pubtator_filtered"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// External program receiving the prompt on stdin.
    pub program: String,
    pub args: Vec<String>,
    pub papers_csv: Utf8PathBuf,
    pub ledger_path: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "annotation-agent".to_string(),
            args: Vec::new(),
            papers_csv: Utf8PathBuf::from("data/pre_agent/FINAL.csv"),
            ledger_path: Utf8PathBuf::from("results/papers_database.json"),
            log_dir: Utf8PathBuf::from("logs/run_agent_batch"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub batch_size: usize,
    pub cooldown_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            cooldown_secs: 3,
        }
    }
}

impl RunnerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Only log files whose name starts with this prefix are scanned.
    pub log_prefix: String,
    pub output_all: Utf8PathBuf,
    pub output_filtered: Utf8PathBuf,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            log_prefix: String::new(),
            output_all: Utf8PathBuf::from("results/all_papers_collected.json"),
            output_filtered: Utf8PathBuf::from("results/filtered_papers_database.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSpeciesConfig {
    pub input_csv: Utf8PathBuf,
    pub output_csv: Utf8PathBuf,
    pub output_all_ranked: Utf8PathBuf,
    pub top_n: usize,
    pub pace_ms: u64,
}

impl Default for ModelSpeciesConfig {
    fn default() -> Self {
        Self {
            input_csv: Utf8PathBuf::from("data/ge_metadata_all.csv"),
            output_csv: Utf8PathBuf::from("config/top20_organisms_with_taxid.csv"),
            output_all_ranked: Utf8PathBuf::from("config/all_ranked_organisms.csv"),
            top_n: 20,
            pace_ms: 400,
        }
    }
}

impl ModelSpeciesConfig {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `litcurate.json` in the working directory when no path
    /// is given. Only the implicit file may be absent.
    pub fn resolve(path: Option<&str>) -> Result<Config, CurateError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CurateError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CurateError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Config, CurateError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(CurateError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }
        let positive = [
            ("pre_agent.pubtator_chunk_size", config.pre_agent.pubtator_chunk_size),
            ("pre_agent.metadata_chunk_size", config.pre_agent.metadata_chunk_size),
            ("pre_agent.days_per_chunk", config.pre_agent.days_per_chunk as usize),
            ("pubtator_filter.chunk_size", config.pubtator_filter.chunk_size),
            ("runner.batch_size", config.runner.batch_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(CurateError::ConfigParse(format!("{field} must be at least 1")));
            }
        }
        Ok(Config {
            schema_version: Some(schema_version),
            ..config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, Some(1));
        assert_eq!(resolved.pre_agent.pubtator_chunk_size, 900);
        assert_eq!(resolved.pre_agent.metadata_chunk_size, 400);
        assert_eq!(resolved.runner.batch_size, 30);
        assert_eq!(resolved.http.pace(), Duration::from_secs(1));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config: Config = serde_json::from_str(r#"{"runner": {"batch_size": 0}}"#).unwrap();
        assert!(ConfigLoader::resolve_config(config).is_err());
    }
}
