use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub replica: Option<ReplicaConfig>,
    #[serde(default)]
    pub master: Option<MasterConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// Index HTML documents even when a meta robots tag says not to.
    #[serde(default)]
    pub ignore_exclusions: bool,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Directory holding helper binaries (e.g. `outlookmsg2html`).
    #[serde(default = "default_pkglib_bin_dir")]
    pub pkglib_bin_dir: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            ignore_exclusions: false,
            sample_size: default_sample_size(),
            pkglib_bin_dir: default_pkglib_bin_dir(),
        }
    }
}

fn default_sample_size() -> usize {
    512
}
fn default_pkglib_bin_dir() -> String {
    "/usr/lib/index-harness/bin".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplicaConfig {
    pub path: PathBuf,
    /// Budget for each channel call, in seconds; 0 means no deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct MasterConfig {
    pub db_path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.extract.sample_size < 8 {
        anyhow::bail!("extract.sample_size must be >= 8");
    }

    if let Some(replica) = &config.replica {
        if replica.path.as_os_str().is_empty() {
            anyhow::bail!("replica.path must not be empty");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_sections_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[extract]").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.extract.sample_size, 512);
        assert!(!config.extract.ignore_exclusions);
        assert!(config.replica.is_none());
    }

    #[test]
    fn tiny_sample_size_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[extract]\nsample_size = 4").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn replica_section_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[replica]\npath = \"/var/lib/idx/replica\"").unwrap();
        let config = load_config(file.path()).unwrap();
        let replica = config.replica.unwrap();
        assert_eq!(replica.path, PathBuf::from("/var/lib/idx/replica"));
        assert_eq!(replica.timeout_secs, 300);
    }
}
