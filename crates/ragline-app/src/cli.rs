//! CLI argument definitions for the Ragline application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.
//! Variables from a `.env` file count as env vars but never replace ones that
//! are already set.

use std::path::{Path, PathBuf};

use clap::Parser;
use ragline_core::config::RaglineConfig;
use ragline_core::error::RagError;

/// Ragline - ingest a directory of PDFs, retrieve passages for a query and
/// generate an answer from them.
#[derive(Parser, Debug)]
#[command(name = "ragline", version, about)]
pub struct CliArgs {
    /// Directory of PDF files to ingest. Must be inside an allowed directory.
    #[arg(short = 'd', long = "directory")]
    pub directory: PathBuf,

    /// Question to answer from the ingested documents.
    #[arg(short = 'q', long = "query")]
    pub query: String,

    /// Maximum chunk size in characters (default 500).
    #[arg(long = "chunk-size", allow_negative_numbers = true)]
    pub chunk_size: Option<i64>,

    /// Characters shared between consecutive chunks (default 100).
    #[arg(long = "chunk-overlap", allow_negative_numbers = true)]
    pub chunk_overlap: Option<i64>,

    /// Number of passages to retrieve (default 5).
    #[arg(short = 'k', long = "top-k", allow_negative_numbers = true)]
    pub top_k: Option<i64>,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// `.env` file to load. Defaults to the first `.env` found in the
    /// current directory or its parents.
    #[arg(long = "env-file")]
    pub env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > RAGLINE_CONFIG env var > ~/.ragline/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = lookup("RAGLINE_CONFIG").filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Write explicitly given arguments over the loaded configuration.
    ///
    /// Negative sizes and counts are rejected here since the pipeline only
    /// deals in unsigned values.
    pub fn apply_to(&self, config: &mut RaglineConfig) -> Result<(), RagError> {
        if let Some(v) = self.chunk_size {
            config.ingest.chunk_size = non_negative("--chunk-size", v)?;
        }
        if let Some(v) = self.chunk_overlap {
            config.ingest.chunk_overlap = non_negative("--chunk-overlap", v)?;
        }
        if let Some(v) = self.top_k {
            config.retrieval.top_k = non_negative("--top-k", v)?;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        Ok(())
    }
}

/// Load variables from a `.env` file into the process environment.
///
/// Without an explicit path a missing `.env` is not an error. Returns the file
/// that was loaded, if any.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, RagError> {
    let loaded = match path {
        Some(p) => dotenv::from_path(p).map(|_| p.to_path_buf()),
        None => dotenv::dotenv(),
    };
    match loaded {
        Ok(p) => Ok(Some(p)),
        Err(dotenv::Error::Io(ref e))
            if path.is_none() && e.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(None)
        }
        Err(e) => {
            let shown = path.map_or_else(|| ".env".to_string(), |p| p.display().to_string());
            Err(RagError::Config(format!(
                "Failed to load env file {}: {}",
                shown, e
            )))
        }
    }
}

fn non_negative(flag: &str, value: i64) -> Result<usize, RagError> {
    usize::try_from(value)
        .map_err(|_| RagError::Validation(format!("{} must not be negative, got {}", flag, value)))
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ragline").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ragline").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::error::ErrorKind;

    /// Parse `args` after a fixed `--directory ./docs`.
    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(
            ["ragline", "--directory", "./docs"]
                .into_iter()
                .chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let args =
            CliArgs::try_parse_from(["ragline", "--directory", "./data", "--query", "What is X?"])
                .unwrap();
        assert_eq!(args.directory, PathBuf::from("./data"));
        assert_eq!(args.query, "What is X?");
        assert!(args.chunk_size.is_none());
        assert!(args.top_k.is_none());
    }

    #[test]
    fn test_query_is_required() {
        assert!(CliArgs::try_parse_from(["ragline", "--directory", "./docs"]).is_err());
    }

    #[test]
    fn test_directory_is_required() {
        assert!(CliArgs::try_parse_from(["ragline", "--query", "What is X?"]).is_err());
    }

    #[test]
    fn test_env_file_feeds_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local settings\nRAGLINE_TEST_ENV_FILE_COLLECTION=from_env_file\n",
        )
        .unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();
        assert_eq!(loaded, Some(path.clone()));

        let mut config = RaglineConfig::default();
        config
            .apply_overrides(|key| match key {
                "RAGLINE_COLLECTION" => std::env::var("RAGLINE_TEST_ENV_FILE_COLLECTION").ok(),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.store.collection, "from_env_file");
    }

    #[test]
    fn test_missing_explicit_env_file_is_config_error() {
        let err = load_env_file(Some(Path::new("/no/such/dir/.env"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("/no/such/dir/.env"));
    }

    #[test]
    fn test_overrides_config() {
        let args = parse(&["-q", "x", "--chunk-size", "200", "--chunk-overlap", "20", "--top-k", "3",
            "--log-level", "debug",
        ]);
        let mut config = RaglineConfig::default();
        args.apply_to(&mut config).unwrap();
        assert_eq!(config.ingest.chunk_size, 200);
        assert_eq!(config.ingest.chunk_overlap, 20);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_negative_top_k_is_validation_error() {
        let args = parse(&["-q", "x", "--top-k", "-1"]);
        let mut config = RaglineConfig::default();
        let err = args.apply_to(&mut config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("--top-k"));
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_config_path_priority() {
        let explicit = parse(&["-q", "x", "--config", "/etc/ragline.toml"]);
        assert_eq!(
            explicit.resolve_config_path_with(|_| Some("/from/env.toml".to_string())),
            PathBuf::from("/etc/ragline.toml")
        );

        let from_env = parse(&["-q", "x"]);
        assert_eq!(
            from_env.resolve_config_path_with(|_| Some("/from/env.toml".to_string())),
            PathBuf::from("/from/env.toml")
        );

        let fallback = from_env.resolve_config_path_with(|_| None);
        assert!(fallback.ends_with("config.toml"));
    }
}
