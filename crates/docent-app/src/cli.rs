//! CLI argument definitions for the `docent` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Docent: index documentation and query it by meaning.
#[derive(Parser, Debug)]
#[command(name = "docent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for persisted vectors and threads.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Chunk, embed and index text files, replacing the collection.
    Index {
        /// Files or directories (`.txt` and `.md` files are picked up).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Add to the collection instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Search the collection and print the matching chunks.
    Search {
        query: String,

        /// Number of results (defaults to retrieval.k).
        #[arg(short = 'k', long = "k")]
        k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report whether the collection is loaded and how many chunks it holds.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List stored conversation threads.
    Threads,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOCENT_CONFIG env var > ~/.docent/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOCENT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Data directory override, if given on the command line.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".docent").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".docent").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        let args = CliArgs::parse_from(["docent", "index", "docs", "notes.md", "--append"]);
        assert_eq!(
            args.command,
            Command::Index {
                paths: vec![PathBuf::from("docs"), PathBuf::from("notes.md")],
                append: true,
            }
        );
    }

    #[test]
    fn test_parse_search_with_global_flags() {
        let args = CliArgs::parse_from([
            "docent", "search", "list comprehension", "-k", "2", "--json", "-c", "/tmp/d.toml",
        ]);
        assert_eq!(
            args.command,
            Command::Search {
                query: "list comprehension".to_string(),
                k: Some(2),
                json: true,
            }
        );
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/d.toml"));
    }

    #[test]
    fn test_index_requires_paths() {
        assert!(CliArgs::try_parse_from(["docent", "index"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from(["docent", "-d", "/srv/docent", "-l", "debug", "status"]);
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/srv/docent"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert_eq!(args.command, Command::Status { json: false });
    }

    #[test]
    fn test_default_config_path_ends_with_docent_config() {
        let args = CliArgs::parse_from(["docent", "threads"]);
        if std::env::var("DOCENT_CONFIG").is_err() {
            assert!(args.resolve_config_path().ends_with("config.toml"));
        }
    }
}
