// Command line surface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_API_BASE;
use crate::models::{ExportFormat, ModelId};
use crate::state::Theme;
use crate::status::DEFAULT_POLL_INTERVAL;

#[derive(Debug, Parser)]
#[command(name = "docgen")]
#[command(author, version, about = "Stream AI-generated documentation for your source code", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Base URL of the DocGen backend API
    #[arg(long, global = true, env = "DOCGEN_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// SQLite file holding the token, preferences and saved documents
    #[arg(long, global = true, env = "DOCGEN_DB_PATH", value_name = "FILE")]
    pub db_path: Option<PathBuf>,

    /// Seconds between connectivity checks
    #[arg(long, global = true, env = "DOCGEN_POLL_SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_secs: u64,

    /// Seconds to wait when connecting to the backend
    #[arg(long, global = true, env = "DOCGEN_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Terminal height used for the follow-output scroll model
    #[arg(long, global = true, env = "LINES", default_value_t = 24)]
    pub rows: u32,

    /// Terminal width used to measure wrapped lines
    #[arg(long, global = true, env = "COLUMNS", default_value_t = 80)]
    pub columns: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, env = "DOCGEN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate documentation for source code (Ctrl-C stops the stream)
    Generate(GenerateArgs),

    /// Check whether the backend is online
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Create an account
    Register(CredentialArgs),

    /// Log in and remember the access token
    Login(CredentialArgs),

    /// Forget the stored access token
    Logout,

    /// Documents stored by the backend
    #[command(subcommand)]
    History(HistoryCommand),

    /// Export documentation as PDF or DOCX
    Export(ExportArgs),

    /// Print the raw Markdown of a locally saved document
    Copy {
        /// Local document id (defaults to the latest)
        id: Option<i64>,
    },

    /// List locally saved documents
    Documents,

    /// Show or change the default model
    Model {
        model: Option<ModelId>,
    },

    /// Show or change the color theme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Source code to document
    #[arg(long, conflicts_with = "file")]
    pub code: Option<String>,

    /// Read the source code from a file (stdin is used when neither is given)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Model to use instead of the saved default
    #[arg(short, long)]
    pub model: Option<ModelId>,
}

#[derive(Debug, Args)]
pub struct CredentialArgs {
    #[arg(short, long)]
    pub username: String,

    /// Read from stdin when omitted
    #[arg(long, env = "DOCGEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List stored documents
    List,
    /// Print a stored document
    Show { id: i64 },
    /// Delete a stored document
    Delete { id: i64 },
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(value_enum)]
    pub format: ExportFormat,

    /// Export a Markdown file
    #[arg(long, value_name = "FILE", conflicts_with_all = ["history", "document"])]
    pub file: Option<PathBuf>,

    /// Export a document stored by the backend
    #[arg(long, value_name = "ID", conflicts_with = "document")]
    pub history: Option<i64>,

    /// Export a locally saved document (defaults to the latest)
    #[arg(long, value_name = "ID")]
    pub document: Option<i64>,

    /// Where to write the file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ThemeAction {
    Toggle,
    Set {
        #[arg(value_enum)]
        theme: Theme,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_with_model() {
        let cli = Cli::parse_from([
            "docgen",
            "generate",
            "--file",
            "main.py",
            "--model",
            "qwen2.5-coder:3b",
        ]);

        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.file, Some(PathBuf::from("main.py")));
                assert_eq!(args.model, Some(ModelId::QwenCoder3b));
                assert_eq!(args.code, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn poll_interval_defaults_to_monitor_interval() {
        let cli = Cli::parse_from(["docgen", "status"]);
        assert_eq!(cli.global.poll_secs, DEFAULT_POLL_INTERVAL.as_secs());
    }

    #[test]
    fn code_and_file_conflict() {
        let result = Cli::try_parse_from(["docgen", "generate", "--code", "x", "--file", "a.py"]);
        assert!(result.is_err());
    }

    #[test]
    fn export_defaults_to_latest_document() {
        let cli = Cli::parse_from(["docgen", "export", "pdf"]);
        match cli.command {
            Command::Export(args) => {
                assert_eq!(args.format, ExportFormat::Pdf);
                assert!(args.file.is_none() && args.history.is_none() && args.document.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
