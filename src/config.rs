// Runtime configuration resolved from flags, environment and defaults

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::cli::GlobalArgs;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

const APP_DIR: &str = "docgen";
const DB_FILE: &str = "docgen.db";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_base: String,
    pub db_path: PathBuf,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub viewport_rows: u32,
    pub viewport_columns: usize,
}

impl Config {
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let api_base = args.api_base.trim().trim_end_matches('/').to_string();
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            bail!("API base must be an http(s) URL, got {:?}", args.api_base);
        }

        if args.poll_secs == 0 {
            bail!("poll interval must be at least one second");
        }

        Ok(Self {
            api_base,
            db_path: args.db_path.clone().unwrap_or_else(default_db_path),
            poll_interval: Duration::from_secs(args.poll_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout_secs.max(1)),
            viewport_rows: args.rows,
            viewport_columns: args.columns.max(1),
        })
    }
}

/// `<data dir>/docgen/docgen.db`, or `./docgen.db` where the platform has no data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join(DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DB_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args() -> GlobalArgs {
        GlobalArgs {
            api_base: "http://localhost:8000/api/".to_string(),
            db_path: Some(PathBuf::from("/tmp/docgen-test.db")),
            poll_secs: 10,
            connect_timeout_secs: 0,
            rows: 40,
            columns: 0,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn normalizes_values() {
        let config = Config::from_args(&args()).unwrap();

        assert_eq!(config.api_base, "http://localhost:8000/api");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.viewport_columns, 1);
        assert_eq!(config.db_path, PathBuf::from("/tmp/docgen-test.db"));
    }

    #[test]
    fn rejects_non_http_base_and_zero_interval() {
        let mut bad_base = args();
        bad_base.api_base = "127.0.0.1:8000".to_string();
        assert!(Config::from_args(&bad_base).is_err());

        let mut bad_poll = args();
        bad_poll.poll_secs = 0;
        assert!(Config::from_args(&bad_poll).is_err());
    }

    #[test]
    fn default_db_path_ends_with_app_file() {
        assert!(default_db_path().ends_with(DB_FILE));
    }
}
