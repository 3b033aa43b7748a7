// Client state that outlives a single command

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::error::ApiError;
use crate::models::ModelId;
use crate::status::ConnectionState;

pub const TOKEN_KEY: &str = "access_token";
pub const THEME_KEY: &str = "theme";
pub const MODEL_KEY: &str = "selected_model_name";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown theme: {}", other)),
        }
    }
}

/// What the client is currently showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    /// No token: only login and registration are available.
    Auth,
    Generator,
    Document(i64),
}

/// Token, theme, model choice, connectivity and the open document.
///
/// Every transition that changes persisted state writes it through to the
/// `app_config` table right away.
#[derive(Debug, Default)]
pub struct AppState {
    token: Option<String>,
    theme: Theme,
    model: ModelId,
    connectivity: ConnectionState,
    open_document: Option<i64>,
}

impl AppState {
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let token = db::get_config_value(conn, TOKEN_KEY)?.filter(|t| !t.is_empty());

        let theme = match db::get_config_value(conn, THEME_KEY)? {
            Some(stored) => stored.parse().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring stored theme");
                Theme::default()
            }),
            None => Theme::default(),
        };

        let model = match db::get_config_value(conn, MODEL_KEY)? {
            Some(stored) => stored.parse().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring stored model");
                ModelId::default()
            }),
            None => ModelId::default(),
        };

        Ok(Self {
            token,
            theme,
            model,
            ..Default::default()
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn require_token(&self) -> Result<&str, ApiError> {
        self.token().ok_or(ApiError::NotAuthenticated)
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn connectivity(&self) -> ConnectionState {
        self.connectivity
    }

    pub fn view(&self) -> View {
        match (&self.token, self.open_document) {
            (None, _) => View::Auth,
            (Some(_), Some(id)) => View::Document(id),
            (Some(_), None) => View::Generator,
        }
    }

    pub fn login(&mut self, conn: &Connection, token: String) -> rusqlite::Result<()> {
        db::update_config_value(conn, TOKEN_KEY, &token)?;
        self.token = Some(token);
        info!("logged in");
        Ok(())
    }

    pub fn logout(&mut self, conn: &Connection) -> rusqlite::Result<()> {
        db::delete_config_value(conn, TOKEN_KEY)?;
        self.token = None;
        self.open_document = None;
        info!("logged out");
        Ok(())
    }

    pub fn set_theme(&mut self, conn: &Connection, theme: Theme) -> rusqlite::Result<()> {
        db::update_config_value(conn, THEME_KEY, theme.as_str())?;
        self.theme = theme;
        Ok(())
    }

    pub fn toggle_theme(&mut self, conn: &Connection) -> rusqlite::Result<Theme> {
        let theme = self.theme.toggled();
        self.set_theme(conn, theme)?;
        Ok(theme)
    }

    pub fn select_model(&mut self, conn: &Connection, model: ModelId) -> rusqlite::Result<()> {
        db::update_config_value(conn, MODEL_KEY, model.as_str())?;
        self.model = model;
        Ok(())
    }

    pub fn set_connectivity(&mut self, connectivity: ConnectionState) {
        self.connectivity = connectivity;
    }

    pub fn open_document(&mut self, record_id: i64) {
        self.open_document = Some(record_id);
    }

    pub fn close_document(&mut self) {
        self.open_document = None;
    }
}
