// Request and response shapes exchanged with the DocGen backend

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Code models the backend can route a generation to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ModelId {
    #[default]
    #[serde(rename = "qwen2.5-coder:7b")]
    #[value(name = "qwen2.5-coder:7b")]
    QwenCoder7b,
    #[serde(rename = "qwen2.5-coder:3b")]
    #[value(name = "qwen2.5-coder:3b")]
    QwenCoder3b,
    #[serde(rename = "qwen2.5-coder:1.5b")]
    #[value(name = "qwen2.5-coder:1.5b")]
    QwenCoder1_5b,
    #[serde(rename = "deepseek-coder:6.7b")]
    #[value(name = "deepseek-coder:6.7b")]
    DeepseekCoder6_7b,
    #[serde(rename = "codellama:7b")]
    #[value(name = "codellama:7b")]
    CodeLlama7b,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QwenCoder7b => "qwen2.5-coder:7b",
            Self::QwenCoder3b => "qwen2.5-coder:3b",
            Self::QwenCoder1_5b => "qwen2.5-coder:1.5b",
            Self::DeepseekCoder6_7b => "deepseek-coder:6.7b",
            Self::CodeLlama7b => "codellama:7b",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::value_variants()
            .iter()
            .copied()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| format!("unsupported model: {}", s))
    }
}

/// Body of `POST /generate/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    #[serde(rename = "code")]
    pub source_code: String,
    pub model: ModelId,
}

impl GenerationRequest {
    pub fn new(source_code: impl Into<String>, model: ModelId) -> Self {
        Self {
            source_code: source_code.into(),
            model,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.source_code.trim().is_empty()
    }
}

/// A previously generated document, as listed by `GET /history/`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(default)]
    pub topic: String,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "token", alias = "access_token")]
    pub access: String,
}

/// Document formats the backend can render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf/",
            Self::Docx => "docx/",
        }
    }

    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::Pdf => "AI_Documentation.pdf",
            Self::Docx => "AI_Documentation.docx",
        }
    }
}

#[derive(Serialize)]
pub struct ExportRequest<'a> {
    pub docs: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_uses_wire_field_names() {
        let request = GenerationRequest::new("fn main() {}", ModelId::QwenCoder7b);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": "fn main() {}", "model": "qwen2.5-coder:7b" })
        );
    }

    #[test]
    fn blank_source_is_detected() {
        assert!(GenerationRequest::new("  \n\t ", ModelId::default()).is_blank());
        assert!(!GenerationRequest::new(" x ", ModelId::default()).is_blank());
    }

    #[test]
    fn model_ids_parse_from_their_names() {
        for model in ModelId::value_variants() {
            assert_eq!(model.as_str().parse::<ModelId>().unwrap(), *model);
        }
        assert!("gpt-4".parse::<ModelId>().is_err());
    }

    #[test]
    fn history_entry_accepts_backend_timestamps() {
        let entry: HistoryEntry = serde_json::from_str(
            r##"{"id": 7, "topic": "parser.py", "created_at": "2024-05-01T09:30:00.123456+05:30", "content": "# Parser"}"##,
        )
        .unwrap();
        assert_eq!(entry.id, 7);
        assert_eq!(entry.topic, "parser.py");
        assert_eq!(entry.created_at.to_rfc3339(), "2024-05-01T04:00:00.123456+00:00");
    }

    #[test]
    fn token_response_accepts_common_field_names() {
        for body in [r#"{"access": "t"}"#, r#"{"token": "t"}"#, r#"{"access_token": "t"}"#] {
            let parsed: TokenResponse = serde_json::from_str(body).unwrap();
            assert_eq!(parsed.access, "t");
        }
    }
}
