use crate::domain::model::{Intent, Priority};
use crate::utils::error::{Result, TriageError};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingConfig,
    pub kb: KbConfig,
    pub policy: PolicyConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///./data/triage.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// SQLite 檔案路徑；`None` 代表使用記憶體資料庫
    ///
    /// `sqlite:///rel.db` → `rel.db`，`sqlite:////abs.db` → `/abs.db`
    pub fn sqlite_path(&self) -> Option<&str> {
        let raw = self.url.trim();
        let path = match raw.strip_prefix("sqlite://") {
            Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
            None => raw.strip_prefix("sqlite:").unwrap_or(raw),
        };
        match path {
            ":memory:" | "" => None,
            other => Some(other),
        }
    }

    /// 只接受 sqlite URL 或純檔案路徑
    pub fn validate_url(&self) -> Result<()> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(TriageError::MissingConfigError {
                field: "DATABASE_URL".to_string(),
            });
        }
        match url::Url::parse(raw) {
            Ok(parsed) if parsed.scheme() != "sqlite" => Err(TriageError::InvalidConfigValueError {
                field: "DATABASE_URL".to_string(),
                value: format!("{}://...", parsed.scheme()),
                reason: "only sqlite databases are supported".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    pub docs_dir: String,
    pub persist_dir: String,
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            docs_dir: "./kb_docs".to_string(),
            persist_dir: "./data/kb".to_string(),
            collection: "support_kb".to_string(),
            chunk_size: 800,
            chunk_overlap: 120,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub auto_send_enabled: bool,
    pub auto_send_confidence: f64,
    pub blocked_intents: Vec<Intent>,
    pub blocked_priorities: Vec<Priority>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_send_enabled: true,
            auto_send_confidence: 0.80,
            blocked_intents: vec![Intent::ComplaintEscalation],
            blocked_priorities: vec![Priority::P0, Priority::P1],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier_seconds: f64,
    pub min_wait_seconds: f64,
    pub max_wait_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier_seconds: 1.0,
            min_wait_seconds: 1.0,
            max_wait_seconds: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

fn env_var_regex() -> &'static Regex {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TriageError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: "not a valid number".to_string(),
        })
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| TriageError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})，找不到的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        env_var_regex()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 載入順序：檔案 (可選) → 環境變數覆蓋
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 用環境變數覆蓋配置，lookup 可注入以便測試
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TRIAGE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("TRIAGE_PORT") {
            self.server.port = parse_number("TRIAGE_PORT", &v)?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            self.llm.temperature = parse_number("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = lookup("KB_PERSIST_DIR") {
            self.kb.persist_dir = v;
        }
        if let Some(v) = lookup("KB_COLLECTION") {
            self.kb.collection = v;
        }
        if let Some(v) = lookup("AUTO_SEND_ENABLED") {
            self.policy.auto_send_enabled = parse_bool(&v);
        }
        if let Some(v) = lookup("AUTO_SEND_CONFIDENCE") {
            self.policy.auto_send_confidence = parse_number("AUTO_SEND_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("AUTO_SEND_BLOCKED_INTENTS") {
            self.policy.blocked_intents = parse_list(&v)
                .iter()
                .map(|item| item.parse())
                .collect::<Result<_>>()?;
        }
        if let Some(v) = lookup("AUTO_SEND_BLOCKED_PRIORITIES") {
            self.policy.blocked_priorities = parse_list(&v)
                .iter()
                .map(|item| item.parse())
                .collect::<Result<_>>()?;
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str> {
        crate::utils::validation::validate_required_field("OPENAI_API_KEY", &self.llm.api_key)
            .map(String::as_str)
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("llm.base_url", &self.llm.base_url)?;
        validate_range("llm.temperature", self.llm.temperature, 0.0, 2.0)?;
        validate_positive_number("llm.timeout_seconds", self.llm.timeout_seconds as usize, 1)?;
        validate_positive_number("embeddings.batch_size", self.embeddings.batch_size, 1)?;

        validate_path("kb.persist_dir", &self.kb.persist_dir)?;
        validate_path("kb.docs_dir", &self.kb.docs_dir)?;
        validate_positive_number("kb.chunk_size", self.kb.chunk_size, 1)?;
        validate_positive_number("kb.top_k", self.kb.top_k, 1)?;
        if self.kb.chunk_overlap >= self.kb.chunk_size {
            return Err(TriageError::InvalidConfigValueError {
                field: "kb.chunk_overlap".to_string(),
                value: self.kb.chunk_overlap.to_string(),
                reason: format!("must be smaller than kb.chunk_size ({})", self.kb.chunk_size),
            });
        }

        validate_range(
            "policy.auto_send_confidence",
            self.policy.auto_send_confidence,
            0.0,
            1.0,
        )?;

        validate_positive_number("retry.max_attempts", self.retry.max_attempts as usize, 1)?;
        if self.retry.min_wait_seconds > self.retry.max_wait_seconds {
            return Err(TriageError::InvalidConfigValueError {
                field: "retry.min_wait_seconds".to_string(),
                value: self.retry.min_wait_seconds.to_string(),
                reason: "must not exceed retry.max_wait_seconds".to_string(),
            });
        }

        self.database.validate_url()?;

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
