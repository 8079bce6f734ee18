use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Schema error: database version {db_version} is newer than supported {latest_supported}")]
    SchemaVersionError { db_version: u32, latest_supported: u32 },

    #[error("LLM request failed: {message}")]
    LlmError { message: String },

    #[error("LLM returned unusable output: {message}")]
    LlmOutputError { message: String },

    #[error("Knowledge base error: {message}")]
    RetrievalError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Storage,
    Configuration,
    Model,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TriageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TriageError::HttpError(_) | TriageError::LlmError { .. } => ErrorCategory::Network,
            TriageError::DatabaseError(_)
            | TriageError::IoError(_)
            | TriageError::SchemaVersionError { .. }
            | TriageError::RetrievalError { .. } => ErrorCategory::Storage,
            TriageError::ConfigError { .. }
            | TriageError::MissingConfigError { .. }
            | TriageError::InvalidConfigValueError { .. }
            | TriageError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            TriageError::LlmOutputError { .. } | TriageError::SerializationError(_) => {
                ErrorCategory::Model
            }
            TriageError::CsvError(_)
            | TriageError::ValidationError { .. }
            | TriageError::NotFound { .. } => ErrorCategory::Input,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::Model => ErrorSeverity::Medium,
            ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 暫時性錯誤：模型輸出格式錯誤或網路問題，重試可能成功
    pub fn is_retryable(&self) -> bool {
        match self {
            TriageError::HttpError(_)
            | TriageError::LlmError { .. }
            | TriageError::LlmOutputError { .. }
            | TriageError::SerializationError(_) => true,
            TriageError::RetrievalError { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check OPENAI_BASE_URL / OPENAI_API_KEY and network connectivity, then retry"
            }
            ErrorCategory::Model => {
                "The model did not return valid JSON; retry or lower LLM_TEMPERATURE"
            }
            ErrorCategory::Storage => {
                "Check DATABASE_URL and KB_PERSIST_DIR permissions; re-run `ingest` if the index is corrupt"
            }
            ErrorCategory::Configuration => "Fix the configuration file or environment variables",
            ErrorCategory::Input => "Check the request payload or input file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            TriageError::NotFound { entity, .. } => format!("{} not found", entity),
            TriageError::LlmError { .. } | TriageError::HttpError(_) => {
                "The language model service could not be reached".to_string()
            }
            TriageError::LlmOutputError { .. } => {
                "The language model returned an unexpected response".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
