mod openai;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::Question;

pub use openai::OpenAiQuestionSupplier;

/// Result type for supplier operations
pub type SupplierResult<T> = Result<T, SupplierError>;

/// Errors that can occur while fetching a question set
#[derive(Debug, thiserror::Error)]
pub enum SupplierError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("response parsing failed: {0}")]
    ParseError(String),

    #[error("malformed question set: {0}")]
    MalformedSet(String),
}

/// Parameters of a question-set request.
#[derive(Debug, Clone)]
pub struct QuestionSetRequest {
    pub topic: String,
    /// Numeric difficulty scale, 1 (easy) to 3 (hard).
    pub difficulty: u8,
    pub count: u32,
    /// Question texts the supplier should avoid repeating.
    pub exclude_texts: Vec<String>,
}

/// Source of question sets for a round.
///
/// Implementations must fail loudly instead of returning malformed sets;
/// [`validate_question_set`] performs the shared checks.
#[async_trait]
pub trait QuestionSupplier: Send + Sync {
    async fn question_set(&self, request: QuestionSetRequest) -> SupplierResult<Vec<Question>>;

    /// Name of this supplier, for logging.
    fn name(&self) -> &str;
}

/// Checks a question set before it is handed to the engine: the requested
/// count, four answers per question with exactly one correct, unique ids.
pub fn validate_question_set(questions: &[Question], expected_count: u32) -> SupplierResult<()> {
    if questions.len() != expected_count as usize {
        return Err(SupplierError::MalformedSet(format!(
            "expected {} questions, got {}",
            expected_count,
            questions.len()
        )));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for question in questions {
        if !seen_ids.insert(question.id.as_str()) {
            return Err(SupplierError::MalformedSet(format!(
                "duplicate question id {}",
                question.id
            )));
        }

        if question.answers.len() != 4 {
            return Err(SupplierError::MalformedSet(format!(
                "question {} has {} answers, expected 4",
                question.id,
                question.answers.len()
            )));
        }

        let correct = question.answers.iter().filter(|a| a.is_correct).count();
        if correct != 1 {
            return Err(SupplierError::MalformedSet(format!(
                "question {} has {} correct answers, expected exactly 1",
                question.id, correct
            )));
        }
    }

    Ok(())
}

/// Supplier serving from a fixed catalog.
///
/// Used when no AI provider is configured, and by tests that need a
/// deterministic question set.
pub struct StaticQuestionSupplier {
    catalog: Vec<Question>,
}

impl StaticQuestionSupplier {
    pub fn new(catalog: Vec<Question>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl QuestionSupplier for StaticQuestionSupplier {
    async fn question_set(&self, request: QuestionSetRequest) -> SupplierResult<Vec<Question>> {
        let available: Vec<Question> = self
            .catalog
            .iter()
            .filter(|q| !request.exclude_texts.contains(&q.question))
            .take(request.count as usize)
            .cloned()
            .collect();

        validate_question_set(&available, request.count)?;
        Ok(available)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Configuration for question suppliers
#[derive(Debug, Clone)]
pub struct SupplierConfig {
    /// OpenAI API key; absence selects the static catalog supplier
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Timeout for a single question-set request
    pub request_timeout: Duration,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl SupplierConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let openai_model = std::env::var("OPENAI_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let request_timeout = std::env::var("SUPPLIER_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(20));

        Self {
            openai_api_key,
            openai_model,
            request_timeout,
        }
    }
}
