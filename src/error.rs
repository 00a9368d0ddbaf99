//! Error types for record-reformer
//!
//! This module defines the error types used throughout the application.

use thiserror::Error;

/// 템플릿 컴파일 및 평가 에러
#[derive(Error, Debug)]
pub enum TemplateError {
    /// 표현식 템플릿 컴파일 실패
    #[error("Failed to compile template '{template}': {message}")]
    Compilation { template: String, message: String },

    /// 표현식 평가 실패 (정의되지 않은 변수, 타입 에러 등)
    #[error("Failed to evaluate template '{template}': {message}")]
    Evaluation { template: String, message: String },
}

impl TemplateError {
    /// Short machine-readable name of the error kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateError::Compilation { .. } => "compilation",
            TemplateError::Evaluation { .. } => "evaluation",
        }
    }

    /// Template source that caused the error
    pub fn template(&self) -> &str {
        match self {
            TemplateError::Compilation { template, .. }
            | TemplateError::Evaluation { template, .. } => template,
        }
    }
}

/// 이벤트 단위 처리 에러
///
/// Carries the tag of the event that failed so the driver can log it
/// before dropping the event.
#[derive(Error, Debug)]
#[error("Failed to reform event with tag '{tag}': {source}")]
pub struct EventError {
    /// Tag of the incoming event
    pub tag: String,
    /// Underlying template failure
    #[source]
    pub source: TemplateError,
}

impl EventError {
    /// Wrap a template error with the tag of the event it occurred in
    pub fn new(tag: impl Into<String>, source: TemplateError) -> Self {
        Self {
            tag: tag.into(),
            source,
        }
    }

    /// Error kind of the underlying template failure
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Template error raised outside of event processing (e.g. --validate)
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Input/output error on the event stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_kind() {
        let err = TemplateError::Evaluation {
            template: "${nope}".to_string(),
            message: "Variable not found: nope".to_string(),
        };
        assert_eq!(err.kind(), "evaluation");
        assert_eq!(err.template(), "${nope}");
        assert!(err.to_string().contains("Variable not found"));
    }

    #[test]
    fn test_event_error_carries_tag() {
        let err = EventError::new(
            "app.web",
            TemplateError::Compilation {
                template: "${".to_string(),
                message: "unterminated".to_string(),
            },
        );
        assert_eq!(err.kind(), "compilation");
        assert!(err.to_string().contains("app.web"));
    }
}
