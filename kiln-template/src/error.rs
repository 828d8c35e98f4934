//! Template errors

use minijinja::ErrorKind;
use thiserror::Error;

/// Errors raised while parsing or rendering a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {template}: syntax error on line {line}: {message}")]
    Syntax {
        template: String,
        line: usize,
        message: String,
    },

    #[error("template {template}: {message}")]
    UnknownFunction { template: String, message: String },

    #[error("template {template}: {message}")]
    MissingValue { template: String, message: String },

    #[error("template {template}: output exceeds {limit} bytes")]
    TooLarge { template: String, limit: usize },

    #[error("template {template}: {message}")]
    Exec { template: String, message: String },
}

impl TemplateError {
    pub(crate) fn from_render(template: &str, err: &minijinja::Error) -> Self {
        let template = template.to_string();
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", err.kind(), detail),
            None => err.kind().to_string(),
        };

        match err.kind() {
            ErrorKind::SyntaxError | ErrorKind::BadEscape => TemplateError::Syntax {
                template,
                line: err.line().unwrap_or(0),
                message,
            },
            ErrorKind::UndefinedError => TemplateError::MissingValue { template, message },
            ErrorKind::UnknownFilter
            | ErrorKind::UnknownFunction
            | ErrorKind::UnknownTest
            | ErrorKind::UnknownMethod => TemplateError::UnknownFunction { template, message },
            _ => TemplateError::Exec { template, message },
        }
    }
}
