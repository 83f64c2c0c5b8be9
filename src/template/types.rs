//! Template types and error definitions

use thiserror::Error;

use crate::notification::ServiceType;

/// Template-specific error type
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// A leaf contains an invalid placeholder or the tree has a non-string value
    #[error("Template syntax error at '{path}': {reason}")]
    Syntax { path: String, reason: String },

    /// No definition for `channel`, or for any channel when `channel` is `None`
    #[error(
        "Template not found: {platform_id}/{template_id} ({})",
        .channel.map_or("any channel", |c| c.template_name())
    )]
    NotFound {
        platform_id: String,
        template_id: String,
        channel: Option<ServiceType>,
    },

    #[error("No language payload for language '{0}'")]
    PayloadNotFound(String),

    #[error("Recipient has no {0} address")]
    MissingAddress(ServiceType),

    #[error("Invalid template ID: {0}")]
    InvalidId(String),

    #[error("Failed to load template '{path}': {reason}")]
    Load { path: String, reason: String },
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Validate a platform or template identifier used to locate definitions
pub fn validate_id(kind: &str, id: &str) -> TemplateResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(TemplateError::InvalidId(format!(
            "{} ID must be 1-64 characters",
            kind
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TemplateError::InvalidId(format!(
            "{} ID must contain only alphanumeric, dash, or underscore",
            kind
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("template", "welcome-mail_2").is_ok());
        assert!(matches!(validate_id("template", ""), Err(TemplateError::InvalidId(_))));
        assert!(matches!(
            validate_id("platform", "../etc"),
            Err(TemplateError::InvalidId(_))
        ));
    }

    #[test]
    fn test_not_found_names_channel() {
        let whole_pair = TemplateError::NotFound {
            platform_id: "acme".into(),
            template_id: "welcome".into(),
            channel: None,
        };
        let one_channel = TemplateError::NotFound {
            platform_id: "acme".into(),
            template_id: "welcome".into(),
            channel: Some(ServiceType::Push),
        };

        assert_eq!(
            whole_pair.to_string(),
            "Template not found: acme/welcome (any channel)"
        );
        assert_eq!(
            one_channel.to_string(),
            "Template not found: acme/welcome (PUSH)"
        );
    }
}
