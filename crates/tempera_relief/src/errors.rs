//! Parse-time error types.

use tempera_carton::CompactString;
use thiserror::Error;

/// Errors in a binding expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingParseError {
    /// `[[]]` or `{{!}}`.
    #[error("empty binding expression")]
    EmptyExpression,

    /// Unbalanced parentheses or trailing text after the call.
    #[error("malformed method call `{0}`")]
    MalformedMethod(CompactString),

    /// A quoted argument without its closing quote.
    #[error("unterminated string literal in `{0}`")]
    UnterminatedString(CompactString),

    /// An argument that is not a literal, a number or a path.
    #[error("invalid argument `{0}`")]
    InvalidArgument(CompactString),

    /// `{{compute(a)}}`: a two-way binding needs a writable path.
    #[error("two-way binding to method call `{0}`")]
    TwoWayMethod(CompactString),
}

/// Errors in markup text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unexpected closing tag </{0}>")]
    UnexpectedClosingTag(CompactString),

    #[error("unclosed element <{0}>")]
    UnclosedElement(CompactString),

    #[error("malformed tag at byte {0}")]
    MalformedTag(usize),
}

/// Errors raised while building or parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("invalid binding `{text}`: {source}")]
    Binding {
        text: CompactString,
        #[source]
        source: BindingParseError,
    },

    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = TemplateError::Binding {
            text: "[[a(]]".into(),
            source: BindingParseError::MalformedMethod("a(".into()),
        };
        assert_eq!(
            err.to_string(),
            "invalid binding `[[a(]]`: malformed method call `a(`"
        );
        let err: TemplateError = MarkupError::UnclosedElement("div".into()).into();
        assert_eq!(err.to_string(), "markup error: unclosed element <div>");
    }
}
