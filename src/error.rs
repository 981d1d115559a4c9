//! Crate error type.
//!
//! Errors raised while evaluating an expression are wrapped in
//! [`Error::InExpression`] on the way out, so a failure deep inside a nested
//! rule call reads as a chain: the outermost expression first, the failing
//! operation last. [`Error::root_cause`] strips those layers.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A run of characters that does not form any token.
    #[error("unrecognized token `{token}`")]
    Lex { token: String },

    /// Missing expected token, invalid leading token, invalid operator.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// An operand of the wrong kind for the operation.
    #[error("type error: {0}")]
    Type(String),

    /// Detaching or replacing a node without a parent, removing an absent child.
    #[error("structural error: {0}")]
    Structure(String),

    /// Division by zero or integer overflow.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    /// A registered modifier rejected its input.
    #[error("modifier `{name}` failed: {message}")]
    Modifier { name: String, message: String },

    #[error("in expression `{expression}`: {source}")]
    InExpression {
        expression: String,
        #[source]
        source: Box<Error>,
    },

    /// A malformed rule line, located in its source.
    #[error("{origin}:{line}: {source}")]
    Load {
        origin: String,
        line: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("malformed rule `{line}`: {message}")]
    Rule { line: String, message: String },

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    pub(crate) fn structure(message: impl Into<String>) -> Self {
        Error::Structure(message.into())
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        Error::Arithmetic(message.into())
    }

    pub(crate) fn rule(line: &str, message: impl Into<String>) -> Self {
        Error::Rule { line: line.to_string(), message: message.into() }
    }

    /// Attach the source text of the expression that failed.
    pub(crate) fn in_expression(expression: &str, source: Error) -> Self {
        Error::InExpression { expression: expression.to_string(), source: Box::new(source) }
    }

    /// The innermost error, with expression and load context removed.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::InExpression { source, .. } | Error::Load { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_context() {
        let inner = Error::UnknownModifier("shout".to_string());
        let err = Error::in_expression("=>greet", Error::in_expression("Name # shout", inner));

        assert!(matches!(err.root_cause(), Error::UnknownModifier(name) if name == "shout"));
        assert_eq!(
            err.to_string(),
            "in expression `=>greet`: in expression `Name # shout`: unknown modifier `shout`"
        );
    }

    #[test]
    fn load_error_reports_location() {
        let err = Error::Load { origin: "intro.hec".to_string(), line: 4, source: Box::new(Error::syntax("missing `)`")) };
        assert_eq!(err.to_string(), "intro.hec:4: syntax error: missing `)`");
    }
}
