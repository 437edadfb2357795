use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn planning(code: PlanningErrorCode, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Planning {
                code,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn arithmetic(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Arithmetic {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn storage(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Storage {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn deadline_exceeded(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::DeadlineExceeded {
                context: context.into(),
            }
            .into(),
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn serialization<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Serialization {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }

    /// Returns the planning error code when this is a planning failure.
    pub fn planning_code(&self) -> Option<PlanningErrorCode> {
        match self.kind() {
            ErrorKind::Planning { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.kind(), ErrorKind::DeadlineExceeded { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("query planning failed ({code}): {message}")]
    Planning {
        code: PlanningErrorCode,
        message: String,
    },

    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("deadline exceeded while {context}")]
    DeadlineExceeded { context: String },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("serialization error: {context}")]
    Serialization {
        context: String,
        source: StdErrorBoxed,
    },
}

/// Classifies fatal planning failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanningErrorCode {
    /// More than one range, or an open range, inside a bounded-range marker.
    MultipleRanges,
    /// A marker node wraps an expression shape it cannot carry.
    UnexpectedSourceNode,
    /// The whole query is a negation.
    NegationAtRoot,
    /// The root term references a field excluded from index use.
    BlacklistedRoot,
    /// An intersection was requested while document ids are unsorted.
    UnsortedIntersection,
    /// An intersection node ended up with nothing to drive it.
    EmptyIntersection,
    /// A pattern could not be compiled.
    InvalidPattern,
}

impl fmt::Display for PlanningErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanningErrorCode::MultipleRanges => "multiple ranges in expression",
            PlanningErrorCode::UnexpectedSourceNode => "unexpected source node",
            PlanningErrorCode::NegationAtRoot => "root node cannot be a negation",
            PlanningErrorCode::BlacklistedRoot => "root references an excluded field",
            PlanningErrorCode::UnsortedIntersection => "intersection over unsorted ids",
            PlanningErrorCode::EmptyIntersection => "intersection without includes",
            PlanningErrorCode::InvalidPattern => "invalid pattern",
        };
        f.write_str(name)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_code() {
        let err = Error::planning(PlanningErrorCode::NegationAtRoot, "!(A == 'x')");
        assert_eq!(err.planning_code(), Some(PlanningErrorCode::NegationAtRoot));
        assert_eq!(
            err.to_string(),
            "query planning failed (root node cannot be a negation): !(A == 'x')"
        );
        assert_eq!(Error::storage("x").planning_code(), None);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
        assert!(!err.is_deadline_exceeded());
        assert!(Error::deadline_exceeded("scanning").is_deadline_exceeded());
    }
}
