//! Short hints appended to failed tool output.
//!
//! Classification is keyword matching on the error text, not a mapping of
//! provider error codes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHint {
    Argument,
    Connectivity,
    Permission,
    Generic,
}

const ARGUMENT_WORDS: &[&str] = &[
    "argument",
    "parameter",
    "param",
    "missing field",
    "required",
    "invalid type",
    "schema",
    "参数",
];

const CONNECTIVITY_WORDS: &[&str] = &[
    "connection",
    "connect",
    "network",
    "timed out",
    "timeout",
    "unreachable",
    "refused",
    "channel",
    "unavailable",
    "连接",
];

const PERMISSION_WORDS: &[&str] = &[
    "permission",
    "denied",
    "forbidden",
    "unauthorized",
    "not allowed",
    "access",
    "权限",
];

impl ErrorHint {
    /// Pick a hint for an error message. Argument problems are checked
    /// first, then connectivity, then permissions.
    pub fn classify(error: &str) -> Self {
        let lower = error.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if mentions(ARGUMENT_WORDS) {
            Self::Argument
        } else if mentions(CONNECTIVITY_WORDS) {
            Self::Connectivity
        } else if mentions(PERMISSION_WORDS) {
            Self::Permission
        } else {
            Self::Generic
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Argument => "check the argument names and formats, or try different arguments",
            Self::Connectivity => "check that the tool provider is running and reachable",
            Self::Permission => "check that the operation is permitted for this account",
            Self::Generic => "retry later, or try a different approach",
        }
    }
}

impl fmt::Display for ErrorHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hint: {}", self.message())
    }
}

/// The error text followed by its hint on a new line.
pub fn with_hint(error: &str) -> String {
    format!("{error}\n{}", ErrorHint::classify(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(ErrorHint::classify("Invalid tool arguments: missing field `to`"), ErrorHint::Argument);
        assert_eq!(ErrorHint::classify("Connection refused (os error 111)"), ErrorHint::Connectivity);
        assert_eq!(
            ErrorHint::classify("Tool call timed out: send_email after 30s"),
            ErrorHint::Connectivity
        );
        assert_eq!(ErrorHint::classify("550 Permission denied"), ErrorHint::Permission);
        assert_eq!(ErrorHint::classify("mailbox is full"), ErrorHint::Generic);
    }

    #[test]
    fn argument_wins_over_connectivity() {
        assert_eq!(
            ErrorHint::classify("invalid parameter 'host': connection string malformed"),
            ErrorHint::Argument
        );
    }

    #[test]
    fn hint_is_appended() {
        let text = with_hint("403 Forbidden");
        assert!(text.starts_with("403 Forbidden\nHint: "));
        assert!(text.contains("permitted"));
    }
}
