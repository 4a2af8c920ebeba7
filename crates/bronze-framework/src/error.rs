//! Error types for the Bronze framework.
//!
//! None of these escape the command engine at runtime: lex, parse and rule
//! failures are recovered per command. Only [`RegisterError`] surfaces, and
//! only at setup time.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by converters and fallible rules.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Why a message did not lex into tokens for a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// Prefix or trigger did not match.
    #[error("message does not match")]
    NotMatched,

    /// Quoting in the content is unbalanced.
    #[error("malformed content: {0}")]
    MalformedContent(String),
}

/// Why tokens did not parse into the declared parameters.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// More tokens than declared parameters.
    #[error("too many arguments: expected at most {expected}, got {got}")]
    TooManyArguments {
        /// Declared parameter count.
        expected: usize,
        /// Token count.
        got: usize,
    },

    /// A required parameter had no token.
    #[error("missing argument #{index} '{param}'")]
    MissingArgument {
        /// Parameter position.
        index: usize,
        /// Parameter name.
        param: String,
    },

    /// No converter is registered for a parameter type.
    #[error("no parse function for parameter #{index} '{param}' of type {type_name}")]
    NoParseFunction {
        /// Parameter position.
        index: usize,
        /// Parameter name.
        param: String,
        /// Declared type.
        type_name: &'static str,
    },

    /// The converter rejected the token.
    #[error("failed to parse '{token}' for parameter #{index} '{param}': {source}")]
    ParseFailed {
        /// Parameter position.
        index: usize,
        /// Parameter name.
        param: String,
        /// Offending token.
        token: String,
        /// Converter error.
        #[source]
        source: BoxError,
    },
}

/// Why a matched command did not execute.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// Lexing failed.
    #[error(transparent)]
    Lex(#[from] LexError),

    /// Parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A rule was not satisfied.
    #[error("rule not satisfied")]
    RuleRejected,
}

/// Setup-time registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// A trigger is already claimed by another command.
    #[error("trigger '{trigger}' of command '{command}' is already claimed by '{existing}'")]
    TriggerConflict {
        /// Conflicting token.
        trigger: String,
        /// Command being registered.
        command: String,
        /// Current owner.
        existing: String,
    },

    /// A prefix command without any trigger, or with an empty one.
    #[error("command '{command}' has an empty trigger")]
    EmptyTrigger {
        /// Command being registered.
        command: String,
    },

    /// A command without a prefix set.
    #[error("command '{command}' has no prefixes")]
    NoPrefixes {
        /// Command being registered.
        command: String,
    },

    /// The regular expression does not compile.
    #[error("invalid regex for command '{command}': {reason}")]
    InvalidRegex {
        /// Command being registered.
        command: String,
        /// Compiler message.
        reason: String,
    },

    /// No handler was attached.
    #[error("command '{command}' has no handler")]
    MissingHandler {
        /// Command being registered.
        command: String,
    },
}

/// Event handler registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventRegisterError {
    /// The name is not a known system event type.
    #[error("unknown system event type '{0}'")]
    UnknownEventType(String),
}

/// Result type for registration.
pub type RegisterResult<T> = Result<T, RegisterError>;
