use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfaError {
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("Unable to evaluate the rule: {0}")]
    Eval(#[from] EvalError),
    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    Date(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("TVA form not found: {0}")]
    FormNotFound(String),
    #[error("TVA declaration not found: {0} ending on {1}")]
    RecordNotFound(String, NaiveDate),
    #[error("Validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Empty amount")]
    Empty,
    #[error("Cannot parse {0:?} to a decimal amount")]
    Invalid(String),
}

/// Reasons a single formula fails to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Expected {expected}, found {found:?}")]
    Malformed {
        expected: &'static str,
        found: String,
    },
    #[error("Not an amount: {0:?}")]
    InvalidAmount(String),
    #[error("Unclosed parenthesis")]
    UnclosedParenthesis,
    #[error("Unexpected closing parenthesis")]
    UnexpectedClose,
    #[error("Unexpected input after the %EVAL() group: {0:?}")]
    TrailingInput(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Amount overflow")]
    Overflow,
    #[error("Parentheses nested too deeply")]
    TooDeep,
    #[error("Account range {0:?} has an empty bound")]
    EmptyAccountRange(String),
    #[error("Balance query failed: {0}")]
    Balance(String),
}
