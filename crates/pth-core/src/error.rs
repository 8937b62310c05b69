use thiserror::Error;

/// Errors from parsing a side layout table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("line {line}: unknown side `{cell}`")]
    UnknownSide { line: usize, cell: String },
    #[error("line {line}: user value in `{cell}` must be 0..=15")]
    InvalidUserValue { line: usize, cell: String },
    #[error("line {line}: expected {expected} columns, found {found}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("layout has more than 255 rows or columns")]
    TooLarge,
    #[error("layout is empty")]
    Empty,
}

/// Errors from parsing a keycode expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeycodeError {
    #[error("empty keycode")]
    Empty,
    #[error("unknown keycode `{0}`")]
    UnknownKeycode(String),
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("missing argument in `{0}`")]
    MissingArgument(String),
}

/// Rejected settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("min_overlap_ms ({min}) exceeds max_overlap_ms ({max})")]
    OverlapRange { min: u16, max: u16 },
    #[error("max_overlap_ms ({0}) must be below {max}", max = crate::timing::MAX_DUR)]
    OverlapTooLong(u16),
    #[error("suppression key 0x{0:04X} must not be a tap-hold keycode")]
    SuppressionKey(u16),
}
