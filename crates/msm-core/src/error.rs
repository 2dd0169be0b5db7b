use thiserror::Error;

/// Invalid numeric or temporal input rejected by a structural primitive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimitiveError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("inverted window: end {end} must be greater than start {start}")]
    InvertedWindow { start: f64, end: f64 },

    #[error("timestamp {value} at index {index} is outside window [{start}, {end}]")]
    OutsideWindow {
        index: usize,
        value: f64,
        start: f64,
        end: f64,
    },

    #[error("{field} must be strictly increasing (index {index}: {previous} -> {value})")]
    NonMonotonic {
        field: &'static str,
        index: usize,
        previous: f64,
        value: f64,
    },

    #[error("{field} contains an empty identifier at index {index}")]
    EmptyIdentifier { field: &'static str, index: usize },

    #[error("{left} has {left_len} entries but {right} has {right_len}")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Terminal failure of a gateway call. No variant is transient.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("epistemic safety violation: {0}")]
    EpistemicSafety(String),

    #[error("determinism violation: {0}")]
    Determinism(String),

    #[error(transparent)]
    InvalidInput(#[from] PrimitiveError),
}

impl AccessError {
    /// Stable kind label used by transports that cannot carry the enum.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::AccessDenied(_) => "ACCESS_DENIED",
            AccessError::SchemaValidation(_) => "SCHEMA_VALIDATION",
            AccessError::EpistemicSafety(_) => "EPISTEMIC_SAFETY",
            AccessError::Determinism(_) => "DETERMINISM",
            AccessError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

pub type PrimitiveResult<T> = std::result::Result<T, PrimitiveError>;
pub type Result<T> = std::result::Result<T, AccessError>;
