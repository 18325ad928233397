/// Core protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("terms parameter field `{field}` does not fit in {bits} bits")]
    FieldOverflow { field: &'static str, bits: u32 },

    #[error("unknown amortization unit code: {0}")]
    UnknownAmortizationUnit(u8),

    #[error("invalid terms parameters: {0}")]
    InvalidTermsParameters(String),
}
