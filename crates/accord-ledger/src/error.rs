use accord_core::{AccountId, Amount, AuthorizationError, TokenId};

/// Ledger-layer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance of {token} for {account}: available {available}, required {required}")]
    InsufficientBalance {
        token: TokenId,
        account: AccountId,
        available: Amount,
        required: Amount,
    },

    #[error("insufficient allowance of {token} from {owner}: available {available}, required {required}")]
    InsufficientAllowance {
        token: TokenId,
        owner: AccountId,
        available: Amount,
        required: Amount,
    },

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("the null account cannot hold or move tokens")]
    NullAccount,

    #[error("the null token cannot be moved")]
    NullToken,

    #[error("amount must be non-zero")]
    InvalidAmount,

    #[error("balance of {token} for {account} would overflow")]
    Overflow { token: TokenId, account: AccountId },

    #[error("token index {0} is already registered")]
    TokenIndexTaken(u8),

    #[error("token {0} is already registered")]
    DuplicateToken(TokenId),
}
