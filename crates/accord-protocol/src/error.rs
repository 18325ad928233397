use accord_core::{AccountId, AgreementId, Amount, AuthorizationError, CoreError, OrderHash, TokenId};
use accord_ledger::LedgerError;

use crate::escrow_state::{EscrowEvent, EscrowState};

/// Agreement registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("agreement registry is paused")]
    Paused,

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("beneficiary must be a non-null account different from the current one")]
    InvalidBeneficiary,

    #[error("agreement {0} already exists")]
    DuplicateAgreement(AgreementId),

    #[error("agreement {0} does not exist")]
    UnknownAgreement(AgreementId),
}

/// Terms collaborator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TermsError {
    #[error("no terms contract registered under {0}")]
    UnknownTermsContract(AccountId),

    #[error("terms contract {0} is already registered")]
    DuplicateTermsContract(AccountId),

    #[error("{caller} may not call {operation}")]
    UnauthorizedCaller {
        caller: AccountId,
        operation: &'static str,
    },

    #[error("agreement {0} is not governed by this terms contract")]
    ForeignAgreement(AgreementId),

    #[error("term of agreement {0} has already started")]
    TermAlreadyStarted(AgreementId),

    #[error("term of agreement {0} has not started")]
    TermNotStarted(AgreementId),

    #[error("token index {0} is not registered")]
    UnknownToken(u8),

    #[error("repayment in {actual}, expected principal token {expected}")]
    WrongToken { expected: TokenId, actual: TokenId },

    #[error("invalid terms parameters: {0}")]
    InvalidParameters(#[from] CoreError),

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// Which consent signature failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentCheck {
    Debtor,
    Creditor,
    Underwriter,
}

impl std::fmt::Display for ConsentCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debtor => write!(f, "debtor"),
            Self::Creditor => write!(f, "creditor"),
            Self::Underwriter => write!(f, "underwriter"),
        }
    }
}

/// Order-filling kernel errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("debt kernel is paused")]
    Paused,

    #[error("malformed order: {0}")]
    InvalidOrder(&'static str),

    #[error("agreement {0} has already been issued")]
    AlreadyIssued(AgreementId),

    #[error("order has expired")]
    OrderExpired,

    #[error("issuance {0} was cancelled")]
    IssuanceCancelled(AgreementId),

    #[error("order {0} was cancelled")]
    OrderCancelled(OrderHash),

    #[error("relayer and underwriter fees must equal creditor and debtor fees")]
    FeeMismatch,

    #[error("principal is below the debtor fee")]
    PrincipalBelowFee,

    #[error("fee routed to a null recipient")]
    InvalidFeeRouting,

    #[error("order {0} differs from its terms parameters")]
    TermsMismatch(&'static str),

    #[error("{check} signature is missing or invalid")]
    InvalidSignature { check: ConsentCheck },

    #[error("creditor balance or allowance below {required}")]
    InsufficientFundsOrAllowance { required: Amount },

    #[error("only the debtor may cancel")]
    NotDebtor,

    #[error(transparent)]
    Terms(#[from] TermsError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Collateral(#[from] CollateralError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl KernelError {
    /// Stable diagnostic code of a fill precondition failure.
    ///
    /// `None` for errors that are not order, consent, or funding checks.
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::AlreadyIssued(_) => Some(0),
            Self::OrderExpired => Some(1),
            Self::IssuanceCancelled(_) => Some(2),
            Self::OrderCancelled(_) => Some(3),
            Self::FeeMismatch => Some(4),
            Self::PrincipalBelowFee => Some(5),
            Self::InvalidFeeRouting => Some(6),
            Self::InvalidSignature { .. } => Some(7),
            Self::InsufficientFundsOrAllowance { .. } => Some(8),
            Self::TermsMismatch(_) => Some(9),
            _ => None,
        }
    }
}

/// Collateral manager errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollateralError {
    #[error("collateral manager is paused")]
    Paused,

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("agreement {0} carries no collateral")]
    NoCollateral(AgreementId),

    #[error("collateral token index {0} is not registered")]
    InvalidCollateralToken(u8),

    #[error("collateral for agreement {0} is already locked")]
    AlreadyLocked(AgreementId),

    #[error("collateral transfer failed: {0}")]
    TransferFailed(LedgerError),

    #[error("no collateral lock for agreement {0}")]
    NoLock(AgreementId),

    #[error("collateral for agreement {0} has already been resolved")]
    AlreadyResolved(AgreementId),

    #[error("agreement {0} is not fully repaid")]
    DebtInDefault(AgreementId),

    #[error("agreement {0} is not in default")]
    DebtNotInDefault(AgreementId),

    #[error("invalid terms parameters: {0}")]
    InvalidParameters(#[from] CoreError),

    #[error(transparent)]
    Terms(#[from] TermsError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Repayment router errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("repayment router is paused")]
    Paused,

    #[error("repayment token must be non-null")]
    InvalidToken,

    #[error("repayment amount must be non-zero")]
    InvalidAmount,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Terms(#[from] TermsError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// Pooled escrow errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscrowError {
    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        state: EscrowState,
        operation: &'static str,
    },

    #[error("invalid escrow transition from {from} on {event:?}")]
    InvalidTransition { from: EscrowState, event: EscrowEvent },

    #[error("caller must be a non-null account")]
    InvalidCaller,

    #[error("amount must be non-zero")]
    InvalidAmount,

    #[error("{0} is not the escrow regulator")]
    NotRegulator(AccountId),

    #[error("borrower {0} is not certified")]
    BorrowerNotCertified(AccountId),

    #[error("borrower {0} is already certified")]
    AlreadyCertified(AccountId),

    #[error("{0} has no deposit in this escrow")]
    UnknownDepositor(AccountId),

    #[error("order rejected by escrow: {0}")]
    InvalidOrder(&'static str),

    #[error("pool holds {available}, loan requires {required}")]
    InsufficientPool { available: Amount, required: Amount },

    #[error("escrow balance {available} is below payout {required}")]
    InsufficientEscrowBalance { available: Amount, required: Amount },

    #[error("disbursements {disbursed} would exceed funds received {received}")]
    InvariantViolation { disbursed: Amount, received: Amount },

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Terms(#[from] TermsError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
