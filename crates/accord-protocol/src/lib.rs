//! Accord protocol
//!
//! The agreement registry, the terms-contract seam with its simple-interest
//! implementation, the debt kernel that fills orders, collateral custody,
//! repayment routing, and the pooled escrow that lends on behalf of many
//! depositors.

pub mod error;
pub mod services;
pub mod agreement;
pub mod registry;
pub mod terms;
pub mod simple_interest;
pub mod collateral;
pub mod kernel;
pub mod router;
pub mod escrow_state;
pub mod escrow;

pub use error::{
    CollateralError, ConsentCheck, EscrowError, KernelError, RegistryError, RouterError, TermsError,
};
pub use services::Services;
pub use agreement::{AgreementRecord, DebtOrder, Issuance, OrderSignatures};
pub use registry::AgreementRegistry;
pub use terms::{TermsContract, TermsContractRegistry};
pub use simple_interest::SimpleInterestTerms;
pub use collateral::{CollateralLock, CollateralManager, Collateralizer, LockStatus};
pub use kernel::DebtKernel;
pub use router::{RepaymentDiagnostic, RepaymentOutcome, RepaymentReceipt, RepaymentRouter};
pub use escrow_state::{EscrowEvent, EscrowState, EscrowStateMachine};
pub use escrow::{DepositorPosition, EscrowParams, EscrowSnapshot, Payout, PooledEscrow};
