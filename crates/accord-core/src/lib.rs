//! Accord core: identifiers, authorization, clock, notifications, the packed
//! terms-parameter codec, and configuration shared by every component.

pub mod error;
pub mod types;
pub mod authorization;
pub mod clock;
pub mod events;
pub mod terms_params;
pub mod config;
pub mod telemetry;

pub use error::CoreError;
pub use types::{
    AccountId, AgreementId, Amount, OrderHash, RiskRating, TermsContractParameters, Timestamp,
    TokenId,
};
pub use authorization::{AuthorizationError, AuthorizationStore, Capability};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{MemorySink, Notification, NotificationRecord, NotificationSink, NullSink, TracingSink};
pub use terms_params::{AmortizationUnit, CollateralTerms, TermsParameters};
pub use config::ProtocolConfig;
