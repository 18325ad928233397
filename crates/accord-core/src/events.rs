//! Advisory notification records for off-system observers.
//!
//! Components emit a [`NotificationRecord`] for every committed mutation and
//! for every structured rejection. Sinks are injected; nothing in the protocol
//! depends on a record being delivered.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::types::{AccountId, AgreementId, Amount, OrderHash, RiskRating, Timestamp, TokenId};

/// Payload of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    AgreementInserted {
        agreement_id: AgreementId,
        beneficiary: AccountId,
        debtor: AccountId,
        underwriter: AccountId,
        underwriter_risk_rating: RiskRating,
        terms_contract: AccountId,
    },
    BeneficiaryTransferred {
        agreement_id: AgreementId,
        previous: AccountId,
        current: AccountId,
    },
    OrderFilled {
        agreement_id: AgreementId,
        order_hash: OrderHash,
        principal_amount: Amount,
        principal_token: TokenId,
        underwriter: AccountId,
        underwriter_fee: Amount,
        relayer: AccountId,
        relayer_fee: Amount,
    },
    FillRejected {
        order_hash: OrderHash,
        code: u8,
        reason: String,
    },
    IssuanceCancelled {
        agreement_id: AgreementId,
        cancelled_by: AccountId,
    },
    OrderCancelled {
        order_hash: OrderHash,
        cancelled_by: AccountId,
    },
    CollateralLocked {
        agreement_id: AgreementId,
        party: AccountId,
        token: TokenId,
        amount: Amount,
    },
    CollateralReturned {
        agreement_id: AgreementId,
        party: AccountId,
        token: TokenId,
        amount: Amount,
    },
    CollateralSeized {
        agreement_id: AgreementId,
        beneficiary: AccountId,
        token: TokenId,
        amount: Amount,
    },
    Repayment {
        agreement_id: AgreementId,
        payer: AccountId,
        beneficiary: AccountId,
        amount: Amount,
        token: TokenId,
    },
    RepaymentRejected {
        agreement_id: AgreementId,
        payer: AccountId,
        code: u8,
    },
    Deposit {
        depositor: AccountId,
        accepted: Amount,
        total_deposited: Amount,
    },
    LoanFunded {
        agreement_id: AgreementId,
        principal: Amount,
    },
    RepaymentObserved {
        agreement_id: AgreementId,
        value_repaid: Amount,
    },
    Withdrawal {
        depositor: AccountId,
        amount: Amount,
    },
    EscrowStateChanged {
        from: String,
        to: String,
    },
    ResidualSwept {
        token: TokenId,
        to: AccountId,
        amount: Amount,
    },
}

impl Notification {
    /// Stable snake_case name of the payload variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgreementInserted { .. } => "agreement_inserted",
            Self::BeneficiaryTransferred { .. } => "beneficiary_transferred",
            Self::OrderFilled { .. } => "order_filled",
            Self::FillRejected { .. } => "fill_rejected",
            Self::IssuanceCancelled { .. } => "issuance_cancelled",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::CollateralLocked { .. } => "collateral_locked",
            Self::CollateralReturned { .. } => "collateral_returned",
            Self::CollateralSeized { .. } => "collateral_seized",
            Self::Repayment { .. } => "repayment",
            Self::RepaymentRejected { .. } => "repayment_rejected",
            Self::Deposit { .. } => "deposit",
            Self::LoanFunded { .. } => "loan_funded",
            Self::RepaymentObserved { .. } => "repayment_observed",
            Self::Withdrawal { .. } => "withdrawal",
            Self::EscrowStateChanged { .. } => "escrow_state_changed",
            Self::ResidualSwept { .. } => "residual_swept",
        }
    }
}

/// A notification stamped with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Unique, time-ordered event id (UUID v7).
    pub event_id: Uuid,
    /// Emitting component.
    pub component: String,
    /// Clock time at emission.
    pub emitted_at: Timestamp,
    pub notification: Notification,
}

impl NotificationRecord {
    pub fn new(component: &str, emitted_at: Timestamp, notification: Notification) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            component: component.to_string(),
            emitted_at,
            notification,
        }
    }
}

/// Receiver of notification records.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, record: NotificationRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _record: NotificationRecord) {}
}

/// Writes every record to `tracing` as a JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, record: NotificationRecord) {
        match serde_json::to_string(&record.notification) {
            Ok(payload) => tracing::info!(
                target: "accord::notifications",
                event_id = %record.event_id,
                component = %record.component,
                kind = record.notification.kind(),
                %payload,
                "notification"
            ),
            Err(e) => tracing::warn!(
                target: "accord::notifications",
                event_id = %record.event_id,
                error = %e,
                "failed to render notification"
            ),
        }
    }
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<Vec<NotificationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records received so far.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records whose payload kind equals `kind`.
    pub fn of_kind(&self, kind: &str) -> Vec<NotificationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.notification.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, record: NotificationRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
