use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EscrowError;

/// Lifecycle of a pooled escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowState {
    /// Accepting deposits toward the target.
    Collecting,
    /// Target reached; waiting for the regulator to fund a loan.
    Funded,
    /// Loan issued; repayments are being collected.
    AwaitingRepayment,
    /// Debt fully repaid; depositors draw their remaining entitlement.
    ReadyToWithdraw,
    /// Every depositor settled. Final state.
    Closed,
}

impl EscrowState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether depositors may draw funds in this state.
    pub fn allows_withdrawal(&self) -> bool {
        matches!(self, Self::AwaitingRepayment | Self::ReadyToWithdraw)
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collecting => write!(f, "Collecting"),
            Self::Funded => write!(f, "Funded"),
            Self::AwaitingRepayment => write!(f, "AwaitingRepayment"),
            Self::ReadyToWithdraw => write!(f, "ReadyToWithdraw"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Events that trigger escrow state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowEvent {
    /// Deposits reached the target.
    TargetReached,
    /// The kernel issued the loan with the escrow as creditor.
    LoanFunded,
    /// Value repaid reached the total expected repayment.
    DebtFullyRepaid,
    /// Every depositor has drawn their full entitlement.
    AllSettled,
}

/// Escrow transition table.
///
/// - Collecting → Funded (TargetReached)
/// - Funded → AwaitingRepayment (LoanFunded)
/// - AwaitingRepayment → ReadyToWithdraw (DebtFullyRepaid)
/// - ReadyToWithdraw → Closed (AllSettled)
pub struct EscrowStateMachine;

impl EscrowStateMachine {
    pub fn transition(current: EscrowState, event: EscrowEvent) -> Result<EscrowState, EscrowError> {
        let new_state = match (current, event) {
            (EscrowState::Collecting, EscrowEvent::TargetReached) => EscrowState::Funded,
            (EscrowState::Funded, EscrowEvent::LoanFunded) => EscrowState::AwaitingRepayment,
            (EscrowState::AwaitingRepayment, EscrowEvent::DebtFullyRepaid) => {
                EscrowState::ReadyToWithdraw
            }
            (EscrowState::ReadyToWithdraw, EscrowEvent::AllSettled) => EscrowState::Closed,
            _ => {
                return Err(EscrowError::InvalidTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "escrow state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(current: EscrowState, event: EscrowEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
