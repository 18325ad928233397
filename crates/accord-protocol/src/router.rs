//! Repayment routing to the current beneficiary of an agreement.

use std::sync::Arc;

use accord_core::{AccountId, AgreementId, Amount, AuthorizationStore, Notification, Timestamp, TokenId};
use accord_ledger::Transfer;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RouterError};
use crate::registry::AgreementRegistry;
use crate::services::Services;
use crate::terms::TermsContractRegistry;

const COMPONENT: &str = "router";

/// Recoverable reasons a repayment was not made. Reported, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentDiagnostic {
    AgreementNotFound,
    PayerBalanceOrAllowanceInsufficient,
}

impl RepaymentDiagnostic {
    pub fn code(&self) -> u8 {
        match self {
            Self::AgreementNotFound => 0,
            Self::PayerBalanceOrAllowanceInsufficient => 1,
        }
    }
}

/// A completed repayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentReceipt {
    pub agreement_id: AgreementId,
    pub payer: AccountId,
    pub beneficiary: AccountId,
    pub amount: Amount,
    pub token: TokenId,
    pub repaid_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentOutcome {
    Repaid(RepaymentReceipt),
    Rejected(RepaymentDiagnostic),
}

impl RepaymentOutcome {
    pub fn is_repaid(&self) -> bool {
        matches!(self, Self::Repaid(_))
    }
}

pub struct RepaymentRouter {
    account: AccountId,
    auth: AuthorizationStore,
    registry: Arc<AgreementRegistry>,
    terms: Arc<TermsContractRegistry>,
    services: Services,
}

impl RepaymentRouter {
    pub fn new(
        account: AccountId,
        owner: AccountId,
        registry: Arc<AgreementRegistry>,
        terms: Arc<TermsContractRegistry>,
        services: Services,
    ) -> Self {
        Self {
            account,
            auth: AuthorizationStore::new(COMPONENT, owner),
            registry,
            terms,
            services,
        }
    }

    /// Account the router acts as on the ledger and toward terms contracts.
    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// Forward `amount` of `token` from `payer` to the agreement's current
    /// beneficiary and record it with the agreement's terms contract.
    ///
    /// A missing agreement or an underfunded payer yields
    /// [`RepaymentOutcome::Rejected`] with no state change.
    pub fn repay(
        &self,
        payer: &AccountId,
        agreement_id: &AgreementId,
        amount: Amount,
        token: &TokenId,
    ) -> Result<RepaymentOutcome, RouterError> {
        if self.auth.is_paused() {
            return Err(RouterError::Paused);
        }
        if token.is_null() {
            return Err(RouterError::InvalidToken);
        }
        if amount == 0 {
            return Err(RouterError::InvalidAmount);
        }

        let record = match self.registry.get(agreement_id) {
            Ok(record) => record,
            Err(RegistryError::UnknownAgreement(_)) => {
                return Ok(self.reject(payer, agreement_id, RepaymentDiagnostic::AgreementNotFound))
            }
            Err(e) => return Err(e.into()),
        };

        let ledger = &self.services.ledger;
        if ledger.balance_of(token, payer) < amount || ledger.allowance_of(token, payer) < amount {
            return Ok(self.reject(
                payer,
                agreement_id,
                RepaymentDiagnostic::PayerBalanceOrAllowanceInsufficient,
            ));
        }

        let terms = self.terms.get(&record.terms_contract)?;
        let transfer = Transfer::new(*token, *payer, record.beneficiary, amount);
        ledger.transfer_from(&self.account, &transfer)?;

        if let Err(e) = terms.register_repayment(
            &self.account,
            agreement_id,
            payer,
            &record.beneficiary,
            amount,
            token,
        ) {
            tracing::warn!(
                agreement = %agreement_id.short(),
                error = %e,
                "terms refused repayment, reversing transfer"
            );
            if let Err(reverse) = ledger.reverse_batch(&self.account, &[transfer]) {
                tracing::error!(
                    agreement = %agreement_id.short(),
                    error = %reverse,
                    "failed to reverse repayment transfer"
                );
            }
            return Err(e.into());
        }

        let receipt = RepaymentReceipt {
            agreement_id: *agreement_id,
            payer: *payer,
            beneficiary: record.beneficiary,
            amount,
            token: *token,
            repaid_at: self.services.now(),
        };
        tracing::info!(
            agreement = %agreement_id.short(),
            payer = %payer.short(),
            beneficiary = %record.beneficiary.short(),
            amount,
            "repayment routed"
        );
        self.services.notify(
            COMPONENT,
            Notification::Repayment {
                agreement_id: *agreement_id,
                payer: *payer,
                beneficiary: record.beneficiary,
                amount,
                token: *token,
            },
        );
        Ok(RepaymentOutcome::Repaid(receipt))
    }

    fn reject(
        &self,
        payer: &AccountId,
        agreement_id: &AgreementId,
        diagnostic: RepaymentDiagnostic,
    ) -> RepaymentOutcome {
        tracing::warn!(
            agreement = %agreement_id.short(),
            payer = %payer.short(),
            code = diagnostic.code(),
            ?diagnostic,
            "repayment rejected"
        );
        self.services.notify(
            COMPONENT,
            Notification::RepaymentRejected {
                agreement_id: *agreement_id,
                payer: *payer,
                code: diagnostic.code(),
            },
        );
        RepaymentOutcome::Rejected(diagnostic)
    }
}
