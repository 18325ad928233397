//! Simple-interest reference terms over the packed parameter layout.
//!
//! Total expected repayment is `principal + principal * rate * term_length`
//! (rate per amortization unit, 4 decimals). The expectation grows linearly
//! per whole unit elapsed and reaches the total at term end.

use std::sync::Arc;

use accord_core::terms_params::RATE_ONE_HUNDRED_PERCENT;
use accord_core::{AccountId, AgreementId, Amount, CoreError, TermsParameters, Timestamp, TokenId};
use accord_ledger::TokenRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::TermsError;
use crate::registry::AgreementRegistry;
use crate::terms::TermsContract;

/// Principal plus interest over the whole term.
pub fn total_expected_repayment(params: &TermsParameters) -> Result<Amount, TermsError> {
    let interest = params
        .principal_amount
        .checked_mul(params.interest_rate as Amount)
        .and_then(|v| v.checked_mul(params.term_length as Amount))
        .ok_or(TermsError::Overflow("interest"))?
        / RATE_ONE_HUNDRED_PERCENT;
    params
        .principal_amount
        .checked_add(interest)
        .ok_or(TermsError::Overflow("total expected repayment"))
}

/// Equal installment per amortization unit, rounded up.
pub fn installment_amount(params: &TermsParameters) -> Result<Amount, TermsError> {
    let total = total_expected_repayment(params)?;
    if params.term_length == 0 {
        return Ok(total);
    }
    Ok(total.div_ceil(params.term_length as Amount))
}

/// Cumulative expectation at `timestamp` for a term that started at `start`.
pub fn expected_at(
    params: &TermsParameters,
    start: Timestamp,
    timestamp: Timestamp,
) -> Result<Amount, TermsError> {
    if timestamp < start {
        return Ok(0);
    }
    let total = total_expected_repayment(params)?;
    let units_elapsed = (timestamp - start) / params.amortization_unit.seconds();
    let term_length = params.term_length as u64;
    if units_elapsed >= term_length {
        return Ok(total);
    }
    total
        .checked_mul(units_elapsed as Amount)
        .map(|v| v / term_length as Amount)
        .ok_or(TermsError::Overflow("expected repayment"))
}

#[derive(Debug, Clone)]
struct Term {
    params: TermsParameters,
    principal_token: TokenId,
    start: Timestamp,
    repaid: Amount,
}

/// Reference [`TermsContract`] charging simple interest.
///
/// Only the kernel may start a term and only the router may report repayments.
pub struct SimpleInterestTerms {
    id: AccountId,
    kernel: AccountId,
    router: AccountId,
    registry: Arc<AgreementRegistry>,
    tokens: Arc<TokenRegistry>,
    terms: DashMap<AgreementId, Term>,
}

impl SimpleInterestTerms {
    pub fn new(
        id: AccountId,
        kernel: AccountId,
        router: AccountId,
        registry: Arc<AgreementRegistry>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        Self {
            id,
            kernel,
            router,
            registry,
            tokens,
            terms: DashMap::new(),
        }
    }

    /// Decoded parameters of a started term.
    pub fn parameters(&self, agreement_id: &AgreementId) -> Result<TermsParameters, TermsError> {
        self.terms
            .get(agreement_id)
            .map(|t| t.params)
            .ok_or(TermsError::TermNotStarted(*agreement_id))
    }

    pub fn installment(&self, agreement_id: &AgreementId) -> Result<Amount, TermsError> {
        installment_amount(&self.parameters(agreement_id)?)
    }
}

impl TermsContract for SimpleInterestTerms {
    fn terms_id(&self) -> AccountId {
        self.id
    }

    fn register_term_start(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        debtor: &AccountId,
    ) -> Result<(), TermsError> {
        if *caller != self.kernel {
            return Err(TermsError::UnauthorizedCaller {
                caller: *caller,
                operation: "register_term_start",
            });
        }

        let record = self.registry.get(agreement_id)?;
        if record.terms_contract != self.id || record.debtor != *debtor {
            return Err(TermsError::ForeignAgreement(*agreement_id));
        }

        let params = TermsParameters::decode(&record.terms_parameters)?;
        if params.term_length == 0 {
            return Err(CoreError::InvalidTermsParameters("term length must be non-zero".into()).into());
        }
        let principal_token = self
            .tokens
            .token_by_index(params.principal_token_index)
            .ok_or(TermsError::UnknownToken(params.principal_token_index))?;
        total_expected_repayment(&params)?;

        match self.terms.entry(*agreement_id) {
            Entry::Occupied(_) => Err(TermsError::TermAlreadyStarted(*agreement_id)),
            Entry::Vacant(slot) => {
                slot.insert(Term {
                    params,
                    principal_token,
                    start: record.issuance_timestamp,
                    repaid: 0,
                });
                tracing::info!(
                    agreement = %agreement_id.short(),
                    start = record.issuance_timestamp,
                    unit = %params.amortization_unit,
                    term_length = params.term_length,
                    "simple interest term started"
                );
                Ok(())
            }
        }
    }

    fn register_repayment(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        payer: &AccountId,
        _beneficiary: &AccountId,
        amount: Amount,
        token: &TokenId,
    ) -> Result<(), TermsError> {
        if *caller != self.router {
            return Err(TermsError::UnauthorizedCaller {
                caller: *caller,
                operation: "register_repayment",
            });
        }

        let mut term = self
            .terms
            .get_mut(agreement_id)
            .ok_or(TermsError::TermNotStarted(*agreement_id))?;
        if *token != term.principal_token {
            return Err(TermsError::WrongToken {
                expected: term.principal_token,
                actual: *token,
            });
        }
        term.repaid = term
            .repaid
            .checked_add(amount)
            .ok_or(TermsError::Overflow("value repaid"))?;

        tracing::debug!(
            agreement = %agreement_id.short(),
            payer = %payer.short(),
            amount,
            repaid = term.repaid,
            "repayment registered"
        );
        Ok(())
    }

    fn expected_repayment_value(
        &self,
        agreement_id: &AgreementId,
        timestamp: Timestamp,
    ) -> Result<Amount, TermsError> {
        let term = self
            .terms
            .get(agreement_id)
            .ok_or(TermsError::TermNotStarted(*agreement_id))?;
        expected_at(&term.params, term.start, timestamp)
    }

    fn value_repaid_to_date(&self, agreement_id: &AgreementId) -> Result<Amount, TermsError> {
        self.terms
            .get(agreement_id)
            .map(|t| t.repaid)
            .ok_or(TermsError::TermNotStarted(*agreement_id))
    }

    fn term_end_timestamp(&self, agreement_id: &AgreementId) -> Result<Timestamp, TermsError> {
        let term = self
            .terms
            .get(agreement_id)
            .ok_or(TermsError::TermNotStarted(*agreement_id))?;
        term.start
            .checked_add(term.params.term_length_seconds())
            .ok_or(TermsError::Overflow("term end"))
    }
}
