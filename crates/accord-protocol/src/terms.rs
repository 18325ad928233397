use std::sync::Arc;

use accord_core::{AccountId, AgreementId, Amount, AuthorizationStore, Timestamp, TokenId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::TermsError;

/// Pluggable interest and repayment schedule of an agreement.
///
/// The kernel starts the term when an agreement is issued and the router
/// reports each repayment; collateral and escrow logic only read.
pub trait TermsContract: Send + Sync {
    /// Account under which this terms contract is registered and referenced.
    fn terms_id(&self) -> AccountId;

    /// Begin the term of a freshly issued agreement.
    fn register_term_start(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        debtor: &AccountId,
    ) -> Result<(), TermsError>;

    /// Record a repayment forwarded to the beneficiary.
    fn register_repayment(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        payer: &AccountId,
        beneficiary: &AccountId,
        amount: Amount,
        token: &TokenId,
    ) -> Result<(), TermsError>;

    /// Cumulative value the debtor is expected to have repaid by `timestamp`.
    fn expected_repayment_value(
        &self,
        agreement_id: &AgreementId,
        timestamp: Timestamp,
    ) -> Result<Amount, TermsError>;

    /// Cumulative value repaid so far.
    fn value_repaid_to_date(&self, agreement_id: &AgreementId) -> Result<Amount, TermsError>;

    /// Time at which the full expected value falls due.
    fn term_end_timestamp(&self, agreement_id: &AgreementId) -> Result<Timestamp, TermsError>;
}

/// Terms contracts resolvable by the reference stored in agreement records.
pub struct TermsContractRegistry {
    contracts: DashMap<AccountId, Arc<dyn TermsContract>>,
    auth: AuthorizationStore,
}

impl TermsContractRegistry {
    pub fn new(owner: AccountId) -> Self {
        Self {
            contracts: DashMap::new(),
            auth: AuthorizationStore::new("terms_registry", owner),
        }
    }

    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// Register a terms contract under its own id. Owner only.
    pub fn register(
        &self,
        caller: &AccountId,
        contract: Arc<dyn TermsContract>,
    ) -> Result<AccountId, TermsError> {
        self.auth.ensure_owner(caller)?;
        let id = contract.terms_id();
        match self.contracts.entry(id) {
            Entry::Occupied(_) => Err(TermsError::DuplicateTermsContract(id)),
            Entry::Vacant(slot) => {
                slot.insert(contract);
                tracing::info!(terms_contract = %id.short(), "terms contract registered");
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: &AccountId) -> Result<Arc<dyn TermsContract>, TermsError> {
        self.contracts
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(TermsError::UnknownTermsContract(*id))
    }

    pub fn contains(&self, id: &AccountId) -> bool {
        self.contracts.contains_key(id)
    }

    pub fn ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.contracts.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}
