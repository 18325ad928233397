//! Canonical store of issued agreements.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use accord_core::{
    AccountId, AgreementId, AuthorizationStore, Capability, Notification, TermsContractParameters,
    Timestamp,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::agreement::{AgreementRecord, Issuance};
use crate::error::RegistryError;
use crate::services::Services;

const COMPONENT: &str = "registry";

/// Agreement records keyed by agreement id.
///
/// Records are never deleted; only the beneficiary changes after insertion.
pub struct AgreementRegistry {
    records: DashMap<AgreementId, AgreementRecord>,
    by_debtor: RwLock<HashMap<AccountId, Vec<AgreementId>>>,
    auth: AuthorizationStore,
    services: Services,
}

impl AgreementRegistry {
    pub fn new(owner: AccountId, services: Services) -> Self {
        Self {
            records: DashMap::new(),
            by_debtor: RwLock::new(HashMap::new()),
            auth: AuthorizationStore::new(COMPONENT, owner),
            services,
        }
    }

    /// Insert and edit allow-lists, ownership, and the pause switch.
    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// Store a new agreement with `beneficiary` as its first beneficiary.
    pub fn insert(
        &self,
        caller: &AccountId,
        beneficiary: AccountId,
        issuance: &Issuance,
    ) -> Result<AgreementId, RegistryError> {
        if self.auth.is_paused() {
            return Err(RegistryError::Paused);
        }
        self.auth.require(Capability::Insert, caller)?;
        if beneficiary.is_null() {
            return Err(RegistryError::InvalidBeneficiary);
        }

        let agreement_id = issuance.agreement_id();
        let record = match self.records.entry(agreement_id) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateAgreement(agreement_id)),
            Entry::Vacant(slot) => {
                let record = AgreementRecord {
                    agreement_id,
                    version: issuance.version,
                    beneficiary,
                    debtor: issuance.debtor,
                    underwriter: issuance.underwriter,
                    underwriter_risk_rating: issuance.underwriter_risk_rating,
                    terms_contract: issuance.terms_contract,
                    terms_parameters: issuance.terms_parameters,
                    issuance_timestamp: self.services.now(),
                };
                slot.insert(record.clone());
                record
            }
        };

        self.by_debtor
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(record.debtor)
            .or_default()
            .push(agreement_id);

        tracing::info!(
            agreement = %agreement_id.short(),
            debtor = %record.debtor.short(),
            beneficiary = %beneficiary.short(),
            "agreement inserted"
        );
        self.services.notify(
            COMPONENT,
            Notification::AgreementInserted {
                agreement_id,
                beneficiary,
                debtor: record.debtor,
                underwriter: record.underwriter,
                underwriter_risk_rating: record.underwriter_risk_rating,
                terms_contract: record.terms_contract,
            },
        );
        Ok(agreement_id)
    }

    /// Reassign the right to receive repayments. Returns the previous beneficiary.
    pub fn transfer_beneficiary(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        new_beneficiary: AccountId,
    ) -> Result<AccountId, RegistryError> {
        if self.auth.is_paused() {
            return Err(RegistryError::Paused);
        }
        self.auth.require(Capability::Edit, caller)?;

        let mut record = self
            .records
            .get_mut(agreement_id)
            .ok_or(RegistryError::UnknownAgreement(*agreement_id))?;
        if new_beneficiary.is_null() || new_beneficiary == record.beneficiary {
            return Err(RegistryError::InvalidBeneficiary);
        }
        let previous = std::mem::replace(&mut record.beneficiary, new_beneficiary);
        drop(record);

        tracing::info!(
            agreement = %agreement_id.short(),
            previous = %previous.short(),
            current = %new_beneficiary.short(),
            "beneficiary transferred"
        );
        self.services.notify(
            COMPONENT,
            Notification::BeneficiaryTransferred {
                agreement_id: *agreement_id,
                previous,
                current: new_beneficiary,
            },
        );
        Ok(previous)
    }

    /// Undo an insert made earlier in the same kernel fill.
    pub(crate) fn revert_insert(&self, agreement_id: &AgreementId) {
        if let Some((_, record)) = self.records.remove(agreement_id) {
            let mut index = self.by_debtor.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(ids) = index.get_mut(&record.debtor) {
                ids.retain(|id| id != agreement_id);
                if ids.is_empty() {
                    index.remove(&record.debtor);
                }
            }
            tracing::warn!(agreement = %agreement_id.short(), "agreement insert reverted");
        }
    }

    pub fn get(&self, agreement_id: &AgreementId) -> Result<AgreementRecord, RegistryError> {
        self.records
            .get(agreement_id)
            .map(|r| r.clone())
            .ok_or(RegistryError::UnknownAgreement(*agreement_id))
    }

    pub fn get_beneficiary(&self, agreement_id: &AgreementId) -> Result<AccountId, RegistryError> {
        self.records
            .get(agreement_id)
            .map(|r| r.beneficiary)
            .ok_or(RegistryError::UnknownAgreement(*agreement_id))
    }

    /// Terms contract and its packed parameters.
    pub fn get_terms_reference(
        &self,
        agreement_id: &AgreementId,
    ) -> Result<(AccountId, TermsContractParameters), RegistryError> {
        self.records
            .get(agreement_id)
            .map(|r| (r.terms_contract, r.terms_parameters))
            .ok_or(RegistryError::UnknownAgreement(*agreement_id))
    }

    pub fn get_issuance_timestamp(&self, agreement_id: &AgreementId) -> Result<Timestamp, RegistryError> {
        self.records
            .get(agreement_id)
            .map(|r| r.issuance_timestamp)
            .ok_or(RegistryError::UnknownAgreement(*agreement_id))
    }

    pub fn contains(&self, agreement_id: &AgreementId) -> bool {
        self.records.contains_key(agreement_id)
    }

    /// Agreements of `debtor`, in insertion order.
    pub fn agreements_of_debtor(&self, debtor: &AccountId) -> Vec<AgreementId> {
        self.by_debtor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(debtor)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
