//! Collateral custody: lock at issuance, return on full repayment, seize on default.

use std::sync::Arc;

use accord_core::config::CollateralConfig;
use accord_core::{
    AccountId, AgreementId, Amount, AuthorizationStore, Capability, Notification,
    TermsContractParameters, TermsParameters, Timestamp, TokenId,
};
use accord_ledger::{TokenRegistry, Transfer};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::CollateralError;
use crate::registry::AgreementRegistry;
use crate::services::Services;
use crate::terms::TermsContractRegistry;

const COMPONENT: &str = "collateral";

/// Collateral hook invoked by the kernel while committing a fill.
pub trait Collateralizer: Send + Sync {
    /// Whether the packed parameters describe any collateral.
    fn requires_collateral(&self, params: &TermsContractParameters) -> Result<bool, CollateralError>;

    /// Move the collateral of `agreement_id` from `party` into custody.
    fn lock(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        party: &AccountId,
    ) -> Result<CollateralLock, CollateralError>;

    /// Return the collateral and forget the lock, as if it had never been taken.
    fn unwind_lock(&self, caller: &AccountId, agreement_id: &AgreementId) -> Result<(), CollateralError>;
}

/// Collateral held for one agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralLock {
    pub agreement_id: AgreementId,
    /// Account the collateral came from and returns to.
    pub party: AccountId,
    pub token: TokenId,
    pub amount: Amount,
    pub grace_period_days: u8,
    pub locked_at: Timestamp,
}

/// How a lock was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    Locked,
    Returned,
    Seized,
}

#[derive(Debug, Clone)]
struct LockEntry {
    lock: CollateralLock,
    status: LockStatus,
}

/// Holds collateral in its own custody account.
///
/// Each lock is resolved at most once: returned to the locking party or
/// seized for the current beneficiary.
pub struct CollateralManager {
    custody: AccountId,
    auth: AuthorizationStore,
    registry: Arc<AgreementRegistry>,
    terms: Arc<TermsContractRegistry>,
    tokens: Arc<TokenRegistry>,
    services: Services,
    grace_day_seconds: u64,
    locks: DashMap<AgreementId, LockEntry>,
}

impl CollateralManager {
    pub fn new(
        custody: AccountId,
        owner: AccountId,
        config: &CollateralConfig,
        registry: Arc<AgreementRegistry>,
        terms: Arc<TermsContractRegistry>,
        tokens: Arc<TokenRegistry>,
        services: Services,
    ) -> Self {
        Self {
            custody,
            auth: AuthorizationStore::new(COMPONENT, owner),
            registry,
            terms,
            tokens,
            services,
            grace_day_seconds: config.grace_day_seconds,
            locks: DashMap::new(),
        }
    }

    /// Account holding locked collateral.
    pub fn custody_account(&self) -> AccountId {
        self.custody
    }

    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// The lock of `agreement_id` if it is still held.
    pub fn active_lock(&self, agreement_id: &AgreementId) -> Option<CollateralLock> {
        self.locks
            .get(agreement_id)
            .filter(|e| e.status == LockStatus::Locked)
            .map(|e| e.lock.clone())
    }

    /// Current status of the lock of `agreement_id`, if one was ever taken.
    pub fn resolution(&self, agreement_id: &AgreementId) -> Option<LockStatus> {
        self.locks.get(agreement_id).map(|e| e.status)
    }

    /// Return collateral to the locking party once the debt is fully repaid.
    pub fn release(&self, agreement_id: &AgreementId) -> Result<CollateralLock, CollateralError> {
        if self.auth.is_paused() {
            return Err(CollateralError::Paused);
        }
        let mut entry = self
            .locks
            .get_mut(agreement_id)
            .ok_or(CollateralError::NoLock(*agreement_id))?;
        if entry.status != LockStatus::Locked {
            return Err(CollateralError::AlreadyResolved(*agreement_id));
        }

        let (terms_ref, _) = self.registry.get_terms_reference(agreement_id)?;
        let terms = self.terms.get(&terms_ref)?;
        let term_end = terms.term_end_timestamp(agreement_id)?;
        let expected = terms.expected_repayment_value(agreement_id, term_end)?;
        let repaid = terms.value_repaid_to_date(agreement_id)?;
        if repaid < expected {
            tracing::warn!(
                agreement = %agreement_id.short(),
                repaid,
                expected,
                "collateral release refused"
            );
            return Err(CollateralError::DebtInDefault(*agreement_id));
        }

        let lock = entry.lock.clone();
        self.services
            .ledger
            .transfer(&self.custody, &lock.token, &lock.party, lock.amount)
            .map_err(CollateralError::TransferFailed)?;
        entry.status = LockStatus::Returned;
        drop(entry);

        tracing::info!(
            agreement = %agreement_id.short(),
            party = %lock.party.short(),
            amount = lock.amount,
            "collateral returned"
        );
        self.services.notify(
            COMPONENT,
            Notification::CollateralReturned {
                agreement_id: *agreement_id,
                party: lock.party,
                token: lock.token,
                amount: lock.amount,
            },
        );
        Ok(lock)
    }

    /// Transfer collateral to the current beneficiary once the debtor is in
    /// default beyond the grace period.
    pub fn seize(&self, agreement_id: &AgreementId) -> Result<CollateralLock, CollateralError> {
        if self.auth.is_paused() {
            return Err(CollateralError::Paused);
        }
        let mut entry = self
            .locks
            .get_mut(agreement_id)
            .ok_or(CollateralError::NoLock(*agreement_id))?;
        if entry.status != LockStatus::Locked {
            return Err(CollateralError::AlreadyResolved(*agreement_id));
        }

        let (terms_ref, _) = self.registry.get_terms_reference(agreement_id)?;
        let terms = self.terms.get(&terms_ref)?;
        let grace = (entry.lock.grace_period_days as u64).saturating_mul(self.grace_day_seconds);
        let checkpoint = self.services.now().saturating_sub(grace);
        let expected = terms.expected_repayment_value(agreement_id, checkpoint)?;
        let repaid = terms.value_repaid_to_date(agreement_id)?;
        if repaid >= expected {
            tracing::warn!(
                agreement = %agreement_id.short(),
                repaid,
                expected,
                checkpoint,
                "collateral seizure refused"
            );
            return Err(CollateralError::DebtNotInDefault(*agreement_id));
        }

        let beneficiary = self.registry.get_beneficiary(agreement_id)?;
        let lock = entry.lock.clone();
        self.services
            .ledger
            .transfer(&self.custody, &lock.token, &beneficiary, lock.amount)
            .map_err(CollateralError::TransferFailed)?;
        entry.status = LockStatus::Seized;
        drop(entry);

        tracing::info!(
            agreement = %agreement_id.short(),
            beneficiary = %beneficiary.short(),
            amount = lock.amount,
            "collateral seized"
        );
        self.services.notify(
            COMPONENT,
            Notification::CollateralSeized {
                agreement_id: *agreement_id,
                beneficiary,
                token: lock.token,
                amount: lock.amount,
            },
        );
        Ok(lock)
    }
}

impl Collateralizer for CollateralManager {
    fn requires_collateral(&self, params: &TermsContractParameters) -> Result<bool, CollateralError> {
        Ok(TermsParameters::decode(params)?.collateral.is_some())
    }

    fn lock(
        &self,
        caller: &AccountId,
        agreement_id: &AgreementId,
        party: &AccountId,
    ) -> Result<CollateralLock, CollateralError> {
        if self.auth.is_paused() {
            return Err(CollateralError::Paused);
        }
        self.auth.require(Capability::Collateralize, caller)?;

        let (_, packed) = self.registry.get_terms_reference(agreement_id)?;
        let collateral = TermsParameters::decode(&packed)?
            .collateral
            .ok_or(CollateralError::NoCollateral(*agreement_id))?;
        let token = self
            .tokens
            .token_by_index(collateral.token_index)
            .ok_or(CollateralError::InvalidCollateralToken(collateral.token_index))?;

        let slot = match self.locks.entry(*agreement_id) {
            Entry::Occupied(_) => return Err(CollateralError::AlreadyLocked(*agreement_id)),
            Entry::Vacant(slot) => slot,
        };

        let transfer = Transfer::new(token, *party, self.custody, collateral.amount);
        self.services
            .ledger
            .transfer_from(&self.custody, &transfer)
            .map_err(|e| {
                tracing::warn!(agreement = %agreement_id.short(), error = %e, "collateral lock failed");
                CollateralError::TransferFailed(e)
            })?;

        let lock = CollateralLock {
            agreement_id: *agreement_id,
            party: *party,
            token,
            amount: collateral.amount,
            grace_period_days: collateral.grace_period_days,
            locked_at: self.services.now(),
        };
        slot.insert(LockEntry {
            lock: lock.clone(),
            status: LockStatus::Locked,
        });

        tracing::info!(
            agreement = %agreement_id.short(),
            party = %party.short(),
            amount = lock.amount,
            "collateral locked"
        );
        self.services.notify(
            COMPONENT,
            Notification::CollateralLocked {
                agreement_id: *agreement_id,
                party: *party,
                token,
                amount: lock.amount,
            },
        );
        Ok(lock)
    }

    fn unwind_lock(&self, caller: &AccountId, agreement_id: &AgreementId) -> Result<(), CollateralError> {
        self.auth.require(Capability::Collateralize, caller)?;

        let entry = self
            .locks
            .get(agreement_id)
            .map(|e| e.clone())
            .ok_or(CollateralError::NoLock(*agreement_id))?;
        if entry.status != LockStatus::Locked {
            return Err(CollateralError::AlreadyResolved(*agreement_id));
        }

        let lock = entry.lock;
        self.services
            .ledger
            .transfer(&self.custody, &lock.token, &lock.party, lock.amount)
            .map_err(CollateralError::TransferFailed)?;
        self.locks.remove(agreement_id);

        tracing::warn!(agreement = %agreement_id.short(), "collateral lock unwound");
        Ok(())
    }
}
