//! Order-filling kernel.
//!
//! A fill runs three groups of checks in order (order validity, consent,
//! external funding) and commits only if all pass. The commit is a journal
//! of steps; when a step fails every applied step is compensated in reverse.

use std::sync::{Arc, Mutex, PoisonError};

use accord_core::{
    AccountId, AgreementId, Amount, AuthorizationStore, Notification, OrderHash, TermsParameters,
};
use accord_crypto::{verify_account, Signature};
use accord_ledger::{TokenRegistry, Transfer};
use dashmap::DashMap;

use crate::agreement::{DebtOrder, Issuance, OrderSignatures};
use crate::collateral::Collateralizer;
use crate::error::{ConsentCheck, KernelError, TermsError};
use crate::registry::AgreementRegistry;
use crate::services::Services;
use crate::terms::TermsContractRegistry;

const COMPONENT: &str = "kernel";

/// A commit step that has been applied and may need compensation.
enum CommitStep {
    Inserted(AgreementId),
    Transferred(Vec<Transfer>),
    CollateralLocked(AgreementId),
}

pub struct DebtKernel {
    account: AccountId,
    auth: AuthorizationStore,
    registry: Arc<AgreementRegistry>,
    terms: Arc<TermsContractRegistry>,
    tokens: Arc<TokenRegistry>,
    collateral: Arc<dyn Collateralizer>,
    services: Services,
    cancelled_issuances: DashMap<AgreementId, AccountId>,
    cancelled_orders: DashMap<OrderHash, AccountId>,
    fill_guard: Mutex<()>,
}

impl DebtKernel {
    pub fn new(
        account: AccountId,
        owner: AccountId,
        registry: Arc<AgreementRegistry>,
        terms: Arc<TermsContractRegistry>,
        tokens: Arc<TokenRegistry>,
        collateral: Arc<dyn Collateralizer>,
        services: Services,
    ) -> Self {
        Self {
            account,
            auth: AuthorizationStore::new(COMPONENT, owner),
            registry,
            terms,
            tokens,
            collateral,
            services,
            cancelled_issuances: DashMap::new(),
            cancelled_orders: DashMap::new(),
            fill_guard: Mutex::new(()),
        }
    }

    /// Account the kernel acts as; also the version bound into order hashes.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Ownership and pause switch.
    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    pub fn order_hash(&self, order: &DebtOrder) -> OrderHash {
        order.order_hash(&self.account)
    }

    pub fn underwriter_message_hash(&self, order: &DebtOrder) -> [u8; 32] {
        order.underwriter_message_hash(&self.account)
    }

    pub fn is_issuance_cancelled(&self, agreement_id: &AgreementId) -> bool {
        self.cancelled_issuances.contains_key(agreement_id)
    }

    pub fn is_order_cancelled(&self, order_hash: &OrderHash) -> bool {
        self.cancelled_orders.contains_key(order_hash)
    }

    /// Validate and, if every check passes, issue the agreement described by `order`.
    ///
    /// The creditor becomes the first beneficiary. On any failure the
    /// registry and every balance are left as they were.
    pub fn fill_order(
        &self,
        caller: &AccountId,
        order: &DebtOrder,
        signatures: &OrderSignatures,
    ) -> Result<AgreementId, KernelError> {
        if self.auth.is_paused() {
            return Err(KernelError::Paused);
        }
        if order.issuance.debtor.is_null() {
            return Err(KernelError::InvalidOrder("debtor is null"));
        }
        if order.creditor.is_null() {
            return Err(KernelError::InvalidOrder("creditor is null"));
        }
        if order.principal_token.is_null() {
            return Err(KernelError::InvalidOrder("principal token is null"));
        }
        if order.principal_amount == 0 {
            return Err(KernelError::InvalidOrder("principal is zero"));
        }
        self.terms.get(&order.issuance.terms_contract)?;

        let agreement_id = order.agreement_id();
        let order_hash = self.order_hash(order);

        let _guard = self.fill_guard.lock().unwrap_or_else(PoisonError::into_inner);

        let checks = self
            .check_order(order, &agreement_id, &order_hash)
            .and_then(|_| self.check_consent(caller, order, &order_hash, signatures))
            .and_then(|_| self.check_funding(order));
        if let Err(e) = checks {
            self.reject(&order_hash, &e);
            return Err(e);
        }

        let mut journal = Vec::new();
        if let Err(e) = self.commit(order, &agreement_id, &mut journal) {
            tracing::warn!(
                agreement = %agreement_id.short(),
                error = %e,
                steps = journal.len(),
                "fill commit failed, compensating"
            );
            self.compensate(journal);
            return Err(e);
        }

        tracing::info!(
            agreement = %agreement_id.short(),
            order = %order_hash.short(),
            debtor = %order.issuance.debtor.short(),
            creditor = %order.creditor.short(),
            principal = order.principal_amount,
            "order filled"
        );
        self.services.notify(
            COMPONENT,
            Notification::OrderFilled {
                agreement_id,
                order_hash,
                principal_amount: order.principal_amount,
                principal_token: order.principal_token,
                underwriter: order.issuance.underwriter,
                underwriter_fee: order.underwriter_fee,
                relayer: order.relayer,
                relayer_fee: order.relayer_fee,
            },
        );
        Ok(agreement_id)
    }

    fn check_order(
        &self,
        order: &DebtOrder,
        agreement_id: &AgreementId,
        order_hash: &OrderHash,
    ) -> Result<(), KernelError> {
        let paid_out = order.relayer_fee.checked_add(order.underwriter_fee);
        let paid_in = order.creditor_fee.checked_add(order.debtor_fee);
        if paid_out.is_none() || paid_out != paid_in {
            return Err(KernelError::FeeMismatch);
        }
        if order.principal_amount < order.debtor_fee {
            return Err(KernelError::PrincipalBelowFee);
        }
        if (order.issuance.underwriter.is_null() && order.underwriter_fee > 0)
            || (order.relayer.is_null() && order.relayer_fee > 0)
        {
            return Err(KernelError::InvalidFeeRouting);
        }
        if order.expiration < self.services.now() {
            return Err(KernelError::OrderExpired);
        }
        if self.registry.contains(agreement_id) {
            return Err(KernelError::AlreadyIssued(*agreement_id));
        }
        if self.is_issuance_cancelled(agreement_id) {
            return Err(KernelError::IssuanceCancelled(*agreement_id));
        }
        if self.is_order_cancelled(order_hash) {
            return Err(KernelError::OrderCancelled(*order_hash));
        }

        // The terms contract tracks repayments against the packed parameters,
        // so the order must lend exactly what they describe.
        let params = TermsParameters::decode(&order.issuance.terms_parameters).map_err(TermsError::from)?;
        if params.principal_amount != order.principal_amount {
            return Err(KernelError::TermsMismatch("principal amount"));
        }
        if self.tokens.token_by_index(params.principal_token_index) != Some(order.principal_token) {
            return Err(KernelError::TermsMismatch("principal token"));
        }
        Ok(())
    }

    fn check_consent(
        &self,
        caller: &AccountId,
        order: &DebtOrder,
        order_hash: &OrderHash,
        signatures: &OrderSignatures,
    ) -> Result<(), KernelError> {
        if *caller != order.issuance.debtor {
            Self::require_signature(
                ConsentCheck::Debtor,
                order_hash.as_bytes(),
                signatures.debtor.as_ref(),
                &order.issuance.debtor,
            )?;
        }
        if *caller != order.creditor {
            Self::require_signature(
                ConsentCheck::Creditor,
                order_hash.as_bytes(),
                signatures.creditor.as_ref(),
                &order.creditor,
            )?;
        }
        let underwriter = &order.issuance.underwriter;
        if !underwriter.is_null() && caller != underwriter {
            Self::require_signature(
                ConsentCheck::Underwriter,
                &self.underwriter_message_hash(order),
                signatures.underwriter.as_ref(),
                underwriter,
            )?;
        }
        Ok(())
    }

    fn require_signature(
        check: ConsentCheck,
        digest: &[u8; 32],
        signature: Option<&Signature>,
        signer: &AccountId,
    ) -> Result<(), KernelError> {
        let signature = signature.ok_or(KernelError::InvalidSignature { check })?;
        verify_account(digest, signature, signer).map_err(|e| {
            tracing::debug!(%check, signer = %signer.short(), error = %e, "consent verification failed");
            KernelError::InvalidSignature { check }
        })
    }

    fn check_funding(&self, order: &DebtOrder) -> Result<(), KernelError> {
        let required = order
            .creditor_outlay()
            .ok_or(KernelError::InsufficientFundsOrAllowance {
                required: Amount::MAX,
            })?;
        let ledger = &self.services.ledger;
        let balance = ledger.balance_of(&order.principal_token, &order.creditor);
        let allowance = ledger.allowance_of(&order.principal_token, &order.creditor);
        if balance < required || allowance < required {
            return Err(KernelError::InsufficientFundsOrAllowance { required });
        }
        Ok(())
    }

    /// The fee schedule paid out of the creditor's account, zero legs omitted.
    fn settlement_transfers(order: &DebtOrder) -> Vec<Transfer> {
        let token = order.principal_token;
        let from = order.creditor;
        [
            (order.issuance.debtor, order.principal_amount - order.debtor_fee),
            (order.issuance.underwriter, order.underwriter_fee),
            (order.relayer, order.relayer_fee),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(to, amount)| Transfer::new(token, from, to, amount))
        .collect()
    }

    fn commit(
        &self,
        order: &DebtOrder,
        agreement_id: &AgreementId,
        journal: &mut Vec<CommitStep>,
    ) -> Result<(), KernelError> {
        self.registry
            .insert(&self.account, order.creditor, &order.issuance)?;
        journal.push(CommitStep::Inserted(*agreement_id));

        let transfers = Self::settlement_transfers(order);
        if !transfers.is_empty() {
            self.services
                .ledger
                .transfer_from_batch(&self.account, &transfers)?;
            journal.push(CommitStep::Transferred(transfers));
        }

        if self
            .collateral
            .requires_collateral(&order.issuance.terms_parameters)?
        {
            self.collateral
                .lock(&self.account, agreement_id, &order.issuance.debtor)?;
            journal.push(CommitStep::CollateralLocked(*agreement_id));
        }

        let terms = self.terms.get(&order.issuance.terms_contract)?;
        terms.register_term_start(&self.account, agreement_id, &order.issuance.debtor)?;
        Ok(())
    }

    fn compensate(&self, journal: Vec<CommitStep>) {
        for step in journal.into_iter().rev() {
            match step {
                CommitStep::CollateralLocked(id) => {
                    if let Err(e) = self.collateral.unwind_lock(&self.account, &id) {
                        tracing::error!(agreement = %id.short(), error = %e, "failed to unwind collateral lock");
                    }
                }
                CommitStep::Transferred(transfers) => {
                    if let Err(e) = self.services.ledger.reverse_batch(&self.account, &transfers) {
                        tracing::error!(error = %e, "failed to reverse fill transfers");
                    }
                }
                CommitStep::Inserted(id) => self.registry.revert_insert(&id),
            }
        }
    }

    fn reject(&self, order_hash: &OrderHash, error: &KernelError) {
        tracing::warn!(order = %order_hash.short(), error = %error, "fill rejected");
        if let Some(code) = error.code() {
            self.services.notify(
                COMPONENT,
                Notification::FillRejected {
                    order_hash: *order_hash,
                    code,
                    reason: error.to_string(),
                },
            );
        }
    }

    /// Permanently prevent `issuance` from being filled. Debtor only.
    pub fn cancel_issuance(&self, caller: &AccountId, issuance: &Issuance) -> Result<AgreementId, KernelError> {
        if *caller != issuance.debtor {
            return Err(KernelError::NotDebtor);
        }
        let agreement_id = issuance.agreement_id();
        let _guard = self.fill_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.registry.contains(&agreement_id) {
            return Err(KernelError::AlreadyIssued(agreement_id));
        }
        if self.cancelled_issuances.insert(agreement_id, *caller).is_none() {
            tracing::info!(agreement = %agreement_id.short(), "issuance cancelled");
            self.services.notify(
                COMPONENT,
                Notification::IssuanceCancelled {
                    agreement_id,
                    cancelled_by: *caller,
                },
            );
        }
        Ok(agreement_id)
    }

    /// Permanently prevent `order` from being filled. Debtor only.
    pub fn cancel_order(&self, caller: &AccountId, order: &DebtOrder) -> Result<OrderHash, KernelError> {
        if *caller != order.issuance.debtor {
            return Err(KernelError::NotDebtor);
        }
        let order_hash = self.order_hash(order);
        let _guard = self.fill_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.registry.contains(&order.agreement_id()) {
            return Err(KernelError::AlreadyIssued(order.agreement_id()));
        }
        if self.cancelled_orders.insert(order_hash, *caller).is_none() {
            tracing::info!(order = %order_hash.short(), "order cancelled");
            self.services.notify(
                COMPONENT,
                Notification::OrderCancelled {
                    order_hash,
                    cancelled_by: *caller,
                },
            );
        }
        Ok(order_hash)
    }
}
