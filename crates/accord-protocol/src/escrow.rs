//! Pooled escrow: many depositors jointly fund one agreement and share its
//! repayments in proportion to their deposits.
//!
//! Two fixed-point factors drive the apportionment. The theoretical factor
//! is `PRECISION * total_expected / principal`, fixed when the loan is
//! funded. The actual factor is `PRECISION * repaid / principal`, clamped to
//! the theoretical one. A depositor is entitled to
//! `deposit * actual / theoretical` in total, capped at
//! `deposit * repaid / total_deposited`, minus what they already drew.
//! Withdrawals never exceed what the debtor has repaid.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use accord_core::config::EscrowConfig;
use accord_core::{AccountId, AgreementId, Amount, Notification, Timestamp, TokenId};
use accord_ledger::Transfer;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::agreement::{DebtOrder, OrderSignatures};
use crate::error::EscrowError;
use crate::escrow_state::{EscrowEvent, EscrowState, EscrowStateMachine};
use crate::kernel::DebtKernel;
use crate::services::Services;
use crate::terms::{TermsContract, TermsContractRegistry};

const COMPONENT: &str = "escrow";

/// Fixed identity and goal of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    /// Custody account; acts as the creditor of the funded agreement.
    pub account: AccountId,
    /// Certifies borrowers, funds the loan, and triggers sweeps.
    pub regulator: AccountId,
    pub token: TokenId,
    pub target: Amount,
}

/// One depositor's standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositorPosition {
    pub depositor: AccountId,
    pub deposited: Amount,
    pub withdrawn: Amount,
    pub claimable: Amount,
}

/// Amount sent to a depositor by a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub depositor: AccountId,
    pub amount: Amount,
}

/// Point-in-time view of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSnapshot {
    pub state: EscrowState,
    pub token: TokenId,
    pub target: Amount,
    pub total_deposited: Amount,
    pub agreement_id: Option<AgreementId>,
    pub principal: Amount,
    pub total_expected: Amount,
    pub repaid: Amount,
    pub theoretical_factor: Amount,
    pub actual_factor: Amount,
    pub total_withdrawn: Amount,
    /// Depositors in deposit order.
    pub depositors: Vec<DepositorPosition>,
}

#[derive(Debug, Clone)]
struct Loan {
    agreement_id: AgreementId,
    terms_contract: AccountId,
    principal: Amount,
    creditor_fee: Amount,
    total_expected: Amount,
}

#[derive(Debug, Clone)]
struct Position {
    depositor: AccountId,
    deposited: Amount,
    withdrawn: Amount,
}

#[derive(Debug)]
struct Book {
    state: EscrowState,
    positions: Vec<Position>,
    index: HashMap<AccountId, usize>,
    total_deposited: Amount,
    loan: Option<Loan>,
    theoretical: Amount,
    actual: Amount,
    repaid: Amount,
    total_withdrawn: Amount,
}

impl Book {
    fn new() -> Self {
        Self {
            state: EscrowState::Collecting,
            positions: Vec::new(),
            index: HashMap::new(),
            total_deposited: 0,
            loan: None,
            theoretical: 0,
            actual: 0,
            repaid: 0,
            total_withdrawn: 0,
        }
    }

    /// Scaled share of the deposit, never more than the same share of what
    /// has actually been repaid.
    fn entitlement(&self, position: &Position) -> Result<Amount, EscrowError> {
        if self.theoretical == 0 || self.total_deposited == 0 {
            return Ok(0);
        }
        let scaled = position
            .deposited
            .checked_mul(self.actual)
            .map(|v| v / self.theoretical)
            .ok_or(EscrowError::Overflow("entitlement"))?;
        let collected = position
            .deposited
            .checked_mul(self.repaid)
            .map(|v| v / self.total_deposited)
            .ok_or(EscrowError::Overflow("entitlement"))?;
        Ok(scaled.min(collected))
    }

    fn claimable(&self, position: &Position) -> Result<Amount, EscrowError> {
        Ok(self.entitlement(position)?.saturating_sub(position.withdrawn))
    }

    /// Principal lent, creditor fee paid, and withdrawals made.
    fn disbursed(&self) -> Result<Amount, EscrowError> {
        let lent = self
            .loan
            .as_ref()
            .map(|l| l.principal.checked_add(l.creditor_fee))
            .unwrap_or(Some(0));
        lent.and_then(|v| v.checked_add(self.total_withdrawn))
            .ok_or(EscrowError::Overflow("disbursed"))
    }

    /// Deposits plus observed repayments.
    fn received(&self) -> Result<Amount, EscrowError> {
        self.total_deposited
            .checked_add(self.repaid)
            .ok_or(EscrowError::Overflow("received"))
    }

    fn all_settled(&self) -> Result<bool, EscrowError> {
        for position in &self.positions {
            if self.claimable(position)? > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct PooledEscrow {
    params: EscrowParams,
    precision: Amount,
    kernel: Arc<DebtKernel>,
    terms: Arc<TermsContractRegistry>,
    services: Services,
    certified: DashMap<AccountId, Timestamp>,
    book: Mutex<Book>,
}

impl PooledEscrow {
    pub fn new(
        params: EscrowParams,
        config: &EscrowConfig,
        kernel: Arc<DebtKernel>,
        terms: Arc<TermsContractRegistry>,
        services: Services,
    ) -> Result<Self, EscrowError> {
        if params.account.is_null() || params.regulator.is_null() {
            return Err(EscrowError::InvalidCaller);
        }
        if params.target == 0 || config.precision == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        Ok(Self {
            params,
            precision: config.precision as Amount,
            kernel,
            terms,
            services,
            certified: DashMap::new(),
            book: Mutex::new(Book::new()),
        })
    }

    pub fn account(&self) -> AccountId {
        self.params.account
    }

    pub fn regulator(&self) -> AccountId {
        self.params.regulator
    }

    pub fn state(&self) -> EscrowState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_regulator(&self, caller: &AccountId) -> Result<(), EscrowError> {
        if *caller != self.params.regulator {
            return Err(EscrowError::NotRegulator(*caller));
        }
        Ok(())
    }

    /// Allow `borrower` to receive this escrow's loan. Regulator only.
    pub fn certify_borrower(&self, caller: &AccountId, borrower: AccountId) -> Result<(), EscrowError> {
        self.ensure_regulator(caller)?;
        if borrower.is_null() {
            return Err(EscrowError::InvalidCaller);
        }
        if self.certified.contains_key(&borrower) {
            return Err(EscrowError::AlreadyCertified(borrower));
        }
        self.certified.insert(borrower, self.services.now());
        tracing::info!(borrower = %borrower.short(), "borrower certified");
        Ok(())
    }

    /// Withdraw a certification. Regulator only.
    pub fn revoke_certification(&self, caller: &AccountId, borrower: &AccountId) -> Result<(), EscrowError> {
        self.ensure_regulator(caller)?;
        if self.certified.remove(borrower).is_none() {
            return Err(EscrowError::BorrowerNotCertified(*borrower));
        }
        tracing::info!(borrower = %borrower.short(), "borrower certification revoked");
        Ok(())
    }

    pub fn is_certified(&self, borrower: &AccountId) -> bool {
        self.certified.contains_key(borrower)
    }

    fn advance(&self, book: &mut Book, event: EscrowEvent) -> Result<(), EscrowError> {
        let from = book.state;
        let to = EscrowStateMachine::transition(from, event)?;
        book.state = to;
        tracing::info!(escrow = %self.params.account.short(), %from, %to, "escrow state changed");
        self.services.notify(
            COMPONENT,
            Notification::EscrowStateChanged {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
        Ok(())
    }

    /// Pull up to `amount` from `depositor` toward the target.
    ///
    /// Deposits beyond the remaining room are capped; the accepted amount is
    /// returned. Reaching the target moves the escrow to `Funded`.
    pub fn deposit(&self, depositor: &AccountId, amount: Amount) -> Result<Amount, EscrowError> {
        if depositor.is_null() {
            return Err(EscrowError::InvalidCaller);
        }
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }

        let mut book = self.lock();
        if book.state != EscrowState::Collecting {
            return Err(EscrowError::InvalidState {
                state: book.state,
                operation: "deposit",
            });
        }

        let room = self.params.target - book.total_deposited;
        let accepted = amount.min(room);
        let transfer = Transfer::new(self.params.token, *depositor, self.params.account, accepted);
        self.services
            .ledger
            .transfer_from(&self.params.account, &transfer)
            .inspect_err(|e| tracing::warn!(depositor = %depositor.short(), error = %e, "deposit failed"))?;

        let existing = book.index.get(depositor).copied();
        let index = match existing {
            Some(index) => index,
            None => {
                let index = book.positions.len();
                book.positions.push(Position {
                    depositor: *depositor,
                    deposited: 0,
                    withdrawn: 0,
                });
                book.index.insert(*depositor, index);
                index
            }
        };
        book.positions[index].deposited += accepted;
        book.total_deposited += accepted;
        let total_deposited = book.total_deposited;

        tracing::info!(
            depositor = %depositor.short(),
            requested = amount,
            accepted,
            total_deposited,
            "deposit accepted"
        );
        self.services.notify(
            COMPONENT,
            Notification::Deposit {
                depositor: *depositor,
                accepted,
                total_deposited,
            },
        );

        if total_deposited == self.params.target {
            self.advance(&mut book, EscrowEvent::TargetReached)?;
        }
        Ok(accepted)
    }

    /// Fund `order` through the kernel with the escrow as creditor. Regulator only.
    pub fn fund_loan(
        &self,
        caller: &AccountId,
        order: &DebtOrder,
        signatures: &OrderSignatures,
    ) -> Result<AgreementId, EscrowError> {
        self.ensure_regulator(caller)?;
        let mut book = self.lock();
        if book.state != EscrowState::Funded {
            return Err(EscrowError::InvalidState {
                state: book.state,
                operation: "fund_loan",
            });
        }

        let borrower = order.issuance.debtor;
        if !self.is_certified(&borrower) {
            return Err(EscrowError::BorrowerNotCertified(borrower));
        }
        if order.creditor != self.params.account {
            return Err(EscrowError::InvalidOrder("creditor must be the escrow account"));
        }
        if order.principal_token != self.params.token {
            return Err(EscrowError::InvalidOrder("principal token differs from the escrow token"));
        }

        let outlay = order
            .creditor_outlay()
            .ok_or(EscrowError::Overflow("creditor outlay"))?;
        if outlay > book.total_deposited {
            return Err(EscrowError::InsufficientPool {
                available: book.total_deposited,
                required: outlay,
            });
        }
        let terms = self.terms.get(&order.issuance.terms_contract)?;

        let ledger = &self.services.ledger;
        ledger.approve(&self.params.account, &self.params.token, outlay)?;
        let filled = self.kernel.fill_order(&self.params.account, order, signatures);
        if let Err(e) = ledger.approve(&self.params.account, &self.params.token, 0) {
            tracing::warn!(error = %e, "failed to clear escrow allowance");
        }
        let agreement_id = filled.inspect_err(|e| {
            tracing::warn!(borrower = %borrower.short(), error = %e, "escrow loan not funded")
        })?;

        let (total_expected, theoretical) = self
            .expected_return(terms.as_ref(), &agreement_id, order.principal_amount)
            .inspect_err(|e| {
                tracing::error!(
                    agreement = %agreement_id.short(),
                    error = %e,
                    "funded agreement has no readable expected repayment"
                )
            })?;

        book.loan = Some(Loan {
            agreement_id,
            terms_contract: order.issuance.terms_contract,
            principal: order.principal_amount,
            creditor_fee: order.creditor_fee,
            total_expected,
        });
        book.theoretical = theoretical;
        book.actual = 0;
        self.advance(&mut book, EscrowEvent::LoanFunded)?;

        tracing::info!(
            agreement = %agreement_id.short(),
            principal = order.principal_amount,
            total_expected,
            theoretical,
            "escrow loan funded"
        );
        self.services.notify(
            COMPONENT,
            Notification::LoanFunded {
                agreement_id,
                principal: order.principal_amount,
            },
        );
        Ok(agreement_id)
    }

    /// Total the terms contract expects back by term end, and the matching
    /// theoretical factor.
    fn expected_return(
        &self,
        terms: &dyn TermsContract,
        agreement_id: &AgreementId,
        principal: Amount,
    ) -> Result<(Amount, Amount), EscrowError> {
        if principal == 0 {
            return Err(EscrowError::InvalidOrder("principal must be positive"));
        }
        let end = terms.term_end_timestamp(agreement_id)?;
        let total_expected = terms.expected_repayment_value(agreement_id, end)?;
        let theoretical = self
            .precision
            .checked_mul(total_expected)
            .map(|v| v / principal)
            .ok_or(EscrowError::Overflow("theoretical factor"))?;
        Ok((total_expected, theoretical))
    }

    fn sync_locked(&self, book: &mut Book) -> Result<(), EscrowError> {
        let Some(loan) = book.loan.clone() else {
            return Ok(());
        };
        let terms = self.terms.get(&loan.terms_contract)?;
        let repaid = terms.value_repaid_to_date(&loan.agreement_id)?;

        if repaid != book.repaid {
            let scaled = repaid
                .checked_mul(self.precision)
                .map(|v| v / loan.principal)
                .ok_or(EscrowError::Overflow("actual factor"))?;
            book.repaid = repaid;
            book.actual = scaled.min(book.theoretical);
            tracing::debug!(
                agreement = %loan.agreement_id.short(),
                repaid,
                actual = book.actual,
                theoretical = book.theoretical,
                "repayments observed"
            );
            self.services.notify(
                COMPONENT,
                Notification::RepaymentObserved {
                    agreement_id: loan.agreement_id,
                    value_repaid: repaid,
                },
            );
        }

        if book.state == EscrowState::AwaitingRepayment && repaid >= loan.total_expected {
            self.advance(book, EscrowEvent::DebtFullyRepaid)?;
        }
        self.close_if_settled(book)
    }

    fn close_if_settled(&self, book: &mut Book) -> Result<(), EscrowError> {
        if book.state == EscrowState::ReadyToWithdraw
            && book.actual == book.theoretical
            && book.all_settled()?
        {
            self.advance(book, EscrowEvent::AllSettled)?;
            let residual = self
                .services
                .ledger
                .balance_of(&self.params.token, &self.params.account);
            tracing::info!(residual, "escrow closed");
        }
        Ok(())
    }

    /// Refresh the repaid total and scaling factors from the terms contract.
    pub fn sync_repayments(&self) -> Result<Amount, EscrowError> {
        let mut book = self.lock();
        if book.loan.is_none() {
            return Err(EscrowError::InvalidState {
                state: book.state,
                operation: "sync_repayments",
            });
        }
        self.sync_locked(&mut book)?;
        Ok(book.repaid)
    }

    /// What `depositor` could draw as of the last observed repayment.
    pub fn claimable(&self, depositor: &AccountId) -> Result<Amount, EscrowError> {
        let book = self.lock();
        let index = *book
            .index
            .get(depositor)
            .ok_or(EscrowError::UnknownDepositor(*depositor))?;
        book.claimable(&book.positions[index])
    }

    /// Sweep up to `amount` out to depositors in deposit order, each bounded
    /// by their claimable entitlement. Regulator only.
    pub fn withdraw(&self, caller: &AccountId, amount: Amount) -> Result<Vec<Payout>, EscrowError> {
        self.ensure_regulator(caller)?;
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let mut book = self.lock();
        self.ensure_withdrawable(&book)?;
        self.sync_locked(&mut book)?;
        self.ensure_withdrawable(&book)?;

        let mut remaining = amount;
        let mut plan = Vec::new();
        for (index, position) in book.positions.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let take = book.claimable(position)?.min(remaining);
            if take > 0 {
                plan.push((index, take));
                remaining -= take;
            }
        }
        self.disburse(&mut book, plan)
    }

    /// Draw up to `amount` of the caller's own entitlement.
    pub fn withdraw_share(&self, depositor: &AccountId, amount: Amount) -> Result<Amount, EscrowError> {
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let mut book = self.lock();
        self.ensure_withdrawable(&book)?;
        let index = *book
            .index
            .get(depositor)
            .ok_or(EscrowError::UnknownDepositor(*depositor))?;
        self.sync_locked(&mut book)?;
        self.ensure_withdrawable(&book)?;

        let take = book.claimable(&book.positions[index])?.min(amount);
        let paid = self.disburse(&mut book, vec![(index, take)])?;
        Ok(paid.iter().map(|p| p.amount).sum())
    }

    fn ensure_withdrawable(&self, book: &Book) -> Result<(), EscrowError> {
        if !book.state.allows_withdrawal() {
            return Err(EscrowError::InvalidState {
                state: book.state,
                operation: "withdraw",
            });
        }
        Ok(())
    }

    fn disburse(&self, book: &mut Book, plan: Vec<(usize, Amount)>) -> Result<Vec<Payout>, EscrowError> {
        let plan: Vec<(usize, Amount)> = plan.into_iter().filter(|(_, amount)| *amount > 0).collect();
        let total = plan
            .iter()
            .try_fold(0 as Amount, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(EscrowError::Overflow("payout"))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let disbursed = book
            .disbursed()?
            .checked_add(total)
            .ok_or(EscrowError::Overflow("disbursed"))?;
        let received = book.received()?;
        if disbursed > received {
            tracing::error!(disbursed, received, "escrow disbursement guard tripped");
            return Err(EscrowError::InvariantViolation {
                disbursed,
                received,
            });
        }
        let withdrawn = book
            .total_withdrawn
            .checked_add(total)
            .ok_or(EscrowError::Overflow("withdrawn"))?;
        if withdrawn > book.repaid {
            tracing::error!(withdrawn, repaid = book.repaid, "escrow withdrawals exceed repayments");
            return Err(EscrowError::InvariantViolation {
                disbursed: withdrawn,
                received: book.repaid,
            });
        }

        let ledger = &self.services.ledger;
        let available = ledger.balance_of(&self.params.token, &self.params.account);
        if available < total {
            return Err(EscrowError::InsufficientEscrowBalance {
                available,
                required: total,
            });
        }

        let mut payouts = Vec::with_capacity(plan.len());
        for (index, amount) in plan {
            let depositor = book.positions[index].depositor;
            if let Err(e) = ledger.transfer(&self.params.account, &self.params.token, &depositor, amount) {
                tracing::error!(depositor = %depositor.short(), error = %e, "escrow payout failed");
                return Err(e.into());
            }
            book.positions[index].withdrawn += amount;
            book.total_withdrawn += amount;
            tracing::info!(depositor = %depositor.short(), amount, "escrow withdrawal");
            self.services.notify(
                COMPONENT,
                Notification::Withdrawal { depositor, amount },
            );
            payouts.push(Payout { depositor, amount });
        }

        self.close_if_settled(book)?;
        Ok(payouts)
    }

    /// Move the escrow's whole balance of `token` to `to`. Regulator only.
    ///
    /// The escrow token is owed to depositors until the escrow closes; any
    /// other token (seized collateral) never is.
    pub fn sweep_residual(&self, caller: &AccountId, token: &TokenId, to: &AccountId) -> Result<Amount, EscrowError> {
        self.ensure_regulator(caller)?;
        if to.is_null() {
            return Err(EscrowError::InvalidCaller);
        }
        let book = self.lock();
        if *token == self.params.token && book.state != EscrowState::Closed {
            return Err(EscrowError::InvalidState {
                state: book.state,
                operation: "sweep_residual",
            });
        }

        let ledger = &self.services.ledger;
        let amount = ledger.balance_of(token, &self.params.account);
        if amount == 0 {
            return Ok(0);
        }
        ledger.transfer(&self.params.account, token, to, amount)?;
        tracing::info!(token = %token, to = %to.short(), amount, "escrow residual swept");
        self.services.notify(
            COMPONENT,
            Notification::ResidualSwept {
                token: *token,
                to: *to,
                amount,
            },
        );
        Ok(amount)
    }

    pub fn snapshot(&self) -> Result<EscrowSnapshot, EscrowError> {
        let book = self.lock();
        let mut depositors = Vec::with_capacity(book.positions.len());
        for position in &book.positions {
            depositors.push(DepositorPosition {
                depositor: position.depositor,
                deposited: position.deposited,
                withdrawn: position.withdrawn,
                claimable: book.claimable(position)?,
            });
        }
        let loan = book.loan.as_ref();
        Ok(EscrowSnapshot {
            state: book.state,
            token: self.params.token,
            target: self.params.target,
            total_deposited: book.total_deposited,
            agreement_id: loan.map(|l| l.agreement_id),
            principal: loan.map(|l| l.principal).unwrap_or(0),
            total_expected: loan.map(|l| l.total_expected).unwrap_or(0),
            repaid: book.repaid,
            theoretical_factor: book.theoretical,
            actual_factor: book.actual,
            total_withdrawn: book.total_withdrawn,
            depositors,
        })
    }
}
