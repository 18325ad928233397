use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use accord_core::{AccountId, Amount, AuthorizationStore, Capability, TokenId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::traits::{TokenLedger, Transfer};

type Key = (TokenId, AccountId);

/// What produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Mint,
    Transfer,
    Reversal,
}

/// One committed movement in the ledger's append-only journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    pub token: TokenId,
    /// Null for mints.
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<Key, Amount>,
    allowances: HashMap<Key, Amount>,
    journal: Vec<JournalEntry>,
}

/// Balance and allowance changes computed against a book but not yet applied.
#[derive(Default)]
struct Staged {
    balances: HashMap<Key, Amount>,
    allowances: HashMap<Key, Amount>,
}

impl Staged {
    fn balance(&self, book: &Book, key: &Key) -> Amount {
        self.balances
            .get(key)
            .or_else(|| book.balances.get(key))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, book: &Book, key: &Key) -> Amount {
        self.allowances
            .get(key)
            .or_else(|| book.allowances.get(key))
            .copied()
            .unwrap_or(0)
    }

    fn debit(&mut self, book: &Book, token: TokenId, account: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let key = (token, account);
        let available = self.balance(book, &key);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                token,
                account,
                available,
                required: amount,
            });
        }
        self.balances.insert(key, available - amount);
        Ok(())
    }

    fn credit(&mut self, book: &Book, token: TokenId, account: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let key = (token, account);
        let updated = self
            .balance(book, &key)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { token, account })?;
        self.balances.insert(key, updated);
        Ok(())
    }

    fn consume_allowance(&mut self, book: &Book, token: TokenId, owner: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let key = (token, owner);
        let available = self.allowance(book, &key);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                token,
                owner,
                available,
                required: amount,
            });
        }
        self.allowances.insert(key, available - amount);
        Ok(())
    }

    fn restore_allowance(&mut self, book: &Book, token: TokenId, owner: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let key = (token, owner);
        let updated = self
            .allowance(book, &key)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { token, account: owner })?;
        self.allowances.insert(key, updated);
        Ok(())
    }

    fn commit(self, book: &mut Book) {
        book.balances.extend(self.balances);
        book.allowances.extend(self.allowances);
    }
}

fn validate(transfer: &Transfer) -> Result<(), LedgerError> {
    if transfer.token.is_null() {
        return Err(LedgerError::NullToken);
    }
    if transfer.from.is_null() || transfer.to.is_null() {
        return Err(LedgerError::NullAccount);
    }
    if transfer.amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

/// In-memory reference implementation of [`TokenLedger`].
///
/// All balances live in a single book behind one lock, so every batch is
/// staged against a consistent view and committed in one step.
pub struct InMemoryLedger {
    book: RwLock<Book>,
    auth: AuthorizationStore,
}

impl InMemoryLedger {
    /// Create an empty ledger administered by `owner`.
    pub fn new(owner: AccountId) -> Self {
        Self {
            book: RwLock::new(Book::default()),
            auth: AuthorizationStore::new("ledger", owner),
        }
    }

    /// Capability lists for transfer agents and minters.
    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// Copy of the journal, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .journal
            .clone()
    }

    /// Sum of all balances of `token`.
    pub fn total_supply(&self, token: &TokenId) -> Amount {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }

    fn apply(
        &self,
        transfers: &[Transfer],
        consume_allowance: bool,
        kind: EntryKind,
    ) -> Result<(), LedgerError> {
        for transfer in transfers {
            validate(transfer)?;
        }

        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = Staged::default();
        for t in transfers {
            if consume_allowance {
                staged.consume_allowance(&book, t.token, t.from, t.amount)?;
            }
            staged.debit(&book, t.token, t.from, t.amount)?;
            staged.credit(&book, t.token, t.to, t.amount)?;
        }
        staged.commit(&mut book);

        for t in transfers {
            book.journal.push(JournalEntry {
                id: Uuid::now_v7(),
                kind,
                token: t.token,
                from: t.from,
                to: t.to,
                amount: t.amount,
            });
        }
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, token: &TokenId, owner: &AccountId) -> Amount {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .balances
            .get(&(*token, *owner))
            .copied()
            .unwrap_or(0)
    }

    fn allowance_of(&self, token: &TokenId, owner: &AccountId) -> Amount {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .allowances
            .get(&(*token, *owner))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&self, owner: &AccountId, token: &TokenId, amount: Amount) -> Result<(), LedgerError> {
        if owner.is_null() {
            return Err(LedgerError::NullAccount);
        }
        if token.is_null() {
            return Err(LedgerError::NullToken);
        }
        self.book
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allowances
            .insert((*token, *owner), amount);
        tracing::debug!(owner = %owner.short(), token = %token.short(), amount, "allowance set");
        Ok(())
    }

    fn transfer(
        &self,
        from: &AccountId,
        token: &TokenId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let transfer = Transfer::new(*token, *from, *to, amount);
        self.apply(&[transfer], false, EntryKind::Transfer)
            .inspect_err(|e| tracing::warn!(error = %e, "transfer rejected"))?;
        tracing::debug!(from = %from.short(), to = %to.short(), amount, "transfer applied");
        Ok(())
    }

    fn transfer_from(&self, agent: &AccountId, transfer: &Transfer) -> Result<(), LedgerError> {
        self.transfer_from_batch(agent, std::slice::from_ref(transfer))
    }

    fn transfer_from_batch(&self, agent: &AccountId, transfers: &[Transfer]) -> Result<(), LedgerError> {
        self.auth.require(Capability::Transfer, agent)?;
        self.apply(transfers, true, EntryKind::Transfer)
            .inspect_err(|e| tracing::warn!(agent = %agent.short(), error = %e, "transfer batch rejected"))?;
        tracing::debug!(agent = %agent.short(), count = transfers.len(), "transfer batch applied");
        Ok(())
    }

    fn reverse_batch(&self, agent: &AccountId, transfers: &[Transfer]) -> Result<(), LedgerError> {
        self.auth.require(Capability::Transfer, agent)?;
        for transfer in transfers {
            validate(transfer)?;
        }

        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = Staged::default();
        for t in transfers.iter().rev() {
            staged.debit(&book, t.token, t.to, t.amount)?;
            staged.credit(&book, t.token, t.from, t.amount)?;
            staged.restore_allowance(&book, t.token, t.from, t.amount)?;
        }
        staged.commit(&mut book);

        for t in transfers.iter().rev() {
            book.journal.push(JournalEntry {
                id: Uuid::now_v7(),
                kind: EntryKind::Reversal,
                token: t.token,
                from: t.to,
                to: t.from,
                amount: t.amount,
            });
        }
        tracing::info!(agent = %agent.short(), count = transfers.len(), "transfer batch reversed");
        Ok(())
    }

    fn mint(
        &self,
        agent: &AccountId,
        token: &TokenId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.auth.require(Capability::Mint, agent)?;
        if token.is_null() {
            return Err(LedgerError::NullToken);
        }
        if to.is_null() {
            return Err(LedgerError::NullAccount);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = Staged::default();
        staged.credit(&book, *token, *to, amount)?;
        staged.commit(&mut book);
        book.journal.push(JournalEntry {
            id: Uuid::now_v7(),
            kind: EntryKind::Mint,
            token: *token,
            from: AccountId::NULL,
            to: *to,
            amount,
        });
        tracing::info!(token = %token.short(), to = %to.short(), amount, "tokens minted");
        Ok(())
    }
}
