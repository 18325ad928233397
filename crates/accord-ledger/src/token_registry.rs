use accord_core::{AccountId, AuthorizationStore, TokenId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A token reachable through an 8-bit index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub index: u8,
    pub token: TokenId,
    pub symbol: String,
    pub decimals: u8,
}

/// Maps the token indices carried in packed terms parameters to tokens.
///
/// Entries are owner-managed and never removed, so an index resolves to the
/// same token for the lifetime of every agreement that references it.
pub struct TokenRegistry {
    by_index: DashMap<u8, TokenInfo>,
    by_token: DashMap<TokenId, u8>,
    auth: AuthorizationStore,
}

impl TokenRegistry {
    pub fn new(owner: AccountId) -> Self {
        Self {
            by_index: DashMap::new(),
            by_token: DashMap::new(),
            auth: AuthorizationStore::new("token_registry", owner),
        }
    }

    pub fn authorizations(&self) -> &AuthorizationStore {
        &self.auth
    }

    /// Register `symbol` at `index`. Owner only.
    pub fn add_token(
        &self,
        caller: &AccountId,
        index: u8,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenId, LedgerError> {
        self.auth.ensure_owner(caller)?;
        let token = TokenId::from_symbol(symbol);

        if self.by_index.contains_key(&index) {
            return Err(LedgerError::TokenIndexTaken(index));
        }
        if self.by_token.contains_key(&token) {
            return Err(LedgerError::DuplicateToken(token));
        }

        self.by_index.insert(
            index,
            TokenInfo {
                index,
                token,
                symbol: symbol.to_string(),
                decimals,
            },
        );
        self.by_token.insert(token, index);
        tracing::info!(index, symbol, token = %token.short(), "token registered");
        Ok(token)
    }

    pub fn token_by_index(&self, index: u8) -> Option<TokenId> {
        self.by_index.get(&index).map(|info| info.token)
    }

    pub fn info(&self, index: u8) -> Option<TokenInfo> {
        self.by_index.get(&index).map(|info| info.clone())
    }

    pub fn index_of(&self, token: &TokenId) -> Option<u8> {
        self.by_token.get(token).map(|index| *index)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<TokenInfo> {
        self.index_of(&TokenId::from_symbol(symbol))
            .and_then(|index| self.info(index))
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}
