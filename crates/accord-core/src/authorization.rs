//! Owner-controlled, per-capability allow-lists.
//!
//! Every mutating component owns one [`AuthorizationStore`]. A capability is
//! granted iff the agent is present in that capability's set; absence denies.
//! The same owner also controls the component's pause switch.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::types::AccountId;

/// A mutating right that can be granted on a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Insert new agreement records.
    Insert,
    /// Modify the beneficiary of an existing agreement.
    Edit,
    /// Lock collateral on behalf of a debtor.
    Collateralize,
    /// Move funds under a holder's allowance.
    Transfer,
    /// Create new token units.
    Mint,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Edit => write!(f, "edit"),
            Self::Collateralize => write!(f, "collateralize"),
            Self::Transfer => write!(f, "transfer"),
            Self::Mint => write!(f, "mint"),
        }
    }
}

/// Authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{caller} is not the owner of {context}")]
    NotOwner { context: String, caller: AccountId },

    #[error("{agent} lacks the {capability} capability on {context}")]
    Unauthorized {
        context: String,
        capability: Capability,
        agent: AccountId,
    },

    #[error("the null account cannot be granted a capability or ownership")]
    NullAgent,

    #[error("{agent} already holds the {capability} capability on {context}")]
    AlreadyAuthorized {
        context: String,
        capability: Capability,
        agent: AccountId,
    },

    #[error("{agent} does not hold the {capability} capability on {context}")]
    NotAuthorized {
        context: String,
        capability: Capability,
        agent: AccountId,
    },
}

/// Allow-lists and pause switch owned by a single component.
pub struct AuthorizationStore {
    /// Name of the owning component, used in errors and logs.
    context: String,
    owner: RwLock<AccountId>,
    sets: RwLock<HashMap<Capability, HashSet<AccountId>>>,
    paused: AtomicBool,
}

impl AuthorizationStore {
    /// Create an empty store owned by `owner`.
    pub fn new(context: impl Into<String>, owner: AccountId) -> Self {
        Self {
            context: context.into(),
            owner: RwLock::new(owner),
            sets: RwLock::new(HashMap::new()),
            paused: AtomicBool::new(false),
        }
    }

    /// Name of the owning component.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Current owner.
    pub fn owner(&self) -> AccountId {
        *self.owner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail with `NotOwner` unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &AccountId) -> Result<(), AuthorizationError> {
        if self.owner() != *caller {
            return Err(AuthorizationError::NotOwner {
                context: self.context.clone(),
                caller: *caller,
            });
        }
        Ok(())
    }

    /// Hand ownership to `new_owner`.
    pub fn transfer_ownership(
        &self,
        caller: &AccountId,
        new_owner: AccountId,
    ) -> Result<(), AuthorizationError> {
        self.ensure_owner(caller)?;
        if new_owner.is_null() {
            return Err(AuthorizationError::NullAgent);
        }
        *self.owner.write().unwrap_or_else(PoisonError::into_inner) = new_owner;
        tracing::info!(
            context = %self.context,
            new_owner = %new_owner,
            "ownership transferred"
        );
        Ok(())
    }

    /// Grant `capability` to `agent`. Owner only.
    pub fn authorize(
        &self,
        caller: &AccountId,
        capability: Capability,
        agent: AccountId,
    ) -> Result<(), AuthorizationError> {
        self.ensure_owner(caller)?;
        if agent.is_null() {
            return Err(AuthorizationError::NullAgent);
        }

        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        if !sets.entry(capability).or_default().insert(agent) {
            return Err(AuthorizationError::AlreadyAuthorized {
                context: self.context.clone(),
                capability,
                agent,
            });
        }

        tracing::info!(
            context = %self.context,
            %capability,
            agent = %agent,
            "capability granted"
        );
        Ok(())
    }

    /// Withdraw `capability` from `agent`. Owner only.
    pub fn revoke(
        &self,
        caller: &AccountId,
        capability: Capability,
        agent: AccountId,
    ) -> Result<(), AuthorizationError> {
        self.ensure_owner(caller)?;

        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        let removed = sets
            .get_mut(&capability)
            .map(|set| set.remove(&agent))
            .unwrap_or(false);
        if !removed {
            return Err(AuthorizationError::NotAuthorized {
                context: self.context.clone(),
                capability,
                agent,
            });
        }

        tracing::info!(
            context = %self.context,
            %capability,
            agent = %agent,
            "capability revoked"
        );
        Ok(())
    }

    /// Whether `agent` currently holds `capability`.
    pub fn is_authorized(&self, capability: Capability, agent: &AccountId) -> bool {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .is_some_and(|set| set.contains(agent))
    }

    /// Fail with `Unauthorized` unless `agent` holds `capability`.
    pub fn require(
        &self,
        capability: Capability,
        agent: &AccountId,
    ) -> Result<(), AuthorizationError> {
        if self.is_authorized(capability, agent) {
            Ok(())
        } else {
            Err(AuthorizationError::Unauthorized {
                context: self.context.clone(),
                capability,
                agent: *agent,
            })
        }
    }

    /// All agents holding `capability`, sorted.
    pub fn agents(&self, capability: Capability) -> Vec<AccountId> {
        let mut agents: Vec<AccountId> = self
            .sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        agents.sort();
        agents
    }

    /// Engage the pause switch. Owner only.
    pub fn pause(&self, caller: &AccountId) -> Result<(), AuthorizationError> {
        self.ensure_owner(caller)?;
        self.paused.store(true, Ordering::SeqCst);
        tracing::warn!(context = %self.context, "component paused");
        Ok(())
    }

    /// Release the pause switch. Owner only.
    pub fn unpause(&self, caller: &AccountId) -> Result<(), AuthorizationError> {
        self.ensure_owner(caller)?;
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!(context = %self.context, "component unpaused");
        Ok(())
    }

    /// Whether the pause switch is engaged.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
