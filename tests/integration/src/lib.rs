//! Shared wiring for the cross-crate scenarios.
//!
//! [`Protocol`] assembles every component over one in-memory ledger, a manual
//! clock and a recording sink, with the authorizations a deployment grants.

use std::sync::Arc;

use accord_core::config::ProtocolConfig;
use accord_core::telemetry::init_tracing;
use accord_core::{
    AccountId, AmortizationUnit, Amount, Capability, CollateralTerms, ManualClock, MemorySink,
    TermsParameters, Timestamp, TokenId,
};
use accord_crypto::{sign_digest, KeyPair};
use accord_ledger::{InMemoryLedger, TokenLedger, TokenRegistry};
use accord_protocol::{
    AgreementRegistry, CollateralManager, DebtKernel, DebtOrder, EscrowParams, Issuance,
    OrderSignatures, PooledEscrow, RepaymentRouter, Services, SimpleInterestTerms, TermsContract,
    TermsContractRegistry,
};

pub const START: Timestamp = 1_700_000_000;
pub const DAY: u64 = 86_400;
pub const MONTH: u64 = 30 * DAY;

pub fn owner() -> AccountId {
    AccountId::from_label("owner")
}

pub fn relayer() -> AccountId {
    AccountId::from_label("relayer")
}

pub struct Protocol {
    pub config: ProtocolConfig,
    pub ledger: Arc<InMemoryLedger>,
    pub tokens: Arc<TokenRegistry>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub services: Services,
    pub registry: Arc<AgreementRegistry>,
    pub terms_registry: Arc<TermsContractRegistry>,
    pub simple_interest: Arc<SimpleInterestTerms>,
    pub collateral: Arc<CollateralManager>,
    pub kernel: Arc<DebtKernel>,
    pub router: Arc<RepaymentRouter>,
    pub usd: TokenId,
    pub gold: TokenId,
}

impl Protocol {
    pub fn new() -> Self {
        let config = ProtocolConfig::default();
        // Another test in the same binary may already own the global subscriber.
        let _ = init_tracing(&config.logging);

        let kernel_account = AccountId::from_label("debt-kernel");
        let router_account = AccountId::from_label("repayment-router");
        let custody = AccountId::from_label("collateralizer");

        let ledger = Arc::new(InMemoryLedger::new(owner()));
        let clock = Arc::new(ManualClock::new(START));
        let sink = Arc::new(MemorySink::new());
        let services = Services::new(ledger.clone(), clock.clone(), sink.clone());

        let tokens = Arc::new(TokenRegistry::new(owner()));
        let usd = tokens.add_token(&owner(), 0, "USD", 6).expect("register USD");
        let gold = tokens.add_token(&owner(), 1, "GLD", 6).expect("register GLD");

        let registry = Arc::new(AgreementRegistry::new(owner(), services.clone()));
        let simple_interest = Arc::new(SimpleInterestTerms::new(
            AccountId::from_label("simple-interest"),
            kernel_account,
            router_account,
            registry.clone(),
            tokens.clone(),
        ));
        let terms_registry = Arc::new(TermsContractRegistry::new(owner()));
        terms_registry
            .register(&owner(), simple_interest.clone())
            .expect("register simple interest terms");

        let collateral = Arc::new(CollateralManager::new(
            custody,
            owner(),
            &config.collateral,
            registry.clone(),
            terms_registry.clone(),
            tokens.clone(),
            services.clone(),
        ));
        let kernel = Arc::new(DebtKernel::new(
            kernel_account,
            owner(),
            registry.clone(),
            terms_registry.clone(),
            tokens.clone(),
            collateral.clone(),
            services.clone(),
        ));
        let router = Arc::new(RepaymentRouter::new(
            router_account,
            owner(),
            registry.clone(),
            terms_registry.clone(),
            services.clone(),
        ));

        registry
            .authorizations()
            .authorize(&owner(), Capability::Insert, kernel_account)
            .expect("grant insert");
        collateral
            .authorizations()
            .authorize(&owner(), Capability::Collateralize, kernel_account)
            .expect("grant collateralize");
        let ledger_auth = ledger.authorizations();
        ledger_auth
            .authorize(&owner(), Capability::Mint, owner())
            .expect("grant mint");
        for agent in [kernel_account, router_account, custody] {
            ledger_auth
                .authorize(&owner(), Capability::Transfer, agent)
                .expect("grant transfer");
        }

        Self {
            config,
            ledger,
            tokens,
            clock,
            sink,
            services,
            registry,
            terms_registry,
            simple_interest,
            collateral,
            kernel,
            router,
            usd,
            gold,
        }
    }

    /// Mint `amount` of `token` to `account` and let the protocol spend all of it.
    pub fn fund(&self, account: &AccountId, token: &TokenId, amount: Amount) {
        self.ledger
            .mint(&owner(), token, account, amount)
            .expect("mint");
        self.approve_all(account, token);
    }

    /// Let the protocol spend the whole current balance of `account`.
    pub fn approve_all(&self, account: &AccountId, token: &TokenId) {
        let balance = self.ledger.balance_of(token, account);
        self.ledger.approve(account, token, balance).expect("approve");
    }

    pub fn balance(&self, token: &TokenId, account: &AccountId) -> Amount {
        self.ledger.balance_of(token, account)
    }

    /// An escrow lending USD, with ledger rights for its custody account.
    pub fn escrow(&self, label: &str, regulator: AccountId, target: Amount) -> PooledEscrow {
        let account = AccountId::from_label(label);
        self.ledger
            .authorizations()
            .authorize(&owner(), Capability::Transfer, account)
            .expect("grant escrow transfer");
        PooledEscrow::new(
            EscrowParams {
                account,
                regulator,
                token: self.usd,
                target,
            },
            &self.config.escrow,
            self.kernel.clone(),
            self.terms_registry.clone(),
            self.services.clone(),
        )
        .expect("escrow")
    }

    pub fn advance(&self, seconds: u64) {
        self.clock.advance(seconds);
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

/// Three monthly installments at 40% simple interest per month, in USD.
pub fn quarterly_terms(principal: Amount, collateral: Option<CollateralTerms>) -> TermsParameters {
    TermsParameters {
        principal_token_index: 0,
        principal_amount: principal,
        interest_rate: 400_000,
        amortization_unit: AmortizationUnit::Months,
        term_length: 3,
        collateral,
    }
}

/// A fee-free order between `debtor` and `creditor` expiring a day from now.
pub fn plain_order(
    protocol: &Protocol,
    debtor: &KeyPair,
    creditor: AccountId,
    terms: &TermsParameters,
    salt: u128,
) -> DebtOrder {
    DebtOrder {
        issuance: Issuance {
            version: protocol.router.account(),
            debtor: debtor.account_id(),
            underwriter: AccountId::NULL,
            underwriter_risk_rating: 0,
            terms_contract: protocol.simple_interest.terms_id(),
            terms_parameters: terms.encode().expect("encode terms"),
            salt,
        },
        creditor,
        principal_amount: terms.principal_amount,
        principal_token: protocol.usd,
        underwriter_fee: 0,
        relayer: AccountId::NULL,
        relayer_fee: 0,
        creditor_fee: 0,
        debtor_fee: 0,
        expiration: protocol.services.now() + DAY,
    }
}

/// Signatures from whichever of the parties are given.
pub fn sign_order(
    protocol: &Protocol,
    order: &DebtOrder,
    debtor: Option<&KeyPair>,
    creditor: Option<&KeyPair>,
    underwriter: Option<&KeyPair>,
) -> OrderSignatures {
    let hash = protocol.kernel.order_hash(order);
    let underwriter_hash = protocol.kernel.underwriter_message_hash(order);
    OrderSignatures {
        debtor: debtor.map(|kp| sign_digest(hash.as_bytes(), kp)),
        creditor: creditor.map(|kp| sign_digest(hash.as_bytes(), kp)),
        underwriter: underwriter.map(|kp| sign_digest(&underwriter_hash, kp)),
    }
}
