//! Agreement, issuance, and debt order types and their canonical digests.

use accord_core::{
    AccountId, AgreementId, Amount, OrderHash, RiskRating, TermsContractParameters, Timestamp,
    TokenId,
};
use accord_crypto::{DomainHasher, Signature};
use serde::{Deserialize, Serialize};

const AGREEMENT_DOMAIN: &str = "accord.agreement.v1";
const ORDER_DOMAIN: &str = "accord.order.v1";
const UNDERWRITER_DOMAIN: &str = "accord.underwriter.v1";

/// The inputs that identify an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    /// Repayment router the agreement is bound to.
    pub version: AccountId,
    pub debtor: AccountId,
    /// Null when the order is not underwritten.
    pub underwriter: AccountId,
    pub underwriter_risk_rating: RiskRating,
    pub terms_contract: AccountId,
    pub terms_parameters: TermsContractParameters,
    pub salt: u128,
}

impl Issuance {
    /// Deterministic agreement identifier. Identical inputs yield identical ids.
    pub fn agreement_id(&self) -> AgreementId {
        let digest = DomainHasher::new(AGREEMENT_DOMAIN)
            .bytes32(self.version.as_bytes())
            .bytes32(self.debtor.as_bytes())
            .bytes32(self.underwriter.as_bytes())
            .u32(self.underwriter_risk_rating)
            .bytes32(self.terms_contract.as_bytes())
            .bytes32(self.terms_parameters.as_bytes())
            .u128(self.salt)
            .finalize();
        AgreementId::from_bytes(digest)
    }
}

/// A proposed agreement plus its funding and fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtOrder {
    pub issuance: Issuance,
    /// Account that funds the principal; becomes the first beneficiary.
    pub creditor: AccountId,
    pub principal_amount: Amount,
    pub principal_token: TokenId,
    pub underwriter_fee: Amount,
    /// Null when no relayer is involved.
    pub relayer: AccountId,
    pub relayer_fee: Amount,
    pub creditor_fee: Amount,
    pub debtor_fee: Amount,
    pub expiration: Timestamp,
}

impl DebtOrder {
    pub fn agreement_id(&self) -> AgreementId {
        self.issuance.agreement_id()
    }

    /// Digest signed by debtor and creditor.
    ///
    /// The creditor is not part of the digest, so an open order can be
    /// countersigned by whichever creditor takes it.
    pub fn order_hash(&self, kernel: &AccountId) -> OrderHash {
        let digest = DomainHasher::new(ORDER_DOMAIN)
            .bytes32(kernel.as_bytes())
            .bytes32(self.agreement_id().as_bytes())
            .u128(self.underwriter_fee)
            .u128(self.principal_amount)
            .bytes32(self.principal_token.as_bytes())
            .u128(self.debtor_fee)
            .u128(self.creditor_fee)
            .bytes32(self.relayer.as_bytes())
            .u128(self.relayer_fee)
            .u64(self.expiration)
            .finalize();
        OrderHash::from_bytes(digest)
    }

    /// Digest signed by the underwriter, over the subset of the order the
    /// underwriter vouches for.
    pub fn underwriter_message_hash(&self, kernel: &AccountId) -> [u8; 32] {
        DomainHasher::new(UNDERWRITER_DOMAIN)
            .bytes32(kernel.as_bytes())
            .bytes32(self.agreement_id().as_bytes())
            .u128(self.underwriter_fee)
            .u128(self.principal_amount)
            .bytes32(self.principal_token.as_bytes())
            .u64(self.expiration)
            .finalize()
    }

    /// Total the creditor pays out: principal plus creditor fee.
    pub fn creditor_outlay(&self) -> Option<Amount> {
        self.principal_amount.checked_add(self.creditor_fee)
    }
}

/// Consent signatures accompanying an order. A party that submits the order
/// itself need not sign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSignatures {
    pub debtor: Option<Signature>,
    pub creditor: Option<Signature>,
    pub underwriter: Option<Signature>,
}

/// Canonical record of an issued agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub agreement_id: AgreementId,
    pub version: AccountId,
    /// The only mutable field.
    pub beneficiary: AccountId,
    pub debtor: AccountId,
    pub underwriter: AccountId,
    pub underwriter_risk_rating: RiskRating,
    pub terms_contract: AccountId,
    pub terms_parameters: TermsContractParameters,
    pub issuance_timestamp: Timestamp,
}
