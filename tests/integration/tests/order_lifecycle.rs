//! Integration test: debt orders from signature to registered agreement.
//!
//! Exercises the kernel together with the registry, the simple-interest
//! terms contract, the ledger and the notification sink.

use accord_core::{AccountId, Capability, Notification};
use accord_crypto::KeyPair;
use accord_integration_tests::{
    owner, plain_order, quarterly_terms, relayer, sign_order, Protocol, DAY,
};
use accord_ledger::TokenLedger;
use accord_protocol::{ConsentCheck, KernelError, TermsContract};

struct Parties {
    debtor: KeyPair,
    creditor: KeyPair,
    underwriter: KeyPair,
}

fn parties(protocol: &Protocol) -> Parties {
    let parties = Parties {
        debtor: KeyPair::from_seed(&[11u8; 32]),
        creditor: KeyPair::from_seed(&[12u8; 32]),
        underwriter: KeyPair::from_seed(&[13u8; 32]),
    };
    protocol.fund(&parties.creditor.account_id(), &protocol.usd, 10_000);
    parties
}

// =========================================================================
// Filling
// =========================================================================

#[test]
fn test_relayed_fill_with_full_fee_schedule() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);

    let mut order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 1);
    order.issuance.underwriter = p.underwriter.account_id();
    order.issuance.underwriter_risk_rating = 500;
    order.underwriter_fee = 20;
    order.relayer = relayer();
    order.relayer_fee = 10;
    order.creditor_fee = 15;
    order.debtor_fee = 15;
    let sigs = sign_order(
        &protocol,
        &order,
        Some(&p.debtor),
        Some(&p.creditor),
        Some(&p.underwriter),
    );

    let id = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect("fill should succeed");

    assert_eq!(protocol.balance(&protocol.usd, &p.debtor.account_id()), 985);
    assert_eq!(protocol.balance(&protocol.usd, &p.underwriter.account_id()), 20);
    assert_eq!(protocol.balance(&protocol.usd, &relayer()), 10);
    assert_eq!(protocol.balance(&protocol.usd, &p.creditor.account_id()), 8_985);

    let record = protocol.registry.get(&id).expect("record");
    assert_eq!(record.beneficiary, p.creditor.account_id());
    assert_eq!(record.debtor, p.debtor.account_id());
    assert_eq!(record.underwriter_risk_rating, 500);
    assert_eq!(record.issuance_timestamp, protocol.services.now());
    assert_eq!(
        protocol.registry.agreements_of_debtor(&p.debtor.account_id()),
        vec![id]
    );

    let term_end = protocol
        .simple_interest
        .term_end_timestamp(&id)
        .expect("term started");
    assert_eq!(
        protocol
            .simple_interest
            .expected_repayment_value(&id, term_end)
            .expect("expected value"),
        2_200
    );
    assert_eq!(protocol.sink.of_kind("agreement_inserted").len(), 1);
    assert_eq!(protocol.sink.of_kind("order_filled").len(), 1);
}

#[test]
fn test_debtor_may_fill_own_order() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 2);
    let sigs = sign_order(&protocol, &order, None, Some(&p.creditor), None);

    protocol
        .kernel
        .fill_order(&p.debtor.account_id(), &order, &sigs)
        .expect("debtor-submitted fill");
    assert_eq!(protocol.balance(&protocol.usd, &p.debtor.account_id()), 1_000);
}

#[test]
fn test_fill_is_single_use() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 3);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);

    let id = protocol.kernel.fill_order(&relayer(), &order, &sigs).expect("first fill");
    assert_eq!(
        protocol.kernel.fill_order(&relayer(), &order, &sigs),
        Err(KernelError::AlreadyIssued(id))
    );
    assert_eq!(protocol.registry.len(), 1);
    assert_eq!(protocol.balance(&protocol.usd, &p.creditor.account_id()), 9_000);
}

// =========================================================================
// Rejections
// =========================================================================

#[test]
fn test_expired_order_is_rejected_with_code() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 4);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);

    protocol.advance(2 * DAY);
    let err = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect_err("expired");
    assert_eq!(err, KernelError::OrderExpired);

    let rejected = protocol.sink.of_kind("fill_rejected");
    assert_eq!(rejected.len(), 1);
    match &rejected[0].notification {
        Notification::FillRejected { code, .. } => assert_eq!(*code, 1),
        other => panic!("unexpected notification {:?}", other),
    }
    assert!(protocol.registry.is_empty());
}

#[test]
fn test_missing_creditor_signature() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 5);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), None, None);

    assert_eq!(
        protocol.kernel.fill_order(&relayer(), &order, &sigs),
        Err(KernelError::InvalidSignature {
            check: ConsentCheck::Creditor
        })
    );
    assert_eq!(protocol.balance(&protocol.usd, &p.creditor.account_id()), 10_000);
}

#[test]
fn test_signature_from_wrong_key() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 6);
    let impostor = KeyPair::from_seed(&[99u8; 32]);
    let sigs = sign_order(&protocol, &order, Some(&impostor), Some(&p.creditor), None);

    assert_eq!(
        protocol.kernel.fill_order(&relayer(), &order, &sigs),
        Err(KernelError::InvalidSignature {
            check: ConsentCheck::Debtor
        })
    );
}

#[test]
fn test_unfunded_creditor() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(20_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 7);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);

    let err = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect_err("unfunded");
    assert_eq!(err.code(), Some(8));
}

#[test]
fn test_order_lending_another_token_than_its_terms() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    protocol.fund(&p.creditor.account_id(), &protocol.gold, 10_000);
    let terms = quarterly_terms(1_000, None);
    let mut order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 8);
    order.principal_token = protocol.gold;
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);

    let err = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect_err("token differs from terms");
    assert_eq!(err, KernelError::TermsMismatch("principal token"));
    assert_eq!(err.code(), Some(9));
    assert!(protocol.registry.is_empty());
    assert_eq!(protocol.balance(&protocol.gold, &p.creditor.account_id()), 10_000);
    assert_eq!(protocol.balance(&protocol.gold, &p.debtor.account_id()), 0);
}

// =========================================================================
// Cancellation
// =========================================================================

#[test]
fn test_cancelled_order_cannot_fill() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 8);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);

    assert_eq!(
        protocol.kernel.cancel_order(&p.creditor.account_id(), &order),
        Err(KernelError::NotDebtor)
    );
    let hash = protocol
        .kernel
        .cancel_order(&p.debtor.account_id(), &order)
        .expect("debtor cancels");
    assert!(protocol.kernel.is_order_cancelled(&hash));
    assert_eq!(
        protocol.kernel.fill_order(&relayer(), &order, &sigs),
        Err(KernelError::OrderCancelled(hash))
    );
}

#[test]
fn test_cancelled_issuance_blocks_every_order_for_it() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 9);

    let id = protocol
        .kernel
        .cancel_issuance(&p.debtor.account_id(), &order.issuance)
        .expect("debtor cancels issuance");
    assert!(protocol.kernel.is_issuance_cancelled(&id));

    let mut repriced = order.clone();
    repriced.creditor_fee = 5;
    repriced.debtor_fee = 0;
    repriced.relayer = relayer();
    repriced.relayer_fee = 5;
    let sigs = sign_order(&protocol, &repriced, Some(&p.debtor), Some(&p.creditor), None);
    assert_eq!(
        protocol.kernel.fill_order(&relayer(), &repriced, &sigs),
        Err(KernelError::IssuanceCancelled(id))
    );
}

// =========================================================================
// Beneficiary
// =========================================================================

#[test]
fn test_beneficiary_transfer_redirects_repayments() {
    let protocol = Protocol::new();
    let p = parties(&protocol);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(&protocol, &p.debtor, p.creditor.account_id(), &terms, 10);
    let sigs = sign_order(&protocol, &order, Some(&p.debtor), Some(&p.creditor), None);
    let id = protocol.kernel.fill_order(&relayer(), &order, &sigs).expect("fill");

    let buyer = AccountId::from_label("note-buyer");
    let editor = AccountId::from_label("secondary-market");
    protocol
        .registry
        .authorizations()
        .authorize(&owner(), Capability::Edit, editor)
        .expect("grant edit");
    let previous = protocol
        .registry
        .transfer_beneficiary(&editor, &id, buyer)
        .expect("transfer");
    assert_eq!(previous, p.creditor.account_id());

    protocol.approve_all(&p.debtor.account_id(), &protocol.usd);
    protocol
        .router
        .repay(&p.debtor.account_id(), &id, 500, &protocol.usd)
        .expect("repay");
    assert_eq!(protocol.ledger.balance_of(&protocol.usd, &buyer), 500);
    assert_eq!(protocol.sink.of_kind("beneficiary_transferred").len(), 1);
}
