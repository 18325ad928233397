//! Integration test: repayments routed to the beneficiary and tracked by the
//! terms contract.

use accord_core::{AccountId, AgreementId, Notification};
use accord_crypto::KeyPair;
use accord_integration_tests::{plain_order, quarterly_terms, relayer, sign_order, Protocol, MONTH};
use accord_protocol::{RepaymentDiagnostic, RepaymentOutcome, RouterError, TermsContract};

fn issued(protocol: &Protocol, debtor: &KeyPair, creditor: &KeyPair) -> AgreementId {
    protocol.fund(&creditor.account_id(), &protocol.usd, 1_000);
    let terms = quarterly_terms(1_000, None);
    let order = plain_order(protocol, debtor, creditor.account_id(), &terms, 1);
    let sigs = sign_order(protocol, &order, Some(debtor), Some(creditor), None);
    protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect("fill")
}

#[test]
fn test_installments_accumulate() {
    let protocol = Protocol::new();
    let debtor = KeyPair::from_seed(&[31u8; 32]);
    let creditor = KeyPair::from_seed(&[32u8; 32]);
    let id = issued(&protocol, &debtor, &creditor);
    protocol.fund(&debtor.account_id(), &protocol.usd, 1_202);
    let terms = &protocol.simple_interest;
    let start = protocol.services.now();

    assert_eq!(terms.installment(&id).expect("installment"), 734);
    assert_eq!(terms.expected_repayment_value(&id, start).expect("expected"), 0);
    assert_eq!(
        terms
            .expected_repayment_value(&id, start + MONTH)
            .expect("expected"),
        733
    );
    assert_eq!(
        terms
            .expected_repayment_value(&id, start + 2 * MONTH)
            .expect("expected"),
        1_466
    );

    for paid in 1..=3u128 {
        protocol.advance(MONTH);
        let outcome = protocol
            .router
            .repay(&debtor.account_id(), &id, 734, &protocol.usd)
            .expect("repay");
        match outcome {
            RepaymentOutcome::Repaid(receipt) => {
                assert_eq!(receipt.beneficiary, creditor.account_id());
                assert_eq!(receipt.amount, 734);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(terms.value_repaid_to_date(&id).expect("repaid"), 734 * paid);
    }

    assert_eq!(protocol.balance(&protocol.usd, &creditor.account_id()), 2_202);
    assert_eq!(protocol.balance(&protocol.usd, &debtor.account_id()), 0);
    assert_eq!(protocol.sink.of_kind("repayment").len(), 3);
}

#[test]
fn test_unknown_agreement_is_diagnosed() {
    let protocol = Protocol::new();
    let payer = AccountId::from_label("payer");
    protocol.fund(&payer, &protocol.usd, 100);
    let unknown = AgreementId::from_bytes([7u8; 32]);

    let outcome = protocol
        .router
        .repay(&payer, &unknown, 50, &protocol.usd)
        .expect("routed");
    assert!(matches!(
        outcome,
        RepaymentOutcome::Rejected(RepaymentDiagnostic::AgreementNotFound)
    ));
    assert_eq!(protocol.balance(&protocol.usd, &payer), 100);

    let rejected = protocol.sink.of_kind("repayment_rejected");
    assert_eq!(rejected.len(), 1);
    match &rejected[0].notification {
        Notification::RepaymentRejected { code, .. } => assert_eq!(*code, 0),
        other => panic!("unexpected notification {:?}", other),
    }
}

#[test]
fn test_underfunded_payer_is_diagnosed() {
    let protocol = Protocol::new();
    let debtor = KeyPair::from_seed(&[33u8; 32]);
    let creditor = KeyPair::from_seed(&[34u8; 32]);
    let id = issued(&protocol, &debtor, &creditor);

    // The principal sits with the debtor but nothing is approved yet.
    let outcome = protocol
        .router
        .repay(&debtor.account_id(), &id, 500, &protocol.usd)
        .expect("routed");
    assert!(matches!(
        outcome,
        RepaymentOutcome::Rejected(RepaymentDiagnostic::PayerBalanceOrAllowanceInsufficient)
    ));
    assert_eq!(
        protocol
            .simple_interest
            .value_repaid_to_date(&id)
            .expect("repaid"),
        0
    );
}

#[test]
fn test_third_party_may_repay() {
    let protocol = Protocol::new();
    let debtor = KeyPair::from_seed(&[35u8; 32]);
    let creditor = KeyPair::from_seed(&[36u8; 32]);
    let id = issued(&protocol, &debtor, &creditor);
    let guarantor = AccountId::from_label("guarantor");
    protocol.fund(&guarantor, &protocol.usd, 2_200);

    let outcome = protocol
        .router
        .repay(&guarantor, &id, 2_200, &protocol.usd)
        .expect("repay");
    assert!(outcome.is_repaid());
    assert_eq!(
        protocol
            .simple_interest
            .value_repaid_to_date(&id)
            .expect("repaid"),
        2_200
    );
}

#[test]
fn test_input_errors() {
    let protocol = Protocol::new();
    let payer = AccountId::from_label("payer");
    let id = AgreementId::from_bytes([1u8; 32]);
    assert!(matches!(
        protocol.router.repay(&payer, &id, 0, &protocol.usd),
        Err(RouterError::InvalidAmount)
    ));
    assert!(matches!(
        protocol.router.repay(&payer, &id, 10, &accord_core::TokenId::NULL),
        Err(RouterError::InvalidToken)
    ));
}
