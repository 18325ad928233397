//! Integration test: collateral locked at fill, then released or seized.

use accord_core::{CollateralTerms, Notification};
use accord_crypto::KeyPair;
use accord_integration_tests::{plain_order, quarterly_terms, relayer, sign_order, Protocol, DAY, MONTH};
use accord_protocol::{CollateralError, KernelError, LockStatus};

struct Loan {
    protocol: Protocol,
    debtor: KeyPair,
    creditor: KeyPair,
    id: accord_core::AgreementId,
}

fn gold_collateral() -> CollateralTerms {
    CollateralTerms {
        token_index: 1,
        amount: 1_700,
        grace_period_days: 3,
    }
}

fn collateralized_loan() -> Loan {
    let protocol = Protocol::new();
    let debtor = KeyPair::from_seed(&[21u8; 32]);
    let creditor = KeyPair::from_seed(&[22u8; 32]);
    protocol.fund(&creditor.account_id(), &protocol.usd, 5_000);
    protocol.fund(&debtor.account_id(), &protocol.gold, 2_000);

    let terms = quarterly_terms(1_000, Some(gold_collateral()));
    let order = plain_order(&protocol, &debtor, creditor.account_id(), &terms, 1);
    let sigs = sign_order(&protocol, &order, Some(&debtor), Some(&creditor), None);
    let id = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect("collateralized fill");
    Loan {
        protocol,
        debtor,
        creditor,
        id,
    }
}

#[test]
fn test_fill_moves_collateral_into_custody() {
    let loan = collateralized_loan();
    let p = &loan.protocol;
    let custody = p.collateral.custody_account();

    assert_eq!(p.balance(&p.gold, &loan.debtor.account_id()), 300);
    assert_eq!(p.balance(&p.gold, &custody), 1_700);
    let lock = p.collateral.active_lock(&loan.id).expect("lock");
    assert_eq!(lock.party, loan.debtor.account_id());
    assert_eq!(lock.token, p.gold);
    assert_eq!(lock.grace_period_days, 3);
    assert_eq!(p.sink.of_kind("collateral_locked").len(), 1);
}

#[test]
fn test_fill_without_enough_collateral_leaves_no_trace() {
    let protocol = Protocol::new();
    let debtor = KeyPair::from_seed(&[23u8; 32]);
    let creditor = KeyPair::from_seed(&[24u8; 32]);
    protocol.fund(&creditor.account_id(), &protocol.usd, 5_000);
    protocol.fund(&debtor.account_id(), &protocol.gold, 100);

    let terms = quarterly_terms(1_000, Some(gold_collateral()));
    let order = plain_order(&protocol, &debtor, creditor.account_id(), &terms, 2);
    let sigs = sign_order(&protocol, &order, Some(&debtor), Some(&creditor), None);

    let err = protocol
        .kernel
        .fill_order(&relayer(), &order, &sigs)
        .expect_err("collateral transfer fails");
    assert!(matches!(err, KernelError::Collateral(_)));

    assert!(protocol.registry.is_empty());
    assert_eq!(protocol.balance(&protocol.usd, &creditor.account_id()), 5_000);
    assert_eq!(protocol.balance(&protocol.usd, &debtor.account_id()), 0);
    assert_eq!(protocol.balance(&protocol.gold, &debtor.account_id()), 100);
}

#[test]
fn test_release_after_full_repayment() {
    let loan = collateralized_loan();
    let p = &loan.protocol;
    let debtor = loan.debtor.account_id();
    p.fund(&debtor, &p.usd, 1_202);

    assert!(matches!(
        p.collateral.release(&loan.id),
        Err(CollateralError::DebtInDefault(_))
    ));

    for _ in 0..3 {
        p.advance(MONTH);
        let outcome = p.router.repay(&debtor, &loan.id, 734, &p.usd).expect("repay");
        assert!(outcome.is_repaid());
    }
    assert_eq!(p.balance(&p.usd, &loan.creditor.account_id()), 4_000 + 2_202);

    let lock = p.collateral.release(&loan.id).expect("release");
    assert_eq!(lock.amount, 1_700);
    assert_eq!(p.balance(&p.gold, &debtor), 2_000);
    assert_eq!(p.collateral.resolution(&loan.id), Some(LockStatus::Returned));
    assert!(p.collateral.active_lock(&loan.id).is_none());

    assert!(matches!(
        p.collateral.seize(&loan.id),
        Err(CollateralError::AlreadyResolved(_))
    ));
}

#[test]
fn test_seize_respects_grace_period() {
    let loan = collateralized_loan();
    let p = &loan.protocol;
    let debtor = loan.debtor.account_id();
    p.approve_all(&debtor, &p.usd);

    p.advance(MONTH + DAY);
    p.router.repay(&debtor, &loan.id, 734, &p.usd).expect("first installment");

    // Second installment is due, but the grace period has not run out.
    p.advance(MONTH + DAY);
    assert!(matches!(
        p.collateral.seize(&loan.id),
        Err(CollateralError::DebtNotInDefault(_))
    ));

    p.advance(3 * DAY);
    let lock = p.collateral.seize(&loan.id).expect("seize");
    assert_eq!(p.balance(&p.gold, &loan.creditor.account_id()), lock.amount);
    assert_eq!(p.collateral.resolution(&loan.id), Some(LockStatus::Seized));

    let seized = p.sink.of_kind("collateral_seized");
    assert_eq!(seized.len(), 1);
    match &seized[0].notification {
        Notification::CollateralSeized { beneficiary, .. } => {
            assert_eq!(*beneficiary, loan.creditor.account_id())
        }
        other => panic!("unexpected notification {:?}", other),
    }
}
