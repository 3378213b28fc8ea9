//! Sale claim ledger and completion gate

mod common;

use std::sync::Arc;

use common::{Harness, MockDispatcher, BUYER, OTHER_BUYER, SELLER, STRANGER};
use trade_thread::models::ClaimState;
use trade_thread::TradeError;

#[test]
fn test_claim_creates_open_claim() {
    let h = Harness::new();
    h.add_item(1, SELLER);

    let claim = h.service.claim_item(1, BUYER).unwrap();
    assert_eq!(claim.buyer_id, BUYER);
    assert_eq!(claim.state, ClaimState::Open);

    let participants = h.service.participants(1).unwrap();
    assert_eq!(participants.owner_id, SELLER);
    assert_eq!(participants.buyer_id, Some(BUYER));
}

#[test]
fn test_second_claim_conflicts() {
    let h = Harness::new();
    h.claimed_item(1);

    let err = h.service.claim_item(1, OTHER_BUYER).unwrap_err();
    assert!(matches!(err, TradeError::Conflict(_)));
    assert_eq!(err.status_code(), 409);

    // The original buyer keeps the claim
    assert_eq!(h.service.participants(1).unwrap().buyer_id, Some(BUYER));
}

#[test]
fn test_owner_cannot_claim_own_item() {
    let h = Harness::new();
    h.add_item(1, SELLER);

    let err = h.service.claim_item(1, SELLER).unwrap_err();
    assert!(matches!(err, TradeError::Forbidden(_)));
    assert_eq!(h.service.participants(1).unwrap().buyer_id, None);
}

#[test]
fn test_claim_unknown_item() {
    let h = Harness::new();
    let err = h.service.claim_item(99, BUYER).unwrap_err();
    assert!(matches!(err, TradeError::NotFound(_)));
}

#[test]
fn test_concurrent_claims_single_winner() {
    let h = Harness::new();
    h.add_item(1, SELLER);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (10..18)
            .map(|buyer| {
                let service = &h.service;
                s.spawn(move || service.claim_item(1, buyer))
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, TradeError::Conflict(_))));
}

#[tokio::test]
async fn test_complete_dispatches_exactly_once() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_notify_completion()
        .withf(|notice| notice.item.id == 1 && notice.buyer_id == BUYER && notice.seller_id == SELLER)
        .times(1)
        .returning(|_| Ok(()));
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.claimed_item(1);

    let first = h.service.complete_transaction(1, BUYER).unwrap();
    assert!(first.newly_completed);
    assert_eq!(first.claim.state, ClaimState::Completed);
    first.notification.expect("notice dispatched").await.unwrap();

    let second = h.service.complete_transaction(1, BUYER).unwrap();
    assert!(!second.newly_completed);
    assert!(second.notification.is_none());
    assert!(h.service.participants(1).is_ok());

    assert_eq!(h.service.metrics().snapshot().notifications_sent, 1);
}

#[tokio::test]
async fn test_dispatch_failure_does_not_roll_back() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_notify_completion()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("mail server down")));
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.claimed_item(1);

    let completion = h.service.complete_transaction(1, BUYER).unwrap();
    completion.notification.expect("notice dispatched").await.unwrap();

    let status = h.service.rating_status(1, BUYER).unwrap();
    assert!(status.completed);
    assert_eq!(h.service.metrics().snapshot().notifications_failed, 1);
}

#[tokio::test]
async fn test_non_buyer_cannot_complete() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_notify_completion().times(0);
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.claimed_item(1);

    for user in [SELLER, STRANGER] {
        let err = h.service.complete_transaction(1, user).unwrap_err();
        assert!(matches!(err, TradeError::Forbidden(_)));
    }
    assert!(!h.service.rating_status(1, BUYER).unwrap().completed);
}

#[test]
fn test_complete_without_claim_is_forbidden() {
    let h = Harness::new();
    h.add_item(1, SELLER);

    let err = h.service.complete_transaction(1, BUYER).unwrap_err();
    assert!(matches!(err, TradeError::Forbidden(_)));
}

/// Runtime used only to wait on notice tasks from synchronous tests
fn waiter() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime")
}

#[test]
fn test_complete_without_runtime_still_notifies() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_notify_completion()
        .withf(|notice| notice.item.id == 1 && notice.seller_id == SELLER)
        .times(1)
        .returning(|_| Ok(()));
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.claimed_item(1);

    let completion = h.service.complete_transaction(1, BUYER).unwrap();
    assert!(completion.newly_completed);
    let notification = completion.notification.expect("notice dispatched");
    waiter().block_on(notification).unwrap();

    assert_eq!(h.service.metrics().snapshot().notifications_sent, 1);
}

#[test]
fn test_concurrent_completions_dispatch_once() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_notify_completion().times(1).returning(|_| Ok(()));
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.claimed_item(1);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = &h.service;
                s.spawn(move || service.complete_transaction(1, BUYER))
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    let completions: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(completions.iter().filter(|c| c.newly_completed).count(), 1);

    let rt = waiter();
    let mut dispatched = 0;
    for completion in completions {
        assert_eq!(completion.claim.state, ClaimState::Completed);
        if let Some(notification) = completion.notification {
            rt.block_on(notification).unwrap();
            dispatched += 1;
        }
    }
    assert_eq!(dispatched, 1);
    assert_eq!(h.service.metrics().snapshot().notifications_sent, 1);
}

#[tokio::test]
async fn test_completed_purchases() {
    let h = Harness::new();
    h.claimed_item(1);
    h.claimed_item(2);
    h.add_item(3, SELLER);
    h.service.claim_item(3, OTHER_BUYER).unwrap();

    for item in [2, 3] {
        let buyer = if item == 3 { OTHER_BUYER } else { BUYER };
        h.service.complete_transaction(item, buyer).unwrap();
    }

    let bought = h.service.completed_purchases(BUYER).unwrap();
    assert_eq!(bought.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2]);
}
