//! End-to-end walks through a full transaction

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{t0, Harness, MockDispatcher, BUYER, SELLER};
use trade_thread::{NewMessage, NewRating, TradeError};

#[tokio::test]
async fn test_claim_message_complete_rate() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_notify_completion()
        .withf(|notice| notice.seller_id == SELLER && notice.buyer_id == BUYER)
        .times(1)
        .returning(|_| Ok(()));
    let h = Harness::with_dispatcher(Arc::new(dispatcher));
    h.add_item(10, SELLER);

    // Buyer claims and writes
    h.service.claim_item(10, BUYER).unwrap();
    let hello = h.service.send_message(10, BUYER, NewMessage::text("hello")).unwrap();
    assert_eq!(hello.receiver_id, SELLER);
    assert_eq!(h.service.get_unread_counts(SELLER).unwrap().total, 1);

    // Seller opens the thread
    let view = h.service.open_thread(10, SELLER).unwrap();
    assert_eq!(view.messages.len(), 1);
    assert!(view.messages[0].is_read);
    assert!(!view.rating.completed);
    assert!(view.other_transactions.is_empty());
    assert_eq!(h.service.get_unread_counts(SELLER).unwrap().total, 0);

    // Only the buyer may complete
    let err = h.service.complete_transaction(10, SELLER).unwrap_err();
    assert!(matches!(err, TradeError::Forbidden(_)));

    let completion = h.service.complete_transaction(10, BUYER).unwrap();
    assert!(completion.claim.is_completed());
    completion.notification.expect("notice dispatched").await.unwrap();

    // Buyer rates the seller once
    let rate = NewRating {
        item_id: 10,
        rated_user_id: SELLER,
        score: 5,
        comment: None,
    };
    h.service.submit_rating(BUYER, rate.clone()).unwrap();
    let err = h.service.submit_rating(BUYER, rate).unwrap_err();
    assert!(matches!(err, TradeError::Conflict(_)));

    let summary = h.service.rating_summary(SELLER).unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(summary.average(), Some(5.0));
    assert_eq!(h.service.completed_purchases(BUYER).unwrap().len(), 1);
}

#[test]
fn test_edit_window_walkthrough() {
    let h = Harness::new();
    h.claimed_item(10);

    let sent = h.service.send_message(10, BUYER, NewMessage::text("first draft")).unwrap();
    assert_eq!(sent.created_at, t0());

    h.clock.advance(Duration::minutes(10));
    let edited = h.service.edit_message(sent.id, BUYER, "second draft").unwrap();
    assert_eq!(edited.created_at, t0());

    h.clock.set(t0() + Duration::minutes(16));
    let err = h.service.edit_message(sent.id, BUYER, "third draft").unwrap_err();
    assert!(matches!(err, TradeError::Expired(_)));

    let thread = h.service.list_thread(10, BUYER).unwrap();
    assert_eq!(thread[0].body, "second draft");
    assert_eq!(thread[0].created_at, t0());

    let metrics = h.service.metrics().snapshot();
    assert!(metrics.rejections >= 1);
}
