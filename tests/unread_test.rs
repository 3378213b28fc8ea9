//! Unread counters and the open-transaction sidebar

mod common;

use chrono::Duration;
use common::{t0, Harness, BUYER, OTHER_BUYER, SELLER, STRANGER};
use trade_thread::models::TransactionRole;
use trade_thread::NewMessage;

#[test]
fn test_unread_counts_by_scope() {
    let h = Harness::new();
    h.claimed_item(1);
    h.claimed_item(2);

    h.service.send_message(1, BUYER, NewMessage::text("a")).unwrap();
    h.service.send_message(1, BUYER, NewMessage::text("b")).unwrap();
    h.service.send_message(2, BUYER, NewMessage::text("c")).unwrap();

    let counts = h.service.get_unread_counts(SELLER).unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.open_transactions, 3);
    assert_eq!(counts.as_seller, 3);
    assert_eq!(counts.as_buyer, 0);
    assert_eq!(h.service.unread_for_item(SELLER, 1).unwrap(), 2);
    assert_eq!(h.service.unread_for_item(SELLER, 2).unwrap(), 1);
    assert_eq!(h.service.get_unread_counts(BUYER).unwrap().total, 0);
}

#[tokio::test]
async fn test_completed_transactions_leave_open_count() {
    let h = Harness::new();
    h.claimed_item(1);
    h.claimed_item(2);
    h.service.send_message(1, BUYER, NewMessage::text("done soon")).unwrap();
    h.service.send_message(2, BUYER, NewMessage::text("still open")).unwrap();
    h.service.complete_transaction(1, BUYER).unwrap();

    let counts = h.service.get_unread_counts(SELLER).unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.open_transactions, 1);
}

#[test]
fn test_unread_split_by_role() {
    let h = Harness::new();
    // BUYER buys item 1 from SELLER and sells item 2 to OTHER_BUYER
    h.claimed_item(1);
    h.add_item(2, BUYER);
    h.service.claim_item(2, OTHER_BUYER).unwrap();

    h.service.send_message(1, SELLER, NewMessage::text("shipped")).unwrap();
    h.service.send_message(2, OTHER_BUYER, NewMessage::text("when?")).unwrap();
    h.service.send_message(2, OTHER_BUYER, NewMessage::text("hello?")).unwrap();

    let counts = h.service.get_unread_counts(BUYER).unwrap();
    assert_eq!(counts.as_buyer, 1);
    assert_eq!(counts.as_seller, 2);
    assert_eq!(counts.open_transactions, 3);
    assert_eq!(h.service.open_transaction_count(BUYER).unwrap(), 2);
}

#[test]
fn test_sidebar_orders_by_latest_message() {
    let h = Harness::new();
    for id in [1, 2, 3] {
        h.claimed_item(id);
    }

    h.service.send_message(1, BUYER, NewMessage::text("one")).unwrap();
    h.clock.advance(Duration::minutes(1));
    h.service.send_message(3, SELLER, NewMessage::text("three")).unwrap();
    h.clock.advance(Duration::minutes(1));
    h.service.send_message(2, BUYER, NewMessage::text("two")).unwrap();

    let sidebar = h.service.get_sidebar_transactions(SELLER, None).unwrap();
    assert_eq!(sidebar.iter().map(|t| t.item.id).collect::<Vec<_>>(), vec![2, 3, 1]);
    assert!(sidebar.iter().all(|t| t.role == TransactionRole::Seller));
    assert!(sidebar.iter().all(|t| t.counterparty_id == BUYER));
    assert_eq!(sidebar[0].unread_count, 1);
    assert_eq!(sidebar[1].unread_count, 0);
    assert_eq!(sidebar[0].latest_message_at, t0() + Duration::minutes(2));
}

#[test]
fn test_sidebar_falls_back_to_item_update_and_breaks_ties_by_id() {
    let h = Harness::new();
    let later = t0() + Duration::hours(1);
    h.add_item_at(5, SELLER, later);
    h.add_item_at(4, SELLER, later);
    h.add_item_at(6, SELLER, t0());
    for id in [4, 5, 6] {
        h.service.claim_item(id, BUYER).unwrap();
    }

    let sidebar = h.service.get_sidebar_transactions(BUYER, None).unwrap();
    assert_eq!(sidebar.iter().map(|t| t.item.id).collect::<Vec<_>>(), vec![4, 5, 6]);
    assert!(sidebar.iter().all(|t| t.role == TransactionRole::Buyer));
    assert_eq!(sidebar[2].latest_message_at, t0());
}

#[tokio::test]
async fn test_sidebar_scope() {
    let h = Harness::new();
    h.claimed_item(1);
    h.claimed_item(2);
    h.claimed_item(3);
    h.add_item(4, SELLER);
    h.service.claim_item(4, OTHER_BUYER).unwrap();
    h.add_item(5, SELLER);
    h.service.complete_transaction(3, BUYER).unwrap();

    // Excluded item, completed item, unclaimed item and other buyers' items are left out
    let sidebar = h.service.get_sidebar_transactions(BUYER, Some(1)).unwrap();
    assert_eq!(sidebar.iter().map(|t| t.item.id).collect::<Vec<_>>(), vec![2]);

    let seller_side = h.service.get_sidebar_transactions(SELLER, None).unwrap();
    let mut ids: Vec<_> = seller_side.iter().map(|t| t.item.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 4]);

    assert!(h.service.get_sidebar_transactions(STRANGER, None).unwrap().is_empty());
}

#[test]
fn test_sidebar_ignores_deleted_messages_for_ordering() {
    let h = Harness::new();
    h.claimed_item(1);
    h.claimed_item(2);

    h.service.send_message(1, BUYER, NewMessage::text("early")).unwrap();
    h.clock.advance(Duration::minutes(1));
    let late = h.service.send_message(2, BUYER, NewMessage::text("late")).unwrap();
    h.service.delete_message(late.id, BUYER).unwrap();

    let sidebar = h.service.get_sidebar_transactions(SELLER, None).unwrap();
    assert_eq!(sidebar[0].item.id, 1);
    assert_eq!(sidebar[0].latest_message_at, t0());
    // No visible messages on item 2, so it falls back to the item's update time
    assert_eq!(sidebar[1].latest_message_at, t0());
    assert_eq!(sidebar[1].unread_count, 0);
}

#[test]
fn test_sidebar_ignores_unrelated_open_claims() {
    let h = Harness::new();
    // More open claims between other users than SQLite binds in one statement
    h.seed_open_claims(1_000, 33_000, STRANGER, OTHER_BUYER);
    h.claimed_item(1);

    let sidebar = h.service.get_sidebar_transactions(SELLER, None).unwrap();
    assert_eq!(sidebar.iter().map(|t| t.item.id).collect::<Vec<_>>(), vec![1]);
    assert_eq!(h.service.open_transaction_count(BUYER).unwrap(), 1);
}

#[test]
fn test_sidebar_for_owner_with_many_open_sales() {
    let h = Harness::new();
    h.seed_open_claims(100, 1_200, SELLER, BUYER);

    let sidebar = h.service.get_sidebar_transactions(SELLER, Some(100)).unwrap();
    assert_eq!(sidebar.len(), 1_199);
    assert_eq!(sidebar[0].item.id, 101);
    assert!(sidebar.iter().all(|t| t.role == TransactionRole::Seller));
    assert_eq!(h.service.open_transaction_count(BUYER).unwrap(), 1_200);
}
