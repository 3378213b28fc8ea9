//! Trade Thread - Buyer/Seller Transaction Coordination
//!
//! A Rust library that coordinates a buyer and a seller around a single
//! listed item: a one-time purchase claim, a message thread between the two
//! participants, buyer-confirmed completion and mutual ratings afterwards.
//!
//! # Features
//!
//! - One claim per item, enforced by storage constraints
//! - Message threads with a 15 minute edit/delete window and soft deletion
//! - Unread counters and an ordered sidebar of open transactions
//! - Idempotent completion with a best-effort seller notification
//! - Post-completion ratings with rounded averages

/// Sale claim ledger and completion gate
pub mod claims;
/// Injectable time source
pub mod clock;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Participant resolution and authorization checks
pub mod guard;
/// Listing registry seam
pub mod listing;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Completion notification seam
pub mod notify;
/// Rating ledger
pub mod ratings;
/// Database schema definitions
pub mod schema;
/// Service facade over all operations
pub mod service;
/// Message thread store
pub mod thread;
/// Unread counters and sidebar
pub mod unread;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use claims::Completion;
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::Database;
pub use error::{Result, TradeError};
pub use listing::{ListingRegistry, SqliteListings};
pub use models::{Item, Message, NewMessage, NewRating, OutputFormat, SaleClaim};
pub use notify::{CompletionNotice, NotificationDispatcher};
pub use service::TradeService;
