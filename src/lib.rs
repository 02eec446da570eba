//! # Flowpilot — options-flow trading assistant core
//!
//! ```text
//!  indicator feed ──▶ FeedAggregator ──▶ Strategy (per settings) ──▶ TradeManager
//!                                                                     │   ▲
//!                                                       Order::execute │   │ OrderEvent
//!                                                                     ▼   │
//!                                                    MarketUiDriver (brokerage page)
//! ```
//!
//! The library holds the whole trading core; the `flowpilot` binary wraps it in
//! an axum server for the feed, the operator controls and the dashboard.

pub mod automation;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod models;
pub mod order;
pub mod routes;
pub mod settings;
pub mod state;
pub mod strategy;
pub mod trade_manager;
