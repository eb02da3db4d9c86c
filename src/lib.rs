//! In-process paper-trading broker.
//!
//! Couples an order matching engine, an account kernel (balance, margin,
//! positions, SL/TP monitoring, realized P&L), and a durable persistence
//! layer behind a single façade (`broker::Broker`) that trading strategies
//! submit orders to and receive fills, position updates and trades from.

pub mod account;
pub mod broker;
pub mod config;
pub mod cost;
pub mod domain;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod rng;

pub use account::AccountKernel;
pub use broker::{AccountInfo, ActionOutcome, Broker, SubmitOutcome};
pub use config::BrokerConfig;
pub use domain::{
    Bar, Fill, FillId, Order, OrderId, OrderStatus, OrderType, Position, PositionId, Side,
    Symbol, TimeInForce, Trade, TradeId,
};
pub use error::{BrokerError, BrokerResult};
