//! Durable event log. `PersistenceStore` is the seam: the
//! façade writes through it on every state transition and never touches a
//! concrete backend directly.

pub mod feed;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use feed::{ChangeEvent, ChangeFeed};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::domain::{AccountHistory, Fill, Order, OrderId, Position, Trade};
use crate::error::PersistenceError;

pub trait PersistenceStore: Send + Sync {
    fn save_order(&self, order: &Order) -> Result<(), PersistenceError>;
    fn update_order(&self, order: &Order) -> Result<(), PersistenceError>;
    fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError>;
    fn load_orders(&self) -> Result<Vec<Order>, PersistenceError>;

    fn save_fill(&self, fill: &Fill) -> Result<(), PersistenceError>;
    fn load_fills_for_order(&self, order_id: &OrderId) -> Result<Vec<Fill>, PersistenceError>;

    fn save_position(&self, position: &Position) -> Result<(), PersistenceError>;
    fn update_position(&self, position: &Position) -> Result<(), PersistenceError>;
    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError>;
    fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError>;

    fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError>;
    fn load_trades(&self) -> Result<Vec<Trade>, PersistenceError>;

    /// Returns the assigned autoincrement row id.
    fn save_account_snapshot(&self, snapshot: &AccountHistory) -> Result<i64, PersistenceError>;
    fn load_account_history(&self, limit: Option<i64>) -> Result<Vec<AccountHistory>, PersistenceError>;
}
