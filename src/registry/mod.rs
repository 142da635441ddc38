//! Gateway-owned bridging state
//!
//! Both registries live for the whole process and are shared between
//! request tasks behind `parking_lot` locks.

pub mod events;
pub mod transactions;

pub use events::{DeliveryState, EventInfo, EventRegistry};
pub use transactions::{TRANSACTION_ID_LIMIT, TransactionEntry, TransactionId, TransactionRegistry};
