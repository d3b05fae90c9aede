pub mod address;
pub mod config;
pub mod error;
pub mod observer;
pub mod product;
pub mod product_db;
pub mod schema;
pub mod selection;
pub mod store;
pub mod validation;

pub use address::{Address, AddressKind, AddressMatcher, Target};
pub use config::StoreConfig;
pub use error::{InventoryError, Result};
pub use observer::{ChangeEvent, ChangeKind, ChangeRegistry, Subscription};
pub use product::{Field, Product, ProductValues};
pub use rusqlite::types::Value as SqlValue;
pub use schema::Column;
pub use selection::{Selection, SortOrder};
pub use store::{Cursor, InventoryStore, ValidationHook};
pub use validation::{FieldIssue, Problem, ValidationMode, ValidationReport};
