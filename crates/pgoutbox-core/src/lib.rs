pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{NewUser, OutboxRecord, RowMap, Value, USER_CREATED, USER_OBJECT};
