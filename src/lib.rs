pub mod store;
pub mod ioext;
pub mod error;

pub use error::StoreError;
pub use error::StoreResult;

pub use store::addr::RecordAddr;
pub use store::field::{Field, FieldValue};
pub use store::fieldlist::FieldList;
pub use store::table::Table;
