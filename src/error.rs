

use thiserror::Error;

/// The master error type.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("IO Error: {0}")]
	IoError(#[from] std::io::Error),
	#[error("No region has enough free space.")]
	NoSpace,
	#[error("Free space exists but every free-map slot is in use.")]
	Fragmented,
	#[error("Record has been deleted.")]
	RecordDeleted,
	#[error("Not a valid table file.")]
	CorruptTable,
	#[error("Corrupt record: {0}")]
	CorruptRecord(String),
	#[error("Corrupt field: {0}")]
	CorruptField(String),
	#[error("Corrupt free-map: {0}")]
	CorruptFreeMap(String),
	#[error("Field-list must contain at least one field.")]
	EmptyFieldList,
	#[error("Value of {0} bytes does not fit in a 16-bit length.")]
	ValueTooLarge(usize),
	#[error("Record address {0} is out of range.")]
	AddressOutOfRange(u64),
	#[error("Failed to convert to UTF-8 string.")]
	FromUtf8Error(#[from] std::string::FromUtf8Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
