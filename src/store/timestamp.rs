
use std::io::{Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::Utc;
use crate::{
	StoreResult,
	ioext::*,
};
use super::EPOCH_SECS;

/// A 32-bit millisecond counter relative to the store epoch.
/// Wraps around roughly every 49 days' worth of milliseconds; callers
/// only ever compare timestamps written close together, so wrapping is
/// tolerated.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Timestamp(u32);

impl Timestamp {
	/// Get a [Timestamp] for the current time.
	pub fn now() -> Timestamp {
		let millis = Utc::now().timestamp_millis() - EPOCH_SECS * 1000;
		Timestamp(millis as u32)
	}

	pub const fn millis(&self) -> u32 {
		self.0
	}
}

impl From<u32> for Timestamp {
	fn from(value: u32) -> Self {
		Self(value)
	}
}

impl From<Timestamp> for u32 {
	fn from(value: Timestamp) -> Self {
		value.0
	}
}

impl Readable for Timestamp {
	fn read_from<R: Read>(reader: &mut R) -> StoreResult<Self> {
		Ok(Self(reader.read_u32::<BigEndian>()?))
	}
}

impl Writable for Timestamp {
	fn write_to<W: Write>(&self, writer: &mut W) -> StoreResult<usize> {
		writer.write_u32::<BigEndian>(self.0)?;
		Ok(4)
	}
}
