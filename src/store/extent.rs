use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
	StoreResult,
	ioext::*,
};

/// One free extent within a region's usable area.
/// An extent whose length is zero is an empty slot in the free-map.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct FreeExtent {
	pub offset: u16,
	pub length: u16,
}

impl PartialOrd for FreeExtent {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for FreeExtent {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		match self.offset.cmp(&other.offset) {
			core::cmp::Ordering::Equal => self.length.cmp(&other.length),
			ord => ord,
		}
	}
}

impl std::fmt::Display for FreeExtent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({},{})", self.offset, self.length)
	}
}

impl From<(u16, u16)> for FreeExtent {
	fn from(value: (u16, u16)) -> Self {
		FreeExtent::new(value.0, value.1)
	}
}

impl From<FreeExtent> for (u16, u16) {
	fn from(value: FreeExtent) -> Self {
		(value.offset, value.length)
	}
}

impl FreeExtent {
	pub const EMPTY: Self = Self::new(0, 0);

	pub const fn new(offset: u16, length: u16) -> Self {
		Self { offset, length }
	}

	/// First byte of the extent, relative to the usable area.
	pub const fn start(&self) -> usize {
		self.offset as usize
	}

	/// One past the last byte of the extent.
	pub const fn end(&self) -> usize {
		self.offset as usize + self.length as usize
	}

	pub const fn is_empty(&self) -> bool {
		self.length == 0
	}

	pub const fn not_empty(&self) -> bool {
		self.length != 0
	}
}

impl Readable for FreeExtent {
	fn read_from<R: Read>(reader: &mut R) -> StoreResult<Self> {
		let offset = reader.read_u16::<BigEndian>()?;
		let length = reader.read_u16::<BigEndian>()?;
		Ok(Self { offset, length })
	}
}

impl Writable for FreeExtent {
	fn write_to<W: Write>(&self, writer: &mut W) -> StoreResult<usize> {
		writer.write_u16::<BigEndian>(self.offset)?;
		writer.write_u16::<BigEndian>(self.length)?;
		Ok(4)
	}
}
