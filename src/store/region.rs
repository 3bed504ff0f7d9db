use tracing::debug;

use crate::StoreResult;

use super::{
	REGION_SZ, REGION_HEADER_SZ,
	addr::RecordAddr,
	fieldlist::FieldList,
	freemap::FreeMap,
};

/// A lightweight mutable view over one region of the mapped table
/// image: the free-space map in the region header plus the usable area
/// behind it. Regions are constructed on demand by the table and never
/// outlive the operation they serve.
pub struct Region<'a> {
	data: &'a mut [u8],
	index: usize,
}

impl<'a> Region<'a> {
	pub fn new(data: &'a mut [u8], index: usize) -> Self {
		debug_assert_eq!(data.len(), REGION_SZ);
		Self { data, index }
	}

	fn header(&self) -> &[u8] {
		&self.data[..REGION_HEADER_SZ]
	}

	fn header_mut(&mut self) -> &mut [u8] {
		&mut self.data[..REGION_HEADER_SZ]
	}

	fn usable_mut(&mut self) -> &mut [u8] {
		&mut self.data[REGION_HEADER_SZ..]
	}

	/// Writes the initial free-space map: a single extent spanning the
	/// whole usable area, every other slot empty.
	pub fn create(&mut self) -> StoreResult<()> {
		FreeMap::initial().store(self.header_mut())
	}

	/// Allocates `space` bytes and writes the record into them.
	/// `space` must be `fls.encoded_len()`.
	pub fn insert(&mut self, fls: &FieldList, space: usize) -> StoreResult<RecordAddr> {
		let mut map = FreeMap::load(self.header())?;
		let offset = map.allocate(space)?;
		map.store(self.header_mut())?;
		debug!("inserting {space} bytes at {offset} in region {}", self.index);
		fls.store(self.usable_mut(), offset)?;
		Ok(RecordAddr::new(self.index, offset))
	}

	/// Rewrites a record in place. The caller guarantees the new
	/// encoding is no longer than the record already on disk; the
	/// free-space map is not touched.
	pub fn rewrite(&mut self, addr: RecordAddr, fls: &FieldList) -> StoreResult<()> {
		debug!("rewriting record at {} in region {}", addr.offset(), self.index);
		fls.store(self.usable_mut(), addr.offset())
	}

	/// Tombstones the record at `addr` and releases its extent back to
	/// the free-space map.
	pub fn delete(&mut self, addr: RecordAddr) -> StoreResult<()> {
		let offset = addr.offset();
		let old_len = FieldList::tombstone(self.usable_mut(), offset)?;
		debug!("deleting {old_len} bytes at {offset} in region {}", self.index);
		let mut map = FreeMap::load(self.header())?;
		map.free(offset, old_len)?;
		map.store(self.header_mut())
	}
}
