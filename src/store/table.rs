use std::{
	fs::OpenOptions,
	io::Cursor,
	path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memmap2::MmapMut;
use tracing::debug;

use crate::{
	StoreError, StoreResult,
};

use super::{
	NUM_REGIONS, REGION_SZ, REGION_HEADER_SZ, REGION_USABLE_SZ,
	TABLE_SZ, TABLE_MAGIC, SUMMARY_OFF,
	region_offset,
	addr::RecordAddr,
	fieldlist::FieldList,
	freemap::FreeMap,
	region::Region,
};

/// The whole file-backed store: a memory-mapped image of fixed size
/// holding a 4 KiB header, the region-summary array and [NUM_REGIONS]
/// regions. The table exclusively owns the mapping between
/// [create]/[open] and [close]; dropping the table unmaps it.
///
/// All operations are sequential; sharing one file between two open
/// tables is not supported.
///
/// [create]: Table::create
/// [open]: Table::open
/// [close]: Table::close
pub struct Table {
	mmap: MmapMut,
	path: PathBuf,
}

impl Table {
	/// Creates a table file at `path`, sized and zero-filled up front,
	/// and initializes the header and every region's free-space map.
	/// An existing file at `path` is truncated.
	pub fn create<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
		let path = path.as_ref();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		file.set_len(TABLE_SZ as u64)?;
		// Safety: the file was just created and this handle owns it
		// exclusively until the mapping is dropped.
		let mmap = unsafe { MmapMut::map_mut(&file)? };
		let mut table = Self {
			mmap,
			path: path.to_path_buf(),
		};
		{
			let mut cursor = Cursor::new(&mut table.mmap[..8]);
			cursor.write_u32::<BigEndian>(TABLE_MAGIC)?;
			// Reserved checksum, always zero.
			cursor.write_u32::<BigEndian>(0)?;
		}
		// The summary array starts zeroed: every region reads as empty.
		for index in 0..NUM_REGIONS {
			table.region_mut(index).create()?;
		}
		table.mmap.flush()?;
		debug!("created table at {}", table.path.display());
		Ok(table)
	}

	/// Maps an existing table file, validating its size and magic.
	pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
		let path = path.as_ref();
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		if file.metadata()?.len() != TABLE_SZ as u64 {
			return Err(StoreError::CorruptTable);
		}
		// Safety: see [Table::create]; the caller promises exclusive use.
		let mmap = unsafe { MmapMut::map_mut(&file)? };
		if BigEndian::read_u32(&mmap[..4]) != TABLE_MAGIC {
			return Err(StoreError::CorruptTable);
		}
		Ok(Self {
			mmap,
			path: path.to_path_buf(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Inserts a new record, choosing a region from the summary array,
	/// and returns its address.
	pub fn insert(&mut self, fls: &FieldList) -> StoreResult<RecordAddr> {
		let space = fls.encoded_len();
		for index in 0..NUM_REGIONS {
			let percent = (self.mmap[SUMMARY_OFF + index] as usize).min(100);
			let free_estimate = REGION_USABLE_SZ * (100 - percent) / 100;
			if percent > 95 || free_estimate < space {
				continue;
			}
			let attempt = self.region_mut(index).insert(fls, space);
			match attempt {
				Ok(addr) => {
					self.update_summary(index)?;
					return Ok(addr);
				}
				// The summary is only a hint; fall through to the next
				// region when this one's free-map rejects the request.
				Err(StoreError::NoSpace) | Err(StoreError::Fragmented) => continue,
				Err(other) => return Err(other),
			}
		}
		Err(StoreError::NoSpace)
	}

	/// Reads the record at `addr`.
	pub fn lookup<A: Into<RecordAddr>>(&self, addr: A) -> StoreResult<FieldList> {
		let addr = addr.into();
		let index = self.region_index(addr)?;
		FieldList::load(self.usable(index), addr.offset())
	}

	/// Merges `fls` into the record at `addr`. The record is rewritten
	/// in place when the merged encoding still fits its extent,
	/// otherwise it is deleted and reinserted, possibly in a different
	/// region. Returns the record's address after the update.
	pub fn update<A: Into<RecordAddr>>(&mut self, addr: A, fls: FieldList) -> StoreResult<RecordAddr> {
		let addr = addr.into();
		let index = self.region_index(addr)?;
		let mut merged = self.lookup(addr)?;
		let old_len = merged.encoded_len();
		merged.merge(fls);
		let new_len = merged.encoded_len();
		if new_len > old_len {
			debug!("record at {addr} grew from {old_len} to {new_len} bytes, relocating");
			self.delete(addr)?;
			self.insert(&merged)
		} else {
			self.region_mut(index).rewrite(addr, &merged)?;
			Ok(addr)
		}
	}

	/// Tombstones the record at `addr` and releases its extent.
	pub fn delete<A: Into<RecordAddr>>(&mut self, addr: A) -> StoreResult<()> {
		let addr = addr.into();
		let index = self.region_index(addr)?;
		self.region_mut(index).delete(addr)?;
		self.update_summary(index)
	}

	/// Flushes outstanding changes to the backing file.
	pub fn flush(&self) -> StoreResult<()> {
		Ok(self.mmap.flush()?)
	}

	/// Flushes and unmaps the table.
	pub fn close(self) -> StoreResult<()> {
		self.mmap.flush()?;
		Ok(())
	}

	/// The free-space map of region `index`, loaded from the image.
	pub fn free_map(&self, index: usize) -> StoreResult<FreeMap> {
		FreeMap::load(&self.mmap[region_offset(index)..region_offset(index) + REGION_HEADER_SZ])
	}

	/// The summary byte of region `index`: its advisory percent-full.
	pub fn region_summary(&self, index: usize) -> u8 {
		self.mmap[SUMMARY_OFF + index]
	}

	fn usable(&self, index: usize) -> &[u8] {
		let start = region_offset(index) + REGION_HEADER_SZ;
		&self.mmap[start..start + REGION_USABLE_SZ]
	}

	fn region_mut(&mut self, index: usize) -> Region<'_> {
		let start = region_offset(index);
		Region::new(&mut self.mmap[start..start + REGION_SZ], index)
	}

	fn region_index(&self, addr: RecordAddr) -> StoreResult<usize> {
		let index = addr.region_index();
		if index >= NUM_REGIONS {
			return Err(StoreError::AddressOutOfRange(addr.into()));
		}
		Ok(index)
	}

	/// Recomputes a region's summary byte from its free-space map.
	fn update_summary(&mut self, index: usize) -> StoreResult<()> {
		let free = self.free_map(index)?.free_total();
		let used = REGION_USABLE_SZ - free;
		let percent = (used * 100 + REGION_USABLE_SZ / 2) / REGION_USABLE_SZ;
		self.mmap[SUMMARY_OFF + index] = percent.min(100) as u8;
		Ok(())
	}
}
