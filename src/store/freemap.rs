use std::io::Cursor;

use tracing::{debug, trace};

use crate::{
	StoreError, StoreResult,
	ioext::*,
};

use super::{
	NUM_FMES, REGION_USABLE_SZ,
	extent::FreeExtent,
};

/// The free-space map of one region: the ordered array of [NUM_FMES]
/// extents stored in the region header.
///
/// Structural invariants, restored after every mutation:
///
/// 1) There are always [NUM_FMES] entries.
/// 2) Empty entries (length 0) all sit behind the live ones.
/// 3) Live entries are sorted by strictly increasing offset.
/// 4) No two live entries touch; adjacent extents are coalesced.
/// 5) No two live entries overlap.
/// 6) Every live entry ends at or before [REGION_USABLE_SZ].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FreeMap {
	entries: Vec<FreeExtent>,
}

impl FreeMap {
	/// The map of a freshly created region: one extent covering the
	/// whole usable area, every other slot empty.
	pub fn initial() -> Self {
		let mut entries = vec![FreeExtent::EMPTY; NUM_FMES];
		entries[0] = FreeExtent::new(0, REGION_USABLE_SZ as u16);
		Self { entries }
	}

	/// Reads the map from a region header slice.
	pub fn load(header: &[u8]) -> StoreResult<Self> {
		let mut cursor = Cursor::new(header);
		let mut entries = Vec::with_capacity(NUM_FMES);
		for _ in 0..NUM_FMES {
			entries.push(cursor.read_value()?);
		}
		let map = Self { entries };
		trace!("loaded free-map with {} live extents", map.live().count());
		Ok(map)
	}

	/// Writes the map back into a region header slice. In debug builds
	/// the header is re-read and every entry compared whole, offset and
	/// length both.
	pub fn store(&self, header: &mut [u8]) -> StoreResult<()> {
		let mut cursor = Cursor::new(&mut *header);
		for entry in &self.entries {
			cursor.write_value(entry)?;
		}
		if cfg!(debug_assertions) {
			let reread = FreeMap::load(header)?;
			debug_assert_eq!(self.entries, reread.entries);
		}
		Ok(())
	}

	pub fn entries(&self) -> &[FreeExtent] {
		&self.entries
	}

	/// The live (non-empty) extents, lowest offset first.
	pub fn live(&self) -> impl Iterator<Item = &FreeExtent> {
		self.entries.iter().take_while(|entry| entry.not_empty())
	}

	/// Sum of all free extent lengths.
	pub fn free_total(&self) -> usize {
		self.live().map(|entry| entry.length as usize).sum()
	}

	/// First-fit allocation of `space` bytes. Returns the offset of the
	/// allocated extent within the usable area.
	pub fn allocate(&mut self, space: usize) -> StoreResult<usize> {
		for i in 0..self.entries.len() {
			let entry = self.entries[i];
			if entry.is_empty() {
				break;
			}
			if (entry.length as usize) < space {
				continue;
			}
			let offset = entry.start();
			debug!("allocating {space} bytes at {offset}");
			if entry.length as usize == space {
				// Exact fit consumes the whole extent; keep the empty
				// slots compacted behind the live ones.
				self.entries.remove(i);
				self.entries.push(FreeExtent::EMPTY);
			} else {
				self.entries[i].offset += space as u16;
				self.entries[i].length -= space as u16;
			}
			return Ok(offset);
		}
		Err(StoreError::NoSpace)
	}

	/// Folds the freed extent `(offset, length)` back into the map,
	/// coalescing with any extent it touches.
	pub fn free(&mut self, offset: usize, length: usize) -> StoreResult<()> {
		debug!("freeing {length} bytes at {offset}");
		let new_lo = offset;
		let new_hi = offset + length;
		if new_hi > REGION_USABLE_SZ {
			return Err(StoreError::CorruptFreeMap(format!(
				"freed extent ({offset},{length}) ends beyond the usable area"
			)));
		}
		for i in 0..self.entries.len() {
			let entry = self.entries[i];
			if entry.is_empty() {
				// Past every live extent and adjacent to none of them;
				// the freed extent takes this slot.
				self.entries[i] = FreeExtent::new(offset as u16, length as u16);
				return Ok(());
			}
			let (lo, hi) = (entry.start(), entry.end());
			if hi < new_lo {
				continue;
			}
			if hi == new_lo {
				// Extend this extent upward, then fold in the following
				// extent if the two now touch.
				self.entries[i].length += length as u16;
				if i + 1 < self.entries.len() {
					let next = self.entries[i + 1];
					if next.not_empty() && next.start() == self.entries[i].end() {
						self.entries[i].length += next.length;
						self.entries.remove(i + 1);
						self.entries.push(FreeExtent::EMPTY);
					}
				}
				return Ok(());
			}
			if lo < new_hi {
				return Err(StoreError::CorruptFreeMap(format!(
					"freed extent ({offset},{length}) overlaps free extent {entry}"
				)));
			}
			if lo == new_hi {
				// Extend this extent downward. An extent ending at
				// `new_lo` would have been handled above, so nothing
				// below can touch the result.
				self.entries[i].offset -= length as u16;
				self.entries[i].length += length as u16;
				return Ok(());
			}
			// lo > new_hi: the freed extent is disjoint and belongs
			// in front of this entry.
			if self.entries[NUM_FMES - 1].not_empty() {
				return Err(StoreError::Fragmented);
			}
			self.entries.insert(i, FreeExtent::new(offset as u16, length as u16));
			self.entries.pop();
			return Ok(());
		}
		// Every slot is live and none touches the freed extent.
		Err(StoreError::Fragmented)
	}

	/// Checks the structural invariants, failing with the first
	/// violation found.
	pub fn verify(&self) -> StoreResult<()> {
		if self.entries.len() != NUM_FMES {
			return Err(StoreError::CorruptFreeMap(format!(
				"expected {NUM_FMES} entries, found {}", self.entries.len()
			)));
		}
		let live = self.live().count();
		for (i, entry) in self.entries.iter().enumerate().skip(live) {
			if entry.not_empty() {
				return Err(StoreError::CorruptFreeMap(format!(
					"live extent {entry} at slot {i} behind an empty slot"
				)));
			}
		}
		for window in self.entries[..live].windows(2) {
			let (prev, next) = (window[0], window[1]);
			if prev.end() >= next.start() {
				return Err(StoreError::CorruptFreeMap(format!(
					"extents {prev} and {next} out of order, touching or overlapping"
				)));
			}
		}
		for entry in self.live() {
			if entry.end() > REGION_USABLE_SZ {
				return Err(StoreError::CorruptFreeMap(format!(
					"extent {entry} ends beyond the usable area"
				)));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn assert_live(map: &FreeMap, expected: &[(u16, u16)]) {
		let live: Vec<(u16, u16)> = map.live().map(|&entry| entry.into()).collect();
		assert_eq!(live, expected);
		map.verify().unwrap();
	}

	#[test]
	fn initial_covers_usable_area() {
		let map = FreeMap::initial();
		assert_live(&map, &[(0, REGION_USABLE_SZ as u16)]);
		assert_eq!(map.free_total(), REGION_USABLE_SZ);
	}

	#[test]
	fn load_store_round_trip() {
		let mut header = vec![0u8; NUM_FMES * super::super::FME_SZ];
		let mut map = FreeMap::initial();
		map.allocate(100).unwrap();
		map.store(&mut header).unwrap();
		let reread = FreeMap::load(&header).unwrap();
		assert_eq!(reread, map);
	}

	#[test]
	fn allocate_shrinks_first_fit() {
		let mut map = FreeMap::initial();
		let offset = map.allocate(43).unwrap();
		assert_eq!(offset, 0);
		assert_live(&map, &[(43, (REGION_USABLE_SZ - 43) as u16)]);
	}

	#[test]
	fn allocate_exact_fit_removes_entry() {
		let mut map = FreeMap::initial();
		map.allocate(100).unwrap();
		map.free(20, 30).unwrap();
		// Map is now (20,30), (100, rest). Consume the hole exactly.
		let offset = map.allocate(30).unwrap();
		assert_eq!(offset, 20);
		assert_live(&map, &[(100, (REGION_USABLE_SZ - 100) as u16)]);
	}

	#[test]
	fn allocate_skips_small_extents() {
		let mut map = FreeMap::initial();
		map.allocate(100).unwrap();
		map.free(10, 8).unwrap();
		let offset = map.allocate(50).unwrap();
		assert_eq!(offset, 100);
		assert_live(&map, &[(10, 8), (150, (REGION_USABLE_SZ - 150) as u16)]);
	}

	#[test]
	fn allocate_without_space_fails() {
		let mut map = FreeMap::initial();
		assert!(matches!(
			map.allocate(REGION_USABLE_SZ + 1),
			Err(StoreError::NoSpace)
		));
	}

	#[test]
	fn free_extends_upward_and_merges() {
		let mut map = FreeMap::initial();
		// Carve out [0,100), leaving (100, rest). Free two chunks that
		// rejoin the map into a single extent.
		map.allocate(100).unwrap();
		map.free(0, 40).unwrap();
		assert_live(&map, &[(0, 40), (100, (REGION_USABLE_SZ - 100) as u16)]);
		map.free(40, 60).unwrap();
		assert_live(&map, &[(0, REGION_USABLE_SZ as u16)]);
	}

	#[test]
	fn free_extends_downward() {
		let mut map = FreeMap::initial();
		map.allocate(100).unwrap();
		map.free(60, 40).unwrap();
		assert_live(&map, &[(60, (REGION_USABLE_SZ - 60) as u16)]);
	}

	#[test]
	fn free_disjoint_inserts_sorted() {
		let mut map = FreeMap::initial();
		map.allocate(200).unwrap();
		map.free(10, 20).unwrap();
		map.free(50, 25).unwrap();
		assert_live(&map, &[(10, 20), (50, 25), (200, (REGION_USABLE_SZ - 200) as u16)]);
	}

	#[test]
	fn free_overlap_is_corrupt() {
		let mut map = FreeMap::initial();
		map.allocate(100).unwrap();
		map.free(50, 10).unwrap();
		assert!(matches!(
			map.free(55, 10),
			Err(StoreError::CorruptFreeMap(_))
		));
	}

	#[test]
	fn free_beyond_usable_is_corrupt() {
		let mut map = FreeMap::initial();
		assert!(matches!(
			map.free(REGION_USABLE_SZ - 4, 8),
			Err(StoreError::CorruptFreeMap(_))
		));
	}

	#[test]
	fn free_without_slots_is_fragmented() {
		// Fill every slot with a live one-byte extent at even offsets,
		// then try to free a disjoint extent below them all.
		let entries: Vec<FreeExtent> = (0..NUM_FMES)
			.map(|i| FreeExtent::new((i * 2 + 10) as u16, 1))
			.collect();
		let mut map = FreeMap { entries };
		map.verify().unwrap();
		assert!(matches!(map.free(2, 1), Err(StoreError::Fragmented)));
	}

	#[test]
	fn randomized_allocate_free_keeps_invariants() {
		use rand::{Rng, SeedableRng, rngs::StdRng};
		let mut rng = StdRng::seed_from_u64(0xDB48);
		let mut map = FreeMap::initial();
		let mut allocated: Vec<(usize, usize)> = Vec::new();
		for _ in 0..2000 {
			// Cap the live allocation count so the map can never run
			// out of slots, which would fail the frees below.
			if allocated.is_empty() || (allocated.len() < 400 && rng.gen_bool(0.6)) {
				let space = rng.gen_range(8..=512);
				match map.allocate(space) {
					Ok(offset) => allocated.push((offset, space)),
					Err(StoreError::NoSpace) => {}
					Err(other) => panic!("unexpected error: {other}"),
				}
			} else {
				let index = rng.gen_range(0..allocated.len());
				let (offset, space) = allocated.swap_remove(index);
				map.free(offset, space).unwrap();
			}
			map.verify().unwrap();
			let in_use: usize = allocated.iter().map(|&(_, space)| space).sum();
			assert_eq!(map.free_total() + in_use, REGION_USABLE_SZ);
		}
		for (offset, space) in allocated.drain(..) {
			map.free(offset, space).unwrap();
			map.verify().unwrap();
		}
		assert_live(&map, &[(0, REGION_USABLE_SZ as u16)]);
	}
}
