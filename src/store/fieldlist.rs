use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
	StoreError, StoreResult,
	ioext::*,
};

use super::{
	RECORD_MAGIC, RECORD_HEADER_SZ,
	field::Field,
	timestamp::Timestamp,
};

/// A length-prefixed, magic-tagged record holding fields in ascending
/// key order. The unit of insert/lookup/update/delete.
///
/// On disk a field-list is an 8-byte header (u32 magic, u16 total
/// length including the header, u16 reserved) followed by the encoded
/// fields back to back. A header whose length is zero is a tombstone:
/// the record was deleted and its bytes reclaimed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FieldList {
	fields: Vec<Field>,
}

impl FieldList {
	/// Builds a field-list from `fields`, sorting by key and stamping
	/// every field with the same fresh timestamp.
	pub fn make(mut fields: Vec<Field>) -> StoreResult<Self> {
		if fields.is_empty() {
			return Err(StoreError::EmptyFieldList);
		}
		fields.sort_by_key(Field::key);
		let ts = Timestamp::now();
		for field in fields.iter_mut() {
			field.set_ts(ts);
		}
		Ok(Self { fields })
	}

	pub fn fields(&self) -> &[Field] {
		&self.fields
	}

	/// Total encoded size, header included. This is exactly the number
	/// of bytes [store] writes.
	///
	/// [store]: FieldList::store
	pub fn encoded_len(&self) -> usize {
		RECORD_HEADER_SZ + self.fields.iter().map(Field::encoded_len).sum::<usize>()
	}

	/// Writes the record at `offset` in `image`.
	pub fn store(&self, image: &mut [u8], offset: usize) -> StoreResult<()> {
		let len = self.encoded_len();
		let mut cursor = Cursor::new(&mut image[offset..offset + len]);
		cursor.write_u32::<BigEndian>(RECORD_MAGIC)?;
		cursor.write_u16::<BigEndian>(len as u16)?;
		cursor.write_u16::<BigEndian>(0)?;
		for field in &self.fields {
			cursor.write_value(field)?;
		}
		Ok(())
	}

	/// Reads the record at `offset` in `image`. Fields come back in
	/// wire order.
	pub fn load(image: &[u8], offset: usize) -> StoreResult<Self> {
		let mut cursor = Cursor::new(&image[offset..]);
		let magic = cursor.read_u32::<BigEndian>()?;
		if magic != RECORD_MAGIC {
			return Err(StoreError::CorruptRecord(format!("bad record magic {magic:#010x}")));
		}
		let total = cursor.read_u16::<BigEndian>()? as usize;
		let _reserved = cursor.read_u16::<BigEndian>()?;
		if total == 0 {
			return Err(StoreError::RecordDeleted);
		}
		if total < RECORD_HEADER_SZ {
			return Err(StoreError::CorruptRecord(format!("record length {total} shorter than its header")));
		}
		let mut remaining = total - RECORD_HEADER_SZ;
		let mut fields = Vec::new();
		while remaining > 0 {
			let field: Field = cursor.read_value()?;
			let consumed = field.encoded_len();
			if consumed > remaining {
				return Err(StoreError::CorruptRecord(format!(
					"field of {consumed} bytes overruns the {remaining} bytes left in the record"
				)));
			}
			remaining -= consumed;
			fields.push(field);
		}
		Ok(Self { fields })
	}

	/// Stamps the record header at `offset` as deleted and returns the
	/// prior on-disk length so the caller can release the extent.
	/// Payload bytes are left untouched.
	pub fn tombstone(image: &mut [u8], offset: usize) -> StoreResult<usize> {
		let mut cursor = Cursor::new(&image[offset..]);
		let magic = cursor.read_u32::<BigEndian>()?;
		if magic != RECORD_MAGIC {
			return Err(StoreError::CorruptRecord(format!("bad record magic {magic:#010x}")));
		}
		let old_len = cursor.read_u16::<BigEndian>()? as usize;
		if old_len == 0 {
			return Err(StoreError::RecordDeleted);
		}
		let mut cursor = Cursor::new(&mut image[offset..offset + RECORD_HEADER_SZ]);
		cursor.write_u32::<BigEndian>(RECORD_MAGIC)?;
		cursor.write_u16::<BigEndian>(0)?;
		cursor.write_u16::<BigEndian>(0)?;
		Ok(old_len)
	}

	/// Right-biased merge of `other`'s fields into this field-list.
	/// A field whose key already exists replaces the existing value,
	/// type and timestamp in place; new keys are inserted at their
	/// sorted position. All incoming fields share one fresh timestamp.
	pub fn merge(&mut self, other: FieldList) {
		let ts = Timestamp::now();
		for mut incoming in other.fields {
			incoming.set_ts(ts);
			match self.fields.binary_search_by_key(&incoming.key(), Field::key) {
				Ok(index) => self.fields[index] = incoming,
				Err(index) => self.fields.insert(index, incoming),
			}
		}
	}
}
