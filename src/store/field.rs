use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
	StoreError, StoreResult,
	ioext::*,
};

use super::{
	FIELD_MAGIC, FIELD_HEADER_SZ,
	timestamp::Timestamp,
};

/// Wire tag for [FieldValue::Int].
pub const TYPE_INT: u8 = 1;
/// Wire tag for [FieldValue::Bytes].
pub const TYPE_BYTES: u8 = 2;
/// Wire tag for [FieldValue::Str].
pub const TYPE_STR: u8 = 3;

/// The typed value carried by a [Field].
/// `Str` shares the wire layout of `Bytes` (u16 length then payload);
/// only the type tag differs, and the payload must be valid UTF-8.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum FieldValue {
	Int(u32),
	Bytes(Vec<u8>),
	Str(String),
}

impl FieldValue {
	pub const fn type_tag(&self) -> u8 {
		match self {
			FieldValue::Int(_) => TYPE_INT,
			FieldValue::Bytes(_) => TYPE_BYTES,
			FieldValue::Str(_) => TYPE_STR,
		}
	}

	fn payload_len(&self) -> usize {
		match self {
			FieldValue::Int(_) => 4,
			FieldValue::Bytes(bytes) => 2 + bytes.len(),
			FieldValue::Str(text) => 2 + text.len(),
		}
	}
}

impl From<u32> for FieldValue {
	fn from(value: u32) -> Self {
		FieldValue::Int(value)
	}
}

impl From<Vec<u8>> for FieldValue {
	fn from(value: Vec<u8>) -> Self {
		FieldValue::Bytes(value)
	}
}

impl From<&[u8]> for FieldValue {
	fn from(value: &[u8]) -> Self {
		FieldValue::Bytes(value.to_vec())
	}
}

impl From<String> for FieldValue {
	fn from(value: String) -> Self {
		FieldValue::Str(value)
	}
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Str(value.to_owned())
	}
}

/// A typed `(key, value, timestamp)` triple, the unit of data inside a
/// field-list record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Field {
	key: u16,
	ts: Timestamp,
	value: FieldValue,
}

impl Field {
	/// Creates a field with an unset timestamp. [FieldList::make] and
	/// [FieldList::merge] stamp the timestamp when the record is built.
	///
	/// [FieldList::make]: super::fieldlist::FieldList::make
	/// [FieldList::merge]: super::fieldlist::FieldList::merge
	pub fn new<V: Into<FieldValue>>(key: u16, value: V) -> Self {
		Self {
			key,
			ts: Timestamp::default(),
			value: value.into(),
		}
	}

	pub const fn key(&self) -> u16 {
		self.key
	}

	pub const fn ts(&self) -> Timestamp {
		self.ts
	}

	pub const fn value(&self) -> &FieldValue {
		&self.value
	}

	pub(crate) fn set_ts(&mut self, ts: Timestamp) {
		self.ts = ts;
	}

	/// The number of bytes [write_to] produces for this field.
	///
	/// [write_to]: Writable::write_to
	pub fn encoded_len(&self) -> usize {
		FIELD_HEADER_SZ + self.value.payload_len()
	}
}

impl Writable for Field {
	fn write_to<W: Write>(&self, writer: &mut W) -> StoreResult<usize> {
		writer.write_u8(FIELD_MAGIC)?;
		writer.write_u8(self.value.type_tag())?;
		writer.write_u16::<BigEndian>(self.key)?;
		writer.write_u32::<BigEndian>(self.ts.millis())?;
		match &self.value {
			FieldValue::Int(value) => {
				writer.write_u32::<BigEndian>(*value)?;
			}
			FieldValue::Bytes(bytes) => {
				let len = u16::try_from(bytes.len())
					.map_err(|_| StoreError::ValueTooLarge(bytes.len()))?;
				writer.write_u16::<BigEndian>(len)?;
				writer.write_all(bytes)?;
			}
			FieldValue::Str(text) => {
				let len = u16::try_from(text.len())
					.map_err(|_| StoreError::ValueTooLarge(text.len()))?;
				writer.write_u16::<BigEndian>(len)?;
				writer.write_all(text.as_bytes())?;
			}
		}
		Ok(self.encoded_len())
	}
}

impl Readable for Field {
	fn read_from<R: Read>(reader: &mut R) -> StoreResult<Self> {
		let magic = reader.read_u8()?;
		if magic != FIELD_MAGIC {
			return Err(StoreError::CorruptField(format!("bad field magic {magic:#04x}")));
		}
		let tag = reader.read_u8()?;
		let key = reader.read_u16::<BigEndian>()?;
		let ts = Timestamp::from(reader.read_u32::<BigEndian>()?);
		let value = match tag {
			TYPE_INT => FieldValue::Int(reader.read_u32::<BigEndian>()?),
			TYPE_BYTES => {
				let len = reader.read_u16::<BigEndian>()? as usize;
				let mut bytes = vec![0u8; len];
				reader.read_exact(&mut bytes)?;
				FieldValue::Bytes(bytes)
			}
			TYPE_STR => {
				let len = reader.read_u16::<BigEndian>()? as usize;
				let mut bytes = vec![0u8; len];
				reader.read_exact(&mut bytes)?;
				FieldValue::Str(String::from_utf8(bytes)?)
			}
			other => {
				return Err(StoreError::CorruptField(format!("unknown field type {other}")));
			}
		};
		Ok(Self { key, ts, value })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn round_trip(field: &Field) -> Field {
		let mut buf = Vec::new();
		let written = field.write_to(&mut buf).unwrap();
		assert_eq!(written, field.encoded_len());
		assert_eq!(written, buf.len());
		let mut cursor = Cursor::new(buf);
		cursor.read_value().unwrap()
	}

	#[test]
	fn int_round_trip() {
		let mut field = Field::new(7, 0xDEADBEEFu32);
		field.set_ts(Timestamp::from(12345));
		assert_eq!(field.encoded_len(), 12);
		assert_eq!(round_trip(&field), field);
	}

	#[test]
	fn bytes_round_trip() {
		let mut field = Field::new(1, &b"Hello, World!"[..]);
		field.set_ts(Timestamp::from(99));
		assert_eq!(field.encoded_len(), 10 + 13);
		assert_eq!(round_trip(&field), field);
	}

	#[test]
	fn str_round_trip() {
		let field = Field::new(2, "caf\u{e9}");
		assert_eq!(field.encoded_len(), 10 + "caf\u{e9}".len());
		assert_eq!(round_trip(&field), field);
	}

	#[test]
	fn oversized_bytes_rejected() {
		let field = Field::new(0, vec![0u8; 65536]);
		let mut buf = Vec::new();
		assert!(matches!(
			field.write_to(&mut buf),
			Err(StoreError::ValueTooLarge(65536))
		));
	}

	#[test]
	fn bad_magic_rejected() {
		let mut buf = Vec::new();
		Field::new(0, 1u32).write_to(&mut buf).unwrap();
		buf[0] = 0x49;
		let mut cursor = Cursor::new(buf);
		assert!(matches!(
			Field::read_from(&mut cursor),
			Err(StoreError::CorruptField(_))
		));
	}

	#[test]
	fn unknown_type_rejected() {
		let mut buf = Vec::new();
		Field::new(0, 1u32).write_to(&mut buf).unwrap();
		buf[1] = 9;
		let mut cursor = Cursor::new(buf);
		assert!(matches!(
			Field::read_from(&mut cursor),
			Err(StoreError::CorruptField(_))
		));
	}
}
