use std::io::{
	Write, Read,
};

/// For types that can be written to a writer.
pub trait Writable {
	fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize, crate::StoreError>;
}

/// For types that can be read from a reader.
pub trait Readable: Sized {
	fn read_from<R: Read>(reader: &mut R) -> Result<Self, crate::StoreError>;
}

pub trait WriteExt: Write + Sized {
	fn write_value<T: Writable>(&mut self, value: &T) -> Result<usize, crate::StoreError>;
}

pub trait ReadExt: Read + Sized {
	fn read_value<T: Readable>(&mut self) -> Result<T, crate::StoreError>;
}

impl<W: Write + Sized> WriteExt for W {
	fn write_value<T: Writable>(&mut self, value: &T) -> Result<usize, crate::StoreError> {
		value.write_to(self)
	}
}

impl<R: Read + Sized> ReadExt for R {
	fn read_value<T: Readable>(&mut self) -> Result<T, crate::StoreError> {
		T::read_from(self)
	}
}
