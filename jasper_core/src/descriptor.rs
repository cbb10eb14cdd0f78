//! Method descriptor parsing.
//!
//! Descriptors are the `(...)R` signature strings from the class file.
//! The cursor walks parameter types left to right without allocating;
//! footprint and count helpers are used when laying out call frames and
//! marshalling native arguments.

use crate::error::DescriptorError;
use crate::types::TypeCode;

/// Cursor over the parameter types of a method descriptor.
pub struct DescriptorCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorCursor<'a> {
    /// Position the cursor on the first parameter. Fails if the
    /// descriptor does not open with `(`.
    pub fn new(spec: &'a str) -> Result<Self, DescriptorError> {
        let bytes = spec.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(DescriptorError::MissingOpenParen);
        }
        Ok(DescriptorCursor { bytes, pos: 1 })
    }

    /// True while parameters remain.
    pub fn has_next(&self) -> bool {
        !matches!(self.bytes.get(self.pos), None | Some(b')'))
    }

    /// Consume and return the next parameter's type code.
    pub fn next(&mut self) -> Result<TypeCode, DescriptorError> {
        let start = self.pos;
        match self.bytes.get(self.pos) {
            Some(b'L') => {
                while !matches!(self.bytes.get(self.pos), None | Some(b';')) {
                    self.pos += 1;
                }
                self.pos += 1;
            }
            Some(b'[') => {
                while self.bytes.get(self.pos) == Some(&b'[') {
                    self.pos += 1;
                }
                if self.bytes.get(self.pos) == Some(&b'L') {
                    while !matches!(self.bytes.get(self.pos), None | Some(b';')) {
                        self.pos += 1;
                    }
                }
                self.pos += 1;
            }
            Some(_) => self.pos += 1,
            None => return Err(DescriptorError::Truncated),
        }
        let first = self.bytes[start];
        TypeCode::from_descriptor(first).ok_or(DescriptorError::BadTypeLetter(first as char))
    }

    /// Type code after the closing `)`. Consumes the rest of the cursor.
    pub fn return_code(mut self) -> Result<TypeCode, DescriptorError> {
        while self.has_next() {
            self.next()?;
        }
        match self.bytes.get(self.pos) {
            Some(b')') => {}
            _ => return Err(DescriptorError::Truncated),
        }
        let letter = *self
            .bytes
            .get(self.pos + 1)
            .ok_or(DescriptorError::Truncated)?;
        TypeCode::from_descriptor(letter).ok_or(DescriptorError::BadTypeLetter(letter as char))
    }
}

/// Stack slots consumed by the receiver (if any) plus declared
/// parameters, counting long/double as two.
pub fn parameter_footprint(spec: &str, has_receiver: bool) -> Result<usize, DescriptorError> {
    let mut cursor = DescriptorCursor::new(spec)?;
    let mut footprint = usize::from(has_receiver);
    while cursor.has_next() {
        footprint += cursor.next()?.footprint();
    }
    Ok(footprint)
}

/// Number of declared parameters, ignoring widths.
pub fn parameter_count(spec: &str) -> Result<usize, DescriptorError> {
    let mut cursor = DescriptorCursor::new(spec)?;
    let mut count = 0;
    while cursor.has_next() {
        cursor.next()?;
        count += 1;
    }
    Ok(count)
}

/// The descriptor's trailing return type code.
pub fn return_code(spec: &str) -> Result<TypeCode, DescriptorError> {
    DescriptorCursor::new(spec)?.return_code()
}
