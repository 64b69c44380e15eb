//! Little-endian byte reader for chain account and event payloads

use crate::error::{CoreError, Result};
use crate::types::{Address, Hash32};

/// Cursor over a binary payload. All multi-byte integers are little-endian.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self { data, pos: 0, context }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::TruncatedPayload(format!(
                "{}: need {} bytes at offset {}, have {}",
                self.context,
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("slice length checked")))
    }

    pub fn u128(&mut self) -> Result<u128> {
        let b = self.take(16)?;
        Ok(u128::from_le_bytes(b.try_into().expect("slice length checked")))
    }

    pub fn address(&mut self) -> Result<Address> {
        let b = self.take(32)?;
        Ok(Address(b.try_into().expect("slice length checked")))
    }

    pub fn hash(&mut self) -> Result<Hash32> {
        let b = self.take(32)?;
        Ok(Hash32(b.try_into().expect("slice length checked")))
    }

    /// Length-prefixed UTF-8 string (u32 length, borsh convention).
    pub fn string(&mut self) -> Result<String> {
        let len = {
            let b = self.take(4)?;
            u32::from_le_bytes(b.try_into().expect("slice length checked")) as usize
        };
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CoreError::InvalidPayload(format!("{}: {e}", self.context)))
    }

    /// Length-prefixed byte vector (u32 length).
    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = {
            let b = self.take(4)?;
            u32::from_le_bytes(b.try_into().expect("slice length checked")) as usize
        };
        Ok(self.take(len)?.to_vec())
    }

    /// Option tag followed by the payload when the tag is 1.
    pub fn option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_scalars_in_order() {
        let mut data = vec![7u8];
        data.extend_from_slice(&42u64.to_le_bytes());
        let mut r = ByteReader::new(&data, "test");
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u64().unwrap(), 42);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncation_is_an_error() {
        let data = [1u8, 2, 3];
        let mut r = ByteReader::new(&data, "test");
        assert!(r.u64().is_err());
    }

    #[test]
    fn test_string_roundtrip() {
        let mut data = (5u32).to_le_bytes().to_vec();
        data.extend_from_slice(b"hello");
        let mut r = ByteReader::new(&data, "test");
        assert_eq!(r.string().unwrap(), "hello");
    }

    #[test]
    fn test_option_tag() {
        let mut data = vec![1u8];
        data.extend_from_slice(&9u64.to_le_bytes());
        data.push(0);
        let mut r = ByteReader::new(&data, "test");
        assert_eq!(r.option(|r| r.u64()).unwrap(), Some(9));
        assert_eq!(r.option(|r| r.u64()).unwrap(), None);
    }
}
