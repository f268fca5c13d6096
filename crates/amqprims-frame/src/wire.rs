//! AMQP primitive types: octets, shorts, longs, short/long strings and bits.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Cursor over a received payload. Every read is bounds checked.
pub(crate) struct WireReader {
    buf: Bytes,
    what: &'static str,
}

impl WireReader {
    pub(crate) fn new(buf: Bytes, what: &'static str) -> Self {
        Self { buf, what }
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(FrameError::Malformed(format!(
                "{}: needed {} more bytes, {} left",
                self.what,
                len,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn octet(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn short(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn long(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn longlong(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<Bytes> {
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    pub(crate) fn short_str(&mut self) -> Result<String> {
        let len = self.octet()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| FrameError::Malformed(format!("{}: short string is not UTF-8", self.what)))
    }

    pub(crate) fn long_str(&mut self) -> Result<Bytes> {
        let len = self.long()? as usize;
        self.bytes(len)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn what(&self) -> &'static str {
        self.what
    }
}

pub(crate) fn put_short_str(dst: &mut BytesMut, value: &str) -> Result<()> {
    if value.len() > u8::MAX as usize {
        return Err(FrameError::ShortStringTooLong(value.len()));
    }
    dst.put_u8(value.len() as u8);
    dst.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn put_long_str(dst: &mut BytesMut, value: &[u8]) -> Result<()> {
    if value.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: value.len(),
            max: u32::MAX as usize,
        });
    }
    dst.put_u32(value.len() as u32);
    dst.put_slice(value);
    Ok(())
}

/// Packs consecutive bit fields into one octet, first field in the lowest bit.
pub(crate) fn pack_bits(bits: &[bool]) -> u8 {
    debug_assert!(bits.len() <= 8);
    bits.iter()
        .enumerate()
        .fold(0u8, |acc, (i, bit)| if *bit { acc | (1 << i) } else { acc })
}

pub(crate) fn bit(flags: u8, index: u8) -> bool {
    flags & (1 << index) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_pack_lowest_first() {
        assert_eq!(pack_bits(&[true, false, true]), 0b101);
        assert_eq!(pack_bits(&[false; 5]), 0);
        assert!(bit(0b100, 2));
        assert!(!bit(0b100, 1));
    }

    #[test]
    fn short_str_rejects_oversized_value() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(256);
        assert!(matches!(
            put_short_str(&mut buf, &long),
            Err(FrameError::ShortStringTooLong(256))
        ));
    }

    #[test]
    fn truncated_reads_are_malformed() {
        let mut reader = WireReader::new(Bytes::from_static(&[0x00]), "test");
        assert!(matches!(reader.short(), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn short_str_reads_back() {
        let mut buf = BytesMut::new();
        put_short_str(&mut buf, "amq.direct").unwrap();
        let mut reader = WireReader::new(buf.freeze(), "test");
        assert_eq!(reader.short_str().unwrap(), "amq.direct");
        assert_eq!(reader.remaining(), 0);
    }
}
