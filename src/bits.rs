//! Bit-granular cursors. Both cursors order bits least-significant first within each byte,
//! which is the packing used by Vorbis packets.

use crate::read::ReadError;

/// Reads individual bits from a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'data> {
    data: &'data [u8],
    position: usize,
}

impl<'data> BitReader<'data> {
    /// Creates a reader positioned at the first bit of `data`.
    #[must_use]
    pub fn new(data: &'data [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Reads `bits` bits (at most 32) and returns them as the low bits of a `u32`.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `bits` bits remain. The cursor does not move on failure.
    pub fn read(&mut self, bits: u8) -> Result<u32, ReadError> {
        debug_assert!(bits <= 32);

        let bits = usize::from(bits);
        if bits > self.remaining_bits() {
            return Err(ReadError::bits(
                self.position / 8,
                bits - self.remaining_bits(),
            ));
        }

        let mut value = 0u32;
        for offset in 0..bits {
            let position = self.position + offset;
            let bit = (self.data[position / 8] >> (position % 8)) & 1;
            value |= u32::from(bit) << offset;
        }

        self.position += bits;
        Ok(value)
    }

    pub(crate) fn read_u8(&mut self, bits: u8) -> Result<u8, ReadError> {
        debug_assert!(bits <= 8);
        self.read(bits).map(|value| value.to_le_bytes()[0])
    }

    pub(crate) fn read_u16(&mut self, bits: u8) -> Result<u16, ReadError> {
        debug_assert!(bits <= 16);
        self.read(bits).map(|value| {
            let [low, high, ..] = value.to_le_bytes();
            u16::from_le_bytes([low, high])
        })
    }

    /// Reads a single bit as a flag.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is exhausted.
    pub fn read_bool(&mut self) -> Result<bool, ReadError> {
        self.read(1).map(|bit| bit == 1)
    }

    /// Returns the number of bits consumed so far.
    #[must_use]
    pub fn total_bits_read(&self) -> usize {
        self.position
    }

    /// Returns the number of bits left in the buffer.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.position
    }
}

/// Accumulates individual bits into a growable byte buffer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `bits` bits (at most 32) of `value`.
    pub fn write(&mut self, value: u32, bits: u8) {
        debug_assert!(bits <= 32);

        for offset in 0..bits {
            if self.len % 8 == 0 {
                self.bytes.push(0);
            }

            let bit = u8::from((value >> offset) & 1 == 1);
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (self.len % 8);
            }
            self.len += 1;
        }
    }

    /// Appends a single flag bit.
    pub fn write_bool(&mut self, value: bool) {
        self.write(u32::from(value), 1);
    }

    /// Appends whole bytes, eight bits each.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.len % 8 == 0 {
            self.bytes.extend_from_slice(bytes);
            self.len += bytes.len() * 8;
        } else {
            for &byte in bytes {
                self.write(u32::from(byte), 8);
            }
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.len
    }

    /// Finishes the buffer, leaving any unused bits of the final byte as zero.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Number of bits needed to represent `value`, as defined by the Vorbis specification.
pub(crate) fn ilog(mut value: u32) -> u8 {
    let mut bits = 0;
    while value > 0 {
        bits += 1;
        value >>= 1;
    }
    bits
}

#[cfg(test)]
mod test {
    use super::{ilog, BitReader, BitWriter};

    #[test]
    fn integer_log() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(7), 3);
        assert_eq!(ilog(8), 4);
        assert_eq!(ilog(u32::MAX), 32);
    }

    #[test]
    fn read_bits_lsb_first() {
        let data = [0b1010_0110, 0b0000_0011];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(1).unwrap(), 0);
        assert_eq!(reader.read(2).unwrap(), 0b11);
        assert_eq!(reader.read(3).unwrap(), 0b100);
        assert_eq!(reader.read(4).unwrap(), 0b1110);
        assert_eq!(reader.total_bits_read(), 10);
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.remaining_bits(), 5);
        assert!(reader.read(6).is_err());
        assert_eq!(reader.read(5).unwrap(), 0);
    }

    #[test]
    fn read_full_words() {
        let data = 0xDEAD_BEEF_u32.to_le_bytes();
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(32).unwrap(), 0xDEAD_BEEF);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn write_bits_lsb_first() {
        let mut writer = BitWriter::new();
        writer.write(0, 1);
        writer.write(0b11, 2);
        writer.write(0b100, 3);
        writer.write(0b1110, 4);
        writer.write_bool(true);

        assert_eq!(writer.bit_len(), 11);
        assert_eq!(writer.into_bytes(), vec![0b1010_0110, 0b0000_0111]);
    }

    #[test]
    fn write_unaligned_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bytes(&[0xFF, 0x00]);

        assert_eq!(writer.bit_len(), 17);
        assert_eq!(writer.into_bytes(), vec![0xFF, 0x01, 0x00]);

        let mut writer = BitWriter::new();
        writer.write_bytes(b"OK");
        writer.write(0x1FF, 9);
        assert_eq!(writer.into_bytes(), vec![b'O', b'K', 0xFF, 0x01]);
    }

    #[test]
    fn writer_output_reads_back() {
        let mut writer = BitWriter::new();
        writer.write(0x0056_4342, 24);
        writer.write(5, 4);
        writer.write(0x3FFF, 14);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read(24).unwrap(), 0x0056_4342);
        assert_eq!(reader.read(4).unwrap(), 5);
        assert_eq!(reader.read(14).unwrap(), 0x3FFF);
    }
}
