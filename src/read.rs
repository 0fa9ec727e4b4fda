use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroUsize,
};

/// Byte order of multi-byte integers in a container or stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first. Used by almost every platform.
    #[default]
    Little,
    /// Most significant byte first. Used by some console banks (`RIFX` streams).
    Big,
}

pub(crate) struct Reader<'data> {
    data: &'data [u8],
    position: usize,
    endian: Endian,
}

impl<'data> Reader<'data> {
    pub(crate) fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            position: 0,
            endian: Endian::Little,
        }
    }

    pub(crate) fn with_endian(data: &'data [u8], endian: Endian) -> Self {
        Self {
            data,
            position: 0,
            endian,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub(crate) fn endian(&self) -> Endian {
        self.endian
    }

    pub(crate) fn take(&mut self, len: usize) -> ReadResult<&'data [u8]> {
        let available = self.remaining();

        if len > available {
            return Err(self.incomplete(len - available));
        }

        let data = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(data)
    }

    pub(crate) fn take_const<const LEN: usize>(&mut self) -> ReadResult<[u8; LEN]> {
        let mut buf = [0; LEN];
        buf.copy_from_slice(self.take(LEN)?);
        Ok(buf)
    }

    pub(crate) fn skip(&mut self, amount: usize) -> ReadResult<()> {
        self.take(amount).map(|_| ())
    }

    // unlike `skip`, the target may lie behind the current position
    pub(crate) fn seek(&mut self, position: usize) -> ReadResult<()> {
        if position > self.data.len() {
            return Err(self.incomplete(position - self.data.len()));
        }

        self.position = position;
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> ReadResult<u8> {
        Ok(self.take_const::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> ReadResult<u16> {
        let buf = self.take_const()?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(buf),
            Endian::Big => u16::from_be_bytes(buf),
        })
    }

    pub(crate) fn u32(&mut self) -> ReadResult<u32> {
        let buf = self.take_const()?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(buf),
            Endian::Big => u32::from_be_bytes(buf),
        })
    }

    pub(crate) fn le_u32(&mut self) -> ReadResult<u32> {
        self.take_const().map(u32::from_le_bytes)
    }

    /// Reads the variable-length integer used by newer object directories:
    /// 7 bits per byte, most significant group first, high bit set on every byte but the last.
    pub(crate) fn var_u32(&mut self) -> ReadResult<u32> {
        let start = self.position;
        let mut value = 0u32;

        for _ in 0..5 {
            let byte = self.u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(ReadError {
            position: start,
            kind: ReadErrorKind::Overlong,
        })
    }

    pub(crate) fn cstr_until_nul(&mut self) -> ReadResult<&'data [u8]> {
        let rest = &self.data[self.position..];

        match rest.iter().position(|&byte| byte == 0) {
            Some(len) => {
                let text = &rest[..len];
                self.position += len + 1;
                Ok(text)
            }
            None => Err(ReadError {
                position: self.position,
                kind: ReadErrorKind::Unterminated,
            }),
        }
    }

    /// Reads `char_count` two-byte characters, keeping the first byte of each pair.
    /// Names in pack files are stored this way; this is not a UTF-16 decoder.
    pub(crate) fn wide_ascii(&mut self, char_count: usize) -> ReadResult<String> {
        let pairs = char_count
            .checked_mul(2)
            .ok_or_else(|| self.incomplete(usize::MAX))?;

        Ok(self
            .take(pairs)?
            .chunks_exact(2)
            .map(|pair| char::from(pair[0]))
            .collect())
    }

    fn incomplete(&self, needed: usize) -> ReadError {
        ReadError {
            position: self.position,
            kind: ReadErrorKind::Incomplete(NonZeroUsize::new(needed).unwrap_or(NonZeroUsize::MIN)),
        }
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadError>;

/// An error raised when a read runs past the end of its buffer or meets malformed framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    position: usize,
    kind: ReadErrorKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadErrorKind {
    Incomplete(NonZeroUsize),
    IncompleteBits(NonZeroUsize),
    Unterminated,
    Overlong,
}

impl ReadError {
    pub(crate) fn bits(position: usize, needed: usize) -> Self {
        Self {
            position,
            kind: ReadErrorKind::IncompleteBits(
                NonZeroUsize::new(needed).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }

    /// Returns the byte position at which the failed read started.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
impl ReadError {
    pub(crate) fn is_kind(&self, kind: ReadErrorKind) -> bool {
        self.kind == kind
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            ReadErrorKind::Incomplete(size) => {
                f.write_str(&format!("incomplete data: needed {size} more bytes to read"))
            }
            ReadErrorKind::IncompleteBits(size) => {
                f.write_str(&format!("incomplete data: needed {size} more bits to read"))
            }
            ReadErrorKind::Unterminated => f.write_str("string was not terminated by a null byte"),
            ReadErrorKind::Overlong => {
                f.write_str("variable-length integer was longer than 5 bytes")
            }
        }?;

        f.write_str(&format!(" - byte position {}", self.position))
    }
}

impl Error for ReadError {}
