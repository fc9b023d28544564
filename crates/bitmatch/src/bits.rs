//! Bitstring views and the low-level integer/byte extraction primitives.
//!
//! Bits are addressed in MSB-first order: bit 0 is the high bit of the first byte.
//! Every offset taken by a [Bitstring] method is relative to the start of that view.

use std::fmt;

use crate::errors::{ReadError, WriteError};

/// Signedness of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sign {
    Signed,
    #[default]
    Unsigned,
}

/// Byte order of an integer field.
///
/// Little endian splits the field into 8-bit chunks in stream order (the last chunk
/// may be shorter) and gives the first chunk the lowest significance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
    Native,
}

impl Endian {
    /// Replaces [Endian::Native] with the byte order of the target.
    pub fn resolve(self) -> Endian {
        match self {
            Endian::Native if cfg!(target_endian = "little") => Endian::Little,
            Endian::Native => Endian::Big,
            other => other,
        }
    }
}

/// Reads the bit at `bit_pos`. Returns 0 or 1.
pub fn read_bit_at(data: &[u8], bit_pos: usize) -> Result<u8, ReadError> {
    data.get(bit_pos / 8)
        .map(|byte| (byte >> (7 - bit_pos % 8)) & 1)
        .ok_or(ReadError::OutOfBounds)
}

/// Reads `n <= 64` bits starting at `bit_pos` as an unsigned value.
///
/// Whole bytes (or the parts of them inside the range) are taken at a time.
pub fn read_bits_at(data: &[u8], bit_pos: usize, n: usize) -> Result<u64, ReadError> {
    if n > 64 {
        return Err(ReadError::InvalidWidth(n));
    }
    let end = bit_pos
        .checked_add(n)
        .filter(|&end| end <= data.len() * 8)
        .ok_or(ReadError::OutOfBounds)?;

    let mut value = 0u64;
    let mut pos = bit_pos;

    while pos < end {
        let in_byte = pos % 8;
        let take = (8 - in_byte).min(end - pos);
        let chunk = (u64::from(data[pos / 8]) >> (8 - in_byte - take)) & low_mask(take);
        value = (value << take) | chunk;
        pos += take;
    }

    Ok(value)
}

/// Interprets the low `bits` of `value` as a two's-complement number.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    match bits {
        0 => 0,
        64.. => value as i64,
        _ => {
            let shift = 64 - bits;
            ((value << shift) as i64) >> shift
        }
    }
}

fn low_mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Reorders an `n`-bit value read in stream order into its little-endian value.
fn stream_to_le(value: u64, n: usize) -> u64 {
    let mut out = 0u64;
    let mut remaining = n;
    let mut shift = 0;

    while remaining > 0 {
        let take = remaining.min(8);
        let chunk = (value >> (remaining - take)) & low_mask(take);
        out |= chunk << shift;
        shift += take;
        remaining -= take;
    }

    out
}

/// Inverse of [stream_to_le].
fn le_to_stream(value: u64, n: usize) -> u64 {
    let mut out = 0u64;
    let mut remaining = n;
    let mut shift = 0;

    while remaining > 0 {
        let take = remaining.min(8);
        let chunk = (value >> shift) & low_mask(take);
        out |= chunk << (remaining - take);
        shift += take;
        remaining -= take;
    }

    out
}

/// A read-only view of `length` bits of `data`, starting `offset` bits in.
#[derive(Clone, Copy)]
pub struct Bitstring<'a> {
    data: &'a [u8],
    offset: usize,
    length: usize,
}

impl<'a> Bitstring<'a> {
    /// The whole of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Bitstring {
            data,
            offset: 0,
            length: data.len() * 8,
        }
    }

    /// A view over `data` with explicit bit offset and bit length.
    pub fn from_parts(data: &'a [u8], offset: usize, length: usize) -> Result<Self, ReadError> {
        if offset
            .checked_add(length)
            .is_none_or(|end| end > data.len() * 8)
        {
            return Err(ReadError::OutOfBounds);
        }

        Ok(Bitstring {
            data,
            offset,
            length,
        })
    }

    /// The empty bitstring.
    pub fn empty() -> Bitstring<'static> {
        Bitstring {
            data: &[],
            offset: 0,
            length: 0,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bit offset of the view inside [Bitstring::data].
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the view in bits.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn check_range(&self, offset: usize, n: usize) -> Result<(), ReadError> {
        if offset.checked_add(n).is_none_or(|end| end > self.length) {
            return Err(ReadError::OutOfBounds);
        }
        Ok(())
    }

    /// A sub-view of `length` bits starting `offset` bits into this view.
    pub fn sub(&self, offset: usize, length: usize) -> Result<Bitstring<'a>, ReadError> {
        self.check_range(offset, length)?;

        Ok(Bitstring {
            data: self.data,
            offset: self.offset + offset,
            length,
        })
    }

    /// Everything after the first `n` bits.
    pub fn skip(&self, n: usize) -> Result<Bitstring<'a>, ReadError> {
        let rest = self.length.checked_sub(n).ok_or(ReadError::OutOfBounds)?;
        self.sub(n, rest)
    }

    /// Reads bit `index` of the view.
    pub fn bit(&self, index: usize) -> Result<u8, ReadError> {
        self.check_range(index, 1)?;
        read_bit_at(self.data, self.offset + index)
    }

    /// Extracts a `width`-bit integer at `offset` with the given sign and byte order.
    pub fn get_int(
        &self,
        offset: usize,
        width: usize,
        sign: Sign,
        endian: Endian,
    ) -> Result<i64, ReadError> {
        if width == 0 || width > 64 {
            return Err(ReadError::InvalidWidth(width));
        }
        self.check_range(offset, width)?;

        let mut value = read_bits_at(self.data, self.offset + offset, width)?;
        if endian.resolve() == Endian::Little {
            value = stream_to_le(value, width);
        }

        match sign {
            Sign::Signed => Ok(sign_extend(value, width)),
            Sign::Unsigned => Ok(value as i64),
        }
    }

    /// Extracts `byte_len` bytes starting at bit `offset`, which need not be byte aligned.
    pub fn get_bytes(&self, offset: usize, byte_len: usize) -> Result<Vec<u8>, ReadError> {
        let bits = byte_len.checked_mul(8).ok_or(ReadError::OutOfBounds)?;
        self.check_range(offset, bits)?;

        let start = self.offset + offset;
        if start % 8 == 0 {
            let first = start / 8;
            return Ok(self.data[first..first + byte_len].to_vec());
        }

        let mut out = Vec::with_capacity(byte_len);
        for i in 0..byte_len {
            out.push(read_bits_at(self.data, start + i * 8, 8)? as u8);
        }

        Ok(out)
    }

    /// Copies the view into fresh bytes, padding the last byte with zero bits.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.push_bits(self);
        writer.finish().0
    }
}

impl PartialEq for Bitstring<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && (0..self.length).all(|i| self.bit(i).ok() == other.bit(i).ok())
    }
}

impl Eq for Bitstring<'_> {}

impl fmt::Debug for Bitstring<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitstring(")?;
        for byte in self.to_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "; {} bits)", self.length)
    }
}

/// Builds a buffer bit by bit. The construction counterpart of [Bitstring::get_int].
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bit(&mut self, bit: bool) -> &mut Self {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
        self
    }

    /// Appends `value` as a `width`-bit integer.
    ///
    /// Accepts anything representable either as a signed or an unsigned `width`-bit number.
    pub fn push_int(
        &mut self,
        value: i64,
        width: usize,
        endian: Endian,
    ) -> Result<&mut Self, WriteError> {
        if width == 0 || width > 64 {
            return Err(WriteError::InvalidWidth(width));
        }

        if width < 64 {
            let min = i64::MIN >> (64 - width);
            let fits = value >= min && (value < 0 || value as u64 <= low_mask(width));
            if !fits {
                return Err(WriteError::InvalidValue { value, width });
            }
        }

        let mut raw = value as u64 & low_mask(width);
        if endian.resolve() == Endian::Little {
            raw = le_to_stream(raw, width);
        }

        for i in (0..width).rev() {
            self.push_bit((raw >> i) & 1 == 1);
        }

        Ok(self)
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if self.bit_len % 8 == 0 {
            self.data.extend_from_slice(bytes);
            self.bit_len += bytes.len() * 8;
            return self;
        }

        for &byte in bytes {
            for i in (0..8).rev() {
                self.push_bit((byte >> i) & 1 == 1);
            }
        }
        self
    }

    pub fn push_bits(&mut self, bits: &Bitstring<'_>) -> &mut Self {
        for i in 0..bits.len() {
            let bit = read_bit_at(bits.data, bits.offset + i).unwrap_or(0);
            self.push_bit(bit == 1);
        }
        self
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// A view over what has been written so far.
    pub fn as_bitstring(&self) -> Bitstring<'_> {
        Bitstring {
            data: &self.data,
            offset: 0,
            length: self.bit_len,
        }
    }

    /// Returns the bytes and the number of meaningful bits in them.
    pub fn finish(self) -> (Vec<u8>, usize) {
        (self.data, self.bit_len)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_read_bits_at() {
        let data = [0b11111111];
        assert_eq!(read_bits_at(&data, 0, 8).unwrap(), 0b11111111);
        assert_eq!(read_bits_at(&[0x0A, 0xBC, 0xDE], 4, 16).unwrap(), 0xABCD);
        assert_eq!(read_bits_at(&[0b0110_0000], 1, 2).unwrap(), 0b11);
        assert_eq!(read_bits_at(&[0xFF], 3, 0).unwrap(), 0);
    }

    #[test]
    fn test_read_bits_more_than_64() {
        let data = [0b11111111];
        assert_eq!(
            read_bits_at(&data, 0, 65).unwrap_err(),
            ReadError::InvalidWidth(65)
        );
    }

    #[test]
    fn test_bit_reads_inside_the_view() {
        let bits = Bitstring::new(&[0b1010_0000, 0xFF]).sub(1, 9).unwrap();
        assert_eq!(bits.bit(0).unwrap(), 0);
        assert_eq!(bits.bit(1).unwrap(), 1);
        assert_eq!(bits.bit(8).unwrap(), 1);
        assert_eq!(bits.bit(9).unwrap_err(), ReadError::OutOfBounds);
        assert_eq!(
            bits.get_int(2, 8, Sign::Unsigned, Endian::Big).unwrap_err(),
            ReadError::OutOfBounds
        );
    }

    #[test]
    fn test_get_int_wide_fields() {
        let bits = Bitstring::new(&[0xFF; 8]);
        assert_eq!(bits.get_int(0, 64, Sign::Signed, Endian::Big).unwrap(), -1);
        assert_eq!(bits.get_int(1, 63, Sign::Signed, Endian::Big).unwrap(), -1);
        assert_eq!(
            bits.get_int(1, 63, Sign::Unsigned, Endian::Big).unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn test_get_int_big_and_little() {
        let bits = Bitstring::new(&[0x12, 0x34]);
        assert_eq!(
            bits.get_int(0, 16, Sign::Unsigned, Endian::Big).unwrap(),
            0x1234
        );
        assert_eq!(
            bits.get_int(0, 16, Sign::Unsigned, Endian::Little).unwrap(),
            0x3412
        );
    }

    #[test]
    fn test_get_int_little_partial_chunk() {
        // stream: 0xAB then 0b1100 -> little endian 0xC_AB
        let bits = Bitstring::new(&[0xAB, 0b1100_0000]);
        assert_eq!(
            bits.get_int(0, 12, Sign::Unsigned, Endian::Little).unwrap(),
            0xCAB
        );
    }

    #[test]
    fn test_get_int_signed() {
        let bits = Bitstring::new(&[0b1111_0000]);
        assert_eq!(bits.get_int(0, 4, Sign::Signed, Endian::Big).unwrap(), -1);
        assert_eq!(bits.get_int(4, 4, Sign::Signed, Endian::Big).unwrap(), 0);
    }

    #[test]
    fn test_get_int_bounds() {
        let bits = Bitstring::new(&[0xFF]).sub(2, 4).unwrap();
        assert_eq!(
            bits.get_int(1, 4, Sign::Unsigned, Endian::Big).unwrap_err(),
            ReadError::OutOfBounds
        );
        assert_eq!(
            bits.get_int(0, 0, Sign::Unsigned, Endian::Big).unwrap_err(),
            ReadError::InvalidWidth(0)
        );
    }

    #[test]
    fn test_get_bytes_unaligned() {
        let bits = Bitstring::new(&[0x0A, 0xBC, 0xD0]);
        assert_eq!(bits.get_bytes(4, 2).unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(bits.get_bytes(8, 1).unwrap(), vec![0xBC]);
    }

    #[test]
    fn test_sub_and_skip() {
        let bits = Bitstring::new(&[0xF0, 0x0F]);
        let tail = bits.skip(4).unwrap();
        assert_eq!(tail.len(), 12);
        assert_eq!(tail.offset(), 4);
        assert_eq!(tail.sub(0, 4).unwrap(), Bitstring::new(&[0x00]).sub(0, 4).unwrap());
        assert_eq!(bits.skip(17).unwrap_err(), ReadError::OutOfBounds);
    }

    #[test]
    fn test_equality_ignores_alignment() {
        let a = Bitstring::new(&[0b1010_0000]).sub(0, 3).unwrap();
        let b = Bitstring::new(&[0b0001_0100]).sub(3, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_writer_rejects_values_that_do_not_fit() {
        let mut writer = BitWriter::new();
        assert_eq!(
            writer.push_int(16, 4, Endian::Big).unwrap_err(),
            WriteError::InvalidValue { value: 16, width: 4 }
        );
        assert_eq!(
            writer.push_int(0, 65, Endian::Big).unwrap_err(),
            WriteError::InvalidWidth(65)
        );
    }

    #[test]
    fn test_writer_width_63() {
        let mut writer = BitWriter::new();
        writer
            .push_int(1, 63, Endian::Big)
            .unwrap()
            .push_int(i64::MAX, 63, Endian::Little)
            .unwrap()
            .push_int(i64::MIN >> 1, 63, Endian::Big)
            .unwrap();
        assert_eq!(
            writer.push_int(i64::MIN, 63, Endian::Big).unwrap_err(),
            WriteError::InvalidValue {
                value: i64::MIN,
                width: 63
            }
        );

        let bits = writer.as_bitstring();
        assert_eq!(bits.get_int(0, 63, Sign::Unsigned, Endian::Big).unwrap(), 1);
        assert_eq!(
            bits.get_int(63, 63, Sign::Unsigned, Endian::Little).unwrap(),
            i64::MAX
        );
        assert_eq!(
            bits.get_int(126, 63, Sign::Signed, Endian::Big).unwrap(),
            i64::MIN >> 1
        );
    }

    #[test]
    fn test_writer_mixed() {
        let mut writer = BitWriter::new();
        writer.push_int(0xA, 4, Endian::Big).unwrap();
        writer.push_bytes(&[0xBC]);
        writer.push_int(0xD, 4, Endian::Big).unwrap();
        assert_eq!(writer.finish(), (vec![0xAB, 0xCD], 16));
    }

    proptest! {
        #[test]
        fn int_round_trip(
            width in 1usize..=64,
            raw in any::<u64>(),
            signed in any::<bool>(),
            endian in prop_oneof![Just(Endian::Big), Just(Endian::Little), Just(Endian::Native)],
            lead in 0usize..16,
        ) {
            let sign = if signed { Sign::Signed } else { Sign::Unsigned };
            let bits = raw & low_mask(width);
            let value = match sign {
                Sign::Signed => sign_extend(bits, width),
                Sign::Unsigned => bits as i64,
            };

            let mut writer = BitWriter::new();
            for _ in 0..lead {
                writer.push_bit(true);
            }
            writer.push_int(value, width, endian).unwrap();
            let (data, len) = writer.finish();

            let view = Bitstring::from_parts(&data, 0, len).unwrap();
            prop_assert_eq!(view.get_int(lead, width, sign, endian).unwrap(), value);
        }
    }
}
