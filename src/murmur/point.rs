use byteorder::{BigEndian, ByteOrder};

/// One 16-byte record: the start of the time bucket it belongs to, and the
/// value stored for that bucket. `interval == 0` means the slot is empty.
///
/// The on-disk `value` field is an unsigned 64-bit integer; it holds the raw
/// bit pattern of an IEEE-754 double, not a truncating cast of one (the
/// original C source did the latter — see the design notes on why this
/// implementation doesn't).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point(pub u64, pub f64);

pub const POINT_SIZE: usize = 16;

impl Default for Point {
    fn default() -> Point {
        Point(0, 0.0)
    }
}

impl Point {
    #[inline]
    pub fn interval(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn read_from_slice(buf: &[u8]) -> Point {
        debug_assert_eq!(buf.len(), POINT_SIZE);
        let interval = BigEndian::read_u64(&buf[0..8]);
        let bits = BigEndian::read_u64(&buf[8..16]);
        Point(interval, f64::from_bits(bits))
    }

    /// Writes this point's value into `buf`, stamping `interval` as the
    /// record's interval rather than whatever `self.0` happens to hold --
    /// callers always write the bucket-aligned start time, not the raw
    /// timestamp that was passed in to `set`.
    pub fn write_to_slice(&self, interval: u64, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), POINT_SIZE);
        BigEndian::write_u64(&mut buf[0..8], interval);
        BigEndian::write_u64(&mut buf[8..16], self.1.to_bits());
    }
}
