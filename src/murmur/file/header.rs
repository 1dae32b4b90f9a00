use byteorder::{BigEndian, ByteOrder};

use crate::murmur::aggregation::AggregationType;
use crate::murmur::error::MurmurError;

/// Size of the encoded `FileHeader`, in bytes.
///
/// The header's own field list (aggregation u8 + max_retention u64 +
/// x_files_factor u8 + archive_count u32) only sums to 14 bytes, but the
/// spec's worked byte totals (the file-size formula and its examples) are
/// built on a 17-byte header. A 3-byte zeroed reserved field closes that
/// gap without disturbing any other offset.
pub const FILE_HEADER_SIZE: usize = 17;

/// Size of one encoded `ArchiveHeader`, in bytes.
pub const ARCHIVE_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub aggregation: AggregationType,
    pub max_retention: u64,
    pub x_files_factor: u8,
    pub archive_count: u32,
}

impl FileHeader {
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), FILE_HEADER_SIZE);
        buf[0] = self.aggregation.to_u8();
        BigEndian::write_u64(&mut buf[1..9], self.max_retention);
        buf[9] = self.x_files_factor;
        buf[10..13].fill(0);
        BigEndian::write_u32(&mut buf[13..17], self.archive_count);
    }

    pub fn decode(buf: &[u8]) -> Result<FileHeader, MurmurError> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(MurmurError::CorruptFile(format!(
                "short read of file header: got {} bytes, need {FILE_HEADER_SIZE}",
                buf.len()
            )));
        }

        let aggregation = AggregationType::from_u8(buf[0])?;
        let max_retention = BigEndian::read_u64(&buf[1..9]);
        let x_files_factor = buf[9];
        let archive_count = BigEndian::read_u32(&buf[13..17]);

        if archive_count == 0 {
            return Err(MurmurError::CorruptFile(
                "file header declares zero archives".to_string(),
            ));
        }

        Ok(FileHeader {
            aggregation,
            max_retention,
            x_files_factor,
            archive_count,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub offset: u32,
    pub seconds_per_point: u32,
    pub points: u32,
}

impl ArchiveHeader {
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), ARCHIVE_HEADER_SIZE);
        BigEndian::write_u32(&mut buf[0..4], self.offset);
        BigEndian::write_u32(&mut buf[4..8], self.seconds_per_point);
        BigEndian::write_u32(&mut buf[8..12], self.points);
    }

    pub fn decode(buf: &[u8]) -> Result<ArchiveHeader, MurmurError> {
        if buf.len() < ARCHIVE_HEADER_SIZE {
            return Err(MurmurError::CorruptFile(format!(
                "short read of archive header: got {} bytes, need {ARCHIVE_HEADER_SIZE}",
                buf.len()
            )));
        }
        Ok(ArchiveHeader {
            offset: BigEndian::read_u32(&buf[0..4]),
            seconds_per_point: BigEndian::read_u32(&buf[4..8]),
            points: BigEndian::read_u32(&buf[8..12]),
        })
    }
}

/// Byte offset of the start of the archive-header area -- right after the
/// file header.
#[inline]
pub fn archives_start() -> usize {
    FILE_HEADER_SIZE
}

/// Byte offset of the start of the archive data area, given how many
/// archives the file has.
#[inline]
pub fn data_start(archive_count: usize) -> usize {
    FILE_HEADER_SIZE + archive_count * ARCHIVE_HEADER_SIZE
}
