pub mod archive;
pub mod header;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use memmap2::MmapMut;

use crate::murmur::aggregation::AggregationType;
use crate::murmur::clock::{Clock, SystemClock};
use crate::murmur::error::{MurmurError, Result};
use crate::murmur::point::POINT_SIZE;
use crate::murmur::schema::Schema;
use crate::murmur::spec;

pub use archive::Archive;
pub use header::{ArchiveHeader, FileHeader, ARCHIVE_HEADER_SIZE, FILE_HEADER_SIZE};

/// An open murmur database: one memory-mapped file, its decoded headers,
/// and the archive ring descriptors sorted finest-first. Owns its file
/// descriptor and archive array exclusively for its lifetime -- there is
/// no sharing, and no cache above the OS page cache.
pub struct MurmurFile {
    path: PathBuf,
    mmap: MmapMut,
    header: FileHeader,
    archives: Vec<Archive>,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for MurmurFile {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MurmurFile")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("archives", &self.archives)
            .finish()
    }
}

impl MurmurFile {
    /// Creates a new database at `path`. Refuses to proceed if `path`
    /// already exists (`AlreadyExists`); the file is opened with
    /// create-new semantics, so a concurrent creator loses the race
    /// cleanly rather than silently truncating the winner's file.
    pub fn create<P: AsRef<Path>>(
        path: P,
        specs: &[String],
        aggregation: AggregationType,
        x_files_factor: u8,
    ) -> Result<MurmurFile> {
        Self::create_with_clock(path, specs, aggregation, x_files_factor, Box::new(SystemClock))
    }

    pub fn create_with_clock<P: AsRef<Path>>(
        path: P,
        specs: &[String],
        aggregation: AggregationType,
        x_files_factor: u8,
        clock: Box<dyn Clock>,
    ) -> Result<MurmurFile> {
        let path = path.as_ref();
        if path.exists() {
            return Err(MurmurError::AlreadyExists(path.display().to_string()));
        }

        let parsed = spec::parse_specs(specs)?;
        let schema = Schema::validate(parsed)?;
        let archive_count = schema.archives.len() as u32;

        let mut archive_headers = Vec::with_capacity(schema.archives.len());
        let mut offset = header::data_start(schema.archives.len()) as u32;
        for a in &schema.archives {
            archive_headers.push(ArchiveHeader {
                offset,
                seconds_per_point: a.seconds_per_point,
                points: a.points,
            });
            offset += a.points * POINT_SIZE as u32;
        }
        let total_size = offset as usize;

        let file_header = FileHeader {
            aggregation,
            max_retention: schema.max_retention(),
            x_files_factor,
            archive_count,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        {
            use std::io::Write;
            let mut writer = &file;

            let mut hdr_buf = [0u8; FILE_HEADER_SIZE];
            file_header.encode(&mut hdr_buf);
            writer.write_all(&hdr_buf)?;

            for ah in &archive_headers {
                let mut buf = [0u8; ARCHIVE_HEADER_SIZE];
                ah.encode(&mut buf);
                writer.write_all(&buf)?;
            }
        }

        let written_so_far = header::data_start(schema.archives.len());
        preallocate(&file, written_so_far, total_size - written_so_far)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let archives = archive_headers
            .iter()
            .map(|ah| Archive {
                offset: ah.offset as usize,
                seconds_per_point: ah.seconds_per_point,
                points: ah.points as usize,
            })
            .collect();

        info!(
            "created murmur database {} with {archive_count} archives, {total_size} bytes",
            path.display()
        );

        Ok(MurmurFile {
            path: path.to_path_buf(),
            mmap,
            header: file_header,
            archives,
            clock,
        })
    }

    /// Opens an existing database, reading and decoding every header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MurmurFile> {
        Self::open_with_clock(path, Box::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Box<dyn Clock>) -> Result<MurmurFile> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        if mmap.len() < FILE_HEADER_SIZE {
            return Err(MurmurError::CorruptFile(format!(
                "file is only {} bytes, shorter than the {FILE_HEADER_SIZE}-byte header",
                mmap.len()
            )));
        }
        let header = FileHeader::decode(&mmap[0..FILE_HEADER_SIZE])?;

        let mut archives = Vec::with_capacity(header.archive_count as usize);
        let mut cursor = header::archives_start();
        for i in 0..header.archive_count as usize {
            if cursor + ARCHIVE_HEADER_SIZE > mmap.len() {
                return Err(MurmurError::CorruptFile(format!(
                    "archive header {i} is truncated"
                )));
            }
            let ah = ArchiveHeader::decode(&mmap[cursor..cursor + ARCHIVE_HEADER_SIZE])
                .map_err(|_| MurmurError::CorruptFile(format!("archive header {i} is truncated")))?;
            archives.push(Archive {
                offset: ah.offset as usize,
                seconds_per_point: ah.seconds_per_point,
                points: ah.points as usize,
            });
            cursor += ARCHIVE_HEADER_SIZE;
            debug!(
                "archive {i}: offset={}, seconds_per_point={}, points={}",
                ah.offset, ah.seconds_per_point, ah.points
            );
        }

        Ok(MurmurFile {
            path: path.to_path_buf(),
            mmap,
            header,
            archives,
            clock,
        })
    }

    /// Releases the file descriptor and archive array. The handle must not
    /// be used after this call; since `self` is consumed, the type system
    /// already enforces that.
    pub fn close(self) {
        drop(self);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_retention(&self) -> u64 {
        self.header.max_retention
    }

    pub fn aggregation(&self) -> AggregationType {
        self.header.aggregation
    }

    pub fn x_files_factor(&self) -> u8 {
        self.header.x_files_factor
    }

    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Selects the finest archive whose retention can still hold a write
    /// at `timestamp`, given the current time. Fails if the point is
    /// older than `max_retention` or is not strictly in the past.
    fn select_archive(&self, timestamp: u64) -> Result<usize> {
        let now = self.clock.now();
        let diff = now as i64 - timestamp as i64;

        if diff <= 0 {
            return Err(MurmurError::OutOfRange {
                reason: format!("timestamp {timestamp} is not in the past (now={now})"),
            });
        }
        let diff = diff as u64;
        if diff > self.header.max_retention {
            return Err(MurmurError::OutOfRange {
                reason: format!(
                    "timestamp {timestamp} is {diff}s old, older than max_retention {}",
                    self.header.max_retention
                ),
            });
        }

        self.archives
            .iter()
            .position(|a| a.retention() > diff)
            .ok_or_else(|| MurmurError::OutOfRange {
                reason: format!("no archive covers a {diff}s-old point"),
            })
    }

    /// Writes `value` at `timestamp`, selecting the finest archive that
    /// covers it and cascading the aggregated result into every coarser
    /// archive.
    pub fn set(&mut self, timestamp: u64, value: f64) -> Result<()> {
        let index = self.select_archive(timestamp)?;
        self.write_and_propagate(index, timestamp, value);
        Ok(())
    }

    fn write_and_propagate(&mut self, mut index: usize, mut timestamp: u64, mut value: f64) {
        loop {
            self.archives[index].write_point(&mut self.mmap[..], timestamp, value);

            let Some(next_index) = index.checked_add(1).filter(|&i| i < self.archives.len()) else {
                return;
            };

            let fine = self.archives[index];
            let coarse = self.archives[next_index];
            let coarse_bucket_start = coarse.bucket_start(timestamp);
            let n = (coarse.seconds_per_point / fine.seconds_per_point) as usize;

            let points = fine.read_n_points(&self.mmap[..], coarse_bucket_start, n);
            value = self.header.aggregation.aggregate(&points);
            timestamp = coarse_bucket_start;
            index = next_index;
        }
    }

    /// Reads the value currently stored in the bucket covering `timestamp`.
    /// Does not check that the stored interval still matches the bucket
    /// (a stale, wrapped-over slot returns its old value rather than an
    /// error -- preserved for compatibility with existing readers).
    pub fn get(&self, timestamp: u64) -> Result<f64> {
        let index = self.select_archive(timestamp)?;
        Ok(self.archives[index].read_point(&self.mmap[..], timestamp).value())
    }

    /// A human-readable summary of the header and archive layout.
    pub fn dump_info(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Max data age: {} seconds\n", self.header.max_retention));
        out.push_str(&format!("Accumulation factor: {}\n", self.header.x_files_factor));
        out.push_str(&format!("Aggregation method: {}\n", self.header.aggregation));
        out.push_str(&format!("Number of archives: {}\n\n", self.archives.len()));

        for (i, a) in self.archives.iter().enumerate() {
            out.push_str(&format!("Archive {i}:\n"));
            out.push_str(&format!("  Seconds per point: {}\n", a.seconds_per_point));
            out.push_str(&format!("  Points: {}\n", a.points));
            out.push_str(&format!("  Retention: {}\n\n", a.retention()));
        }
        out
    }

    /// Every stored point across every archive, as `<interval> = <value>`.
    pub fn dump(&self) -> String {
        let mut out = self.dump_info();
        for (i, a) in self.archives.iter().enumerate() {
            out.push_str(&format!("Archive {i} data:\n"));
            let region = &self.mmap[a.offset..a.offset + a.size()];
            for chunk in region.chunks(POINT_SIZE) {
                let p = crate::murmur::point::Point::read_from_slice(chunk);
                out.push_str(&format!("{} = {}\n", p.interval(), p.value()));
            }
        }
        out
    }
}

fn preallocate(file: &File, offset: usize, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let raw_fd = file.as_raw_fd();
    // fallocate reserves the extent (and, without FALLOC_FL_KEEP_SIZE,
    // extends the file's apparent size) without the lazy-zero-fill
    // behavior a plain write loop would have.
    let ret = unsafe { libc::fallocate(raw_fd, 0, offset as libc::off_t, len as libc::off_t) };
    if ret != 0 {
        let err = io::Error::last_os_error();
        warn!("fallocate failed while preallocating archive area: {err}");
        return Err(MurmurError::IoError(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::murmur::clock::FixedClock;

    fn create_db(path: &Path, specs: &[&str], clock_at: u64) -> MurmurFile {
        let specs: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        MurmurFile::create_with_clock(
            path,
            &specs,
            AggregationType::Average,
            50,
            Box::new(FixedClock::new(clock_at)),
        )
        .unwrap()
    }

    #[test]
    fn s1_file_size_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.mmr");
        let db = create_db(&path, &["10s:1m", "1m:5m"], 1000);

        assert_eq!(db.archives().len(), 2);
        assert_eq!(db.archives()[0].seconds_per_point, 10);
        assert_eq!(db.archives()[0].points, 6);
        assert_eq!(db.archives()[1].seconds_per_point, 60);
        assert_eq!(db.archives()[1].points, 5);
        assert_eq!(db.max_retention(), 300);

        drop(db);
        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, 17 + 24 + 6 * 16 + 5 * 16);
    }

    #[test]
    fn create_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.mmr");
        let _db = create_db(&path, &["10s:1m"], 1000);
        let specs = vec!["10s:1m".to_string()];
        let err =
            MurmurFile::create(&path, &specs, AggregationType::Average, 50).unwrap_err();
        assert!(matches!(err, MurmurError::AlreadyExists(_)));
    }

    #[test]
    fn p2_write_then_read_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p2.mmr");
        let mut db = create_db(&path, &["10s:1m", "1m:5m"], 1000);

        db.set(999, 100.0).unwrap();
        assert_eq!(db.get(999).unwrap(), 100.0);
    }

    #[test]
    fn s2_propagation_averages_five_empty_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s2.mmr");
        let mut db = create_db(&path, &["10s:1m", "1m:5m"], 1001);

        db.set(1000, 100.0).unwrap();
        assert_eq!(db.get(1000).unwrap(), 100.0);

        // `get` always re-runs archive selection on the query timestamp, so
        // it won't necessarily land on the coarse archive just because that's
        // where propagation wrote. Inspect the coarse archive's raw stored
        // point directly instead, at the bucket (960) it was propagated into.
        let coarse = db.archives()[1];
        drop(db);
        let bytes = std::fs::read(&path).unwrap();
        let p = coarse.read_point(&bytes, 960);
        assert_eq!(p.interval(), 960);
        assert!((p.value() - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn p3_ring_wrap_overwrites_old_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p3.mmr");
        let retention = 60u64;
        let mut db = create_db(&path, &["10s:1m"], 1010);

        db.set(1000, 1.0).unwrap();
        assert_eq!(db.get(1000).unwrap(), 1.0);
        drop(db);

        // Move the clock forward and write into the same ring slot a
        // retention-period later -- both `t` and `t + retention` map to the
        // same bucket index, so the old value is overwritten.
        let mut db2 =
            MurmurFile::open_with_clock(&path, Box::new(FixedClock::new(1000 + retention + 10)))
                .unwrap();
        db2.set(1000 + retention, 2.0).unwrap();
        assert_eq!(db2.get(1000 + retention).unwrap(), 2.0);
    }

    #[test]
    fn s6_out_of_range_too_old_and_future() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s6.mmr");
        let mut db = create_db(&path, &["10s:1m", "1m:5m"], 1000);

        assert!(matches!(
            db.set(500, 1.0),
            Err(MurmurError::OutOfRange { .. })
        ));
        assert!(matches!(
            db.set(1001, 1.0),
            Err(MurmurError::OutOfRange { .. })
        ));
        assert!(matches!(
            db.set(1000, 1.0),
            Err(MurmurError::OutOfRange { .. })
        ));
    }

    #[test]
    fn p5_propagation_matches_configured_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p5.mmr");
        // fine:coarse ratio of 3 (1s feeding 3s buckets).
        let specs = vec!["1s:9s".to_string(), "3s:30s".to_string()];
        let mut db = MurmurFile::create_with_clock(
            &path,
            &specs,
            AggregationType::Sum,
            50,
            Box::new(FixedClock::new(100)),
        )
        .unwrap();

        // All three timestamps are recent enough (diff < 9) to land in the
        // fine archive, and all three fall in the same 3s coarse bucket
        // (96, 97, 98 all floor-divide to 96).
        db.set(96, 1.0).unwrap();
        db.set(97, 2.0).unwrap();
        db.set(98, 3.0).unwrap();

        let coarse = db.archives()[1];
        drop(db);
        let bytes = std::fs::read(&path).unwrap();
        let p = coarse.read_point(&bytes, 96);
        assert_eq!(p.interval(), 96);
        assert_eq!(p.value(), 6.0);
    }

    #[test]
    fn dump_info_contains_archive_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.mmr");
        let db = create_db(&path, &["10s:1m", "1m:5m"], 1000);
        let info = db.dump_info();
        assert!(info.contains("Number of archives: 2"));
        assert!(info.contains("Seconds per point: 10"));
        assert!(info.contains("Seconds per point: 60"));
    }

    #[test]
    fn reopened_file_has_identical_archive_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.mmr");
        {
            let _db = create_db(&path, &["10s:1m", "1m:5m"], 1000);
        }
        let db = MurmurFile::open(&path).unwrap();
        assert_eq!(db.archives().len(), 2);
        assert_eq!(db.archives()[0].seconds_per_point, 10);
        assert_eq!(db.archives()[1].seconds_per_point, 60);
    }
}
