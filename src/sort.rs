//! External sorter.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;

use crate::merger;
use crate::region::{Region, RegionPair};

/// Default number of runs merged per merge step; also the internal buffer
/// capacity in records.
pub const DEFAULT_FAN_IN: usize = 16;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Record size is below one byte.
    InvalidRecordSize(usize),
    /// Merge fan-in is below two.
    InvalidFanIn(usize),
    /// Common I/O error against the data stream or the backup file.
    Io(io::Error),
    /// Temporary backup file creation error.
    BackupCreate(io::Error),
    /// Temporary backup file removal error. The sorted result is intact
    /// when this is returned after an otherwise successful sort.
    BackupRemove(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::InvalidRecordSize(_) | SortError::InvalidFanIn(_) => None,
            SortError::Io(err) => Some(err),
            SortError::BackupCreate(err) => Some(err),
            SortError::BackupRemove(err) => Some(err),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidRecordSize(size) => write!(f, "record size must be at least 1, got {}", size),
            SortError::InvalidFanIn(fan_in) => write!(f, "merge fan-in must be at least 2, got {}", fan_in),
            SortError::Io(err) => write!(f, "I/O operation failed: {}", err),
            SortError::BackupCreate(err) => write!(f, "temporary backup file not created: {}", err),
            SortError::BackupRemove(err) => write!(f, "temporary backup file not removed: {}", err),
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Record width in bytes. Must be set to a positive value.
    record_size: usize,
    /// Number of runs merged per merge step.
    fan_in: usize,
    /// Directory to be used to store the temporary backup file.
    tmp_dir: Option<Box<Path>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(self.record_size, self.fan_in, self.tmp_dir.as_deref())
    }

    /// Sets the record width in bytes.
    pub fn with_record_size(mut self, record_size: usize) -> ExternalSorterBuilder {
        self.record_size = record_size;
        return self;
    }

    /// Sets the merge fan-in. The internal buffer holds exactly this many records.
    pub fn with_fan_in(mut self, fan_in: usize) -> ExternalSorterBuilder {
        self.fan_in = fan_in;
        return self;
    }

    /// Sets directory to be used to store the temporary backup file.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            record_size: 0,
            fan_in: DEFAULT_FAN_IN,
            tmp_dir: None,
        }
    }
}

/// Pass counters, used to verify that small inputs skip the merge phase.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SortStats {
    pub(crate) total_records: usize,
    pub(crate) merge_passes: usize,
}

/// External k-way merge sorter over fixed-size records.
///
/// Sorts a seekable byte stream in place, holding at most `fan_in` records
/// in memory at a time and double-buffering between the stream and a
/// temporary backup file. Records are opaque byte sequences ordered only
/// by the injected comparator.
pub struct ExternalSorter {
    /// Record width in bytes.
    record_size: usize,
    /// Number of runs merged per merge step.
    fan_in: usize,
    /// Directory to be used to store the temporary backup file.
    tmp_dir: Option<Box<Path>>,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `record_size` - Record width in bytes. Must be at least 1.
    /// * `fan_in` - Number of runs merged per merge step; also the internal
    ///   buffer capacity in records. Must be at least 2.
    /// * `tmp_dir` - Directory to be used to store the temporary backup file.
    ///   If the parameter is [`None`] the default OS temporary directory will
    ///   be used.
    pub fn new(record_size: usize, fan_in: usize, tmp_dir: Option<&Path>) -> Result<Self, SortError> {
        if record_size < 1 {
            return Err(SortError::InvalidRecordSize(record_size));
        }
        if fan_in < 2 {
            return Err(SortError::InvalidFanIn(fan_in));
        }

        return Ok(ExternalSorter {
            record_size,
            fan_in,
            tmp_dir: tmp_dir.map(|path| path.into()),
        });
    }

    /// Sorts the stream in ascending lexicographic byte order.
    ///
    /// # Arguments
    /// * `data` - Stream holding the records to be sorted
    pub fn sort<S>(&self, data: &mut S) -> Result<(), SortError>
    where
        S: Read + Write + Seek,
    {
        self.sort_by(data, <[u8] as Ord>::cmp)
    }

    /// Sorts the stream in place using a custom compare function.
    ///
    /// The stream may be positioned arbitrarily on entry; the sorter seeks
    /// to the start itself. Trailing bytes that do not fill a whole record
    /// are ignored and left untouched. On any I/O failure the operation is
    /// aborted and the stream contents are left in an undefined
    /// intermediate state.
    ///
    /// # Arguments
    /// * `data` - Stream holding the records to be sorted
    /// * `compare` - Total-order function over two record byte sequences
    pub fn sort_by<S, F>(&self, data: &mut S, compare: F) -> Result<(), SortError>
    where
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let mut backup = self.create_backup()?;

        let result = self.run_passes(data, backup.as_file_mut(), &compare);
        let released = backup.close();

        match result {
            Ok(_) => released.map_err(|err| SortError::BackupRemove(err)),
            Err(err) => Err(err),
        }
    }

    fn create_backup(&self) -> Result<tempfile::NamedTempFile, SortError> {
        let backup = if let Some(tmp_dir) = &self.tmp_dir {
            tempfile::NamedTempFile::new_in(tmp_dir)
        } else {
            tempfile::NamedTempFile::new()
        }
        .map_err(|err| SortError::BackupCreate(err))?;

        log::info!("using {} as a temporary backup file", backup.path().display());

        return Ok(backup);
    }

    fn run_passes<S, F>(&self, data: &mut S, backup: &mut fs::File, compare: &F) -> Result<SortStats, SortError>
    where
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let mut buf = vec![0u8; self.fan_in * self.record_size];

        let total = self.sort_chunks(data, &mut buf, compare).map_err(SortError::Io)?;
        log::debug!("pass 0 done ({} records)", total);

        let mut stats = SortStats {
            total_records: total,
            merge_passes: 0,
        };

        // buffer-sized inputs are fully sorted after pass 0
        if total <= self.fan_in {
            return Ok(stats);
        }

        let mut io = RegionPair::new(data, backup, self.record_size);
        let mut input = Region::Primary;
        let mut segment_len = self.fan_in;

        while segment_len < total {
            self.merge_pass(&mut io, input, segment_len, total, &mut buf, compare)
                .map_err(SortError::Io)?;

            input = input.other();
            stats.merge_passes += 1;
            log::debug!("merge pass {} done (segment length {})", stats.merge_passes, segment_len);

            segment_len = segment_len.saturating_mul(self.fan_in);
        }

        if input == Region::Backup {
            // the last pass left the sorted result in the backup region
            io.copy_records(Region::Backup, 0, total, &mut buf).map_err(SortError::Io)?;
        }

        return Ok(stats);
    }

    /// Pass 0: reads consecutive chunks of up to `fan_in` records, sorts
    /// each chunk with the comparator and writes it back in place. Returns
    /// the total record count.
    fn sort_chunks<S, F>(&self, data: &mut S, buf: &mut [u8], compare: &F) -> io::Result<usize>
    where
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let record_size = self.record_size;

        data.seek(SeekFrom::Start(0))?;

        let mut total = 0;
        let mut chunk_start = 0;

        loop {
            let filled = read_fill(data, buf)?;
            let records = filled / record_size;

            if records > 0 {
                let mut order = Vec::from_iter(0..records);
                order.sort_by(|&a, &b| {
                    compare(
                        &buf[a * record_size..(a + 1) * record_size],
                        &buf[b * record_size..(b + 1) * record_size],
                    )
                });

                data.seek(SeekFrom::Start((chunk_start * record_size) as u64))?;
                for slot in order {
                    data.write_all(&buf[slot * record_size..(slot + 1) * record_size])?;
                }

                total += records;
                chunk_start += records;
            }

            // a partial fill means the end of the stream was reached;
            // trailing bytes short of a whole record stay untouched
            if filled < buf.len() {
                break;
            }
        }

        return Ok(total);
    }

    /// One merge pass: merges every consecutive group of up to `fan_in`
    /// runs of `segment_len` records from the `input` region into runs
    /// `fan_in` times as long in the opposite region.
    fn merge_pass<S, F>(
        &self,
        io: &mut RegionPair<S>,
        input: Region,
        segment_len: usize,
        total: usize,
        buf: &mut [u8],
        compare: &F,
    ) -> io::Result<()>
    where
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let group_span = segment_len.saturating_mul(self.fan_in);
        let mut group_start = 0;
        let mut runs = Vec::with_capacity(self.fan_in);

        while group_start < total {
            runs.clear();
            for i in 0..self.fan_in {
                let start = group_start + i * segment_len;
                if start >= total {
                    break;
                }
                runs.push((start, total.min(start + segment_len)));
            }

            if let [(start, end)] = runs[..] {
                // a lone trailing run has no merge partner and is already
                // sorted, copy it through verbatim
                io.copy_records(input, start, end - start, buf)?;
            } else {
                merger::merge_runs(io, input, &runs, group_start, self.record_size, compare)?;
            }

            group_start = group_start.saturating_add(group_span);
        }

        return Ok(());
    }
}

/// Reads from `reader` until `buf` is full or the stream is exhausted.
/// Returns the number of bytes read.
fn read_fill<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read,
{
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    return Ok(filled);
}

#[cfg(test)]
mod test {
    use std::io::{self, prelude::*, Cursor, SeekFrom};

    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, SortError};

    fn byte_compare(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn sorter(record_size: usize, fan_in: usize) -> ExternalSorter {
        ExternalSorterBuilder::new()
            .with_record_size(record_size)
            .with_fan_in(fan_in)
            .build()
            .unwrap()
    }

    #[rstest]
    fn test_invalid_record_size_rejected() {
        let result = ExternalSorterBuilder::new().with_record_size(0).with_fan_in(2).build();
        assert!(matches!(result, Err(SortError::InvalidRecordSize(0))));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_invalid_fan_in_rejected(#[case] fan_in: usize) {
        let result = ExternalSorterBuilder::new().with_record_size(8).with_fan_in(fan_in).build();
        assert!(matches!(result, Err(SortError::InvalidFanIn(_))));
    }

    #[rstest]
    fn test_fixed_width_decimal_records() {
        let mut data = Cursor::new(b"00000005000000020000000900000001".to_vec());

        sorter(8, 2).sort(&mut data).unwrap();

        assert_eq!(data.get_ref().as_slice(), b"00000001000000020000000500000009");
    }

    #[rstest]
    fn test_empty_stream() {
        let mut data = Cursor::new(Vec::new());

        sorter(8, 2).sort(&mut data).unwrap();

        assert!(data.get_ref().is_empty());
    }

    #[rstest]
    fn test_single_record() {
        let mut data = Cursor::new(b"00000042".to_vec());

        sorter(8, 2).sort(&mut data).unwrap();

        assert_eq!(data.get_ref().as_slice(), b"00000042");
    }

    #[rstest]
    fn test_entry_position_is_ignored() {
        let mut data = Cursor::new(b"badc".to_vec());
        data.seek(SeekFrom::End(0)).unwrap();

        sorter(1, 2).sort(&mut data).unwrap();

        assert_eq!(data.get_ref().as_slice(), b"abcd");
    }

    #[rstest]
    fn test_trailing_partial_record_preserved() {
        let mut data = Cursor::new(b"0504030201Z".to_vec());

        sorter(2, 2).sort(&mut data).unwrap();

        assert_eq!(data.get_ref().as_slice(), b"0102030405Z");
    }

    #[rstest]
    fn test_buffer_sized_input_skips_merge() {
        let mut data = Cursor::new(b"badc".to_vec());
        let mut backup = tempfile::NamedTempFile::new().unwrap();

        let stats = sorter(1, 4)
            .run_passes(&mut data, backup.as_file_mut(), &byte_compare)
            .unwrap();

        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.merge_passes, 0);
        assert_eq!(data.get_ref().as_slice(), b"abcd");
    }

    #[rstest]
    fn test_multi_pass_merge() {
        // 9 records with fan-in 2 take pass 0 plus 3 merge passes
        let mut data = Cursor::new(b"918273645".to_vec());
        let mut backup = tempfile::NamedTempFile::new().unwrap();

        let stats = sorter(1, 2)
            .run_passes(&mut data, backup.as_file_mut(), &byte_compare)
            .unwrap();

        assert_eq!(stats.merge_passes, 3);
        assert_eq!(data.get_ref().as_slice(), b"123456789");
    }

    #[rstest]
    fn test_reversed_comparator() {
        let mut data = Cursor::new(b"00000005000000020000000900000001".to_vec());

        sorter(8, 2)
            .sort_by(&mut data, |a, b| a.cmp(b).reverse())
            .unwrap();

        assert_eq!(data.get_ref().as_slice(), b"00000009000000050000000200000001");
    }

    #[rstest]
    fn test_idempotence() {
        let sorter = sorter(1, 3);

        let mut data = Cursor::new(b"3141592653589793".to_vec());
        sorter.sort(&mut data).unwrap();
        let once = data.get_ref().clone();

        sorter.sort(&mut data).unwrap();
        assert_eq!(data.get_ref(), &once);
    }

    #[rstest]
    fn test_randomized_inputs_sorted_permutation() {
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            let record_count = rng.gen_range(0..200);
            let fan_in = rng.gen_range(2..8);

            let mut records: Vec<[u8; 8]> = (0..record_count)
                .map(|_| {
                    let mut record = [0u8; 8];
                    let value: u32 = rng.gen_range(0..10_000);
                    record.copy_from_slice(format!("{:08}", value).as_bytes());
                    record
                })
                .collect();

            let mut data = Cursor::new(records.concat());
            sorter(8, fan_in).sort(&mut data).unwrap();

            // equality against a std-sorted copy checks the order and the
            // permutation invariant at once
            records.sort();
            assert_eq!(
                data.get_ref(),
                &records.concat(),
                "record_count={}, fan_in={}",
                record_count,
                fan_in
            );
        }
    }

    #[rstest]
    fn test_io_error_propagates() {
        let mut data = FlakyStream {
            inner: Cursor::new(b"86753099".to_vec()),
            writes_left: 3,
        };

        let result = sorter(1, 2).sort(&mut data);
        assert!(matches!(result, Err(SortError::Io(_))));
    }

    /// Stream stub failing after a fixed number of writes.
    struct FlakyStream {
        inner: Cursor<Vec<u8>>,
        writes_left: usize,
    }

    impl Read for FlakyStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for FlakyStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "write failed"));
            }
            self.writes_left -= 1;
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FlakyStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }
}
