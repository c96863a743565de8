//! Storage region selection.
//!
//! The sort double-buffers between the caller's stream (primary) and a
//! temporary backup file. Both are addressed in record units through a
//! single [`RegionPair`] so that pass code never duplicates read/write
//! logic per region.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::io::SeekFrom;

/// Selects one of the two storage regions the sort alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    /// The caller-owned stream holding the dataset.
    Primary,
    /// The temporary backup file owned by the in-flight sort.
    Backup,
}

impl Region {
    /// Returns the opposite region.
    pub(crate) fn other(self) -> Region {
        match self {
            Region::Primary => Region::Backup,
            Region::Backup => Region::Primary,
        }
    }
}

trait RecordStream: Read + Write + Seek {}

impl<T: Read + Write + Seek> RecordStream for T {}

/// Record-addressed access to the primary and backup regions.
pub(crate) struct RegionPair<'a, S> {
    primary: &'a mut S,
    backup: &'a mut fs::File,
    record_size: usize,
}

impl<'a, S> RegionPair<'a, S>
where
    S: Read + Write + Seek,
{
    pub(crate) fn new(primary: &'a mut S, backup: &'a mut fs::File, record_size: usize) -> Self {
        RegionPair {
            primary,
            backup,
            record_size,
        }
    }

    fn stream(&mut self, region: Region) -> &mut dyn RecordStream {
        match region {
            Region::Primary => &mut *self.primary,
            Region::Backup => &mut *self.backup,
        }
    }

    /// Reads the record at position `pos` (in records) into `record`.
    pub(crate) fn read_record(&mut self, region: Region, pos: usize, record: &mut [u8]) -> io::Result<()> {
        let offset = (pos * self.record_size) as u64;
        let stream = self.stream(region);
        stream.seek(SeekFrom::Start(offset))?;
        stream.read_exact(record)
    }

    /// Writes `record` at position `pos` (in records).
    pub(crate) fn write_record(&mut self, region: Region, pos: usize, record: &[u8]) -> io::Result<()> {
        let offset = (pos * self.record_size) as u64;
        let stream = self.stream(region);
        stream.seek(SeekFrom::Start(offset))?;
        stream.write_all(record)
    }

    /// Copies `count` records starting at position `start` from one region
    /// to the other, one buffer-full at a time. `buf` is the internal
    /// buffer; its length bounds how many records are in flight at once.
    pub(crate) fn copy_records(
        &mut self,
        from: Region,
        start: usize,
        count: usize,
        buf: &mut [u8],
    ) -> io::Result<()> {
        let buf_records = buf.len() / self.record_size;
        let mut pos = start;
        let end = start + count;

        while pos < end {
            let batch = buf_records.min(end - pos);
            let bytes = batch * self.record_size;

            self.read_record(from, pos, &mut buf[..bytes])?;
            self.write_record(from.other(), pos, &buf[..bytes])?;

            pos += batch;
        }

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, prelude::*, Cursor, SeekFrom};

    use rstest::*;

    use super::{Region, RegionPair};

    #[fixture]
    fn backup() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[rstest]
    fn test_read_write_record(mut backup: tempfile::NamedTempFile) {
        let mut primary = Cursor::new(b"aabbcc".to_vec());

        let mut io = RegionPair::new(&mut primary, backup.as_file_mut(), 2);

        let mut record = [0u8; 2];
        io.read_record(Region::Primary, 1, &mut record).unwrap();
        assert_eq!(&record, b"bb");

        io.write_record(Region::Backup, 0, &record).unwrap();
        io.read_record(Region::Backup, 0, &mut record).unwrap();
        assert_eq!(&record, b"bb");

        io.write_record(Region::Primary, 2, b"zz").unwrap();
        assert_eq!(primary.get_ref(), b"aabbzz");
    }

    #[rstest]
    fn test_copy_records_batches(mut backup: tempfile::NamedTempFile) {
        let mut primary = Cursor::new(b"0123456789".to_vec());

        let mut io = RegionPair::new(&mut primary, backup.as_file_mut(), 2);

        // buffer holds 2 records, copy of 5 records takes 3 batches
        let mut buf = [0u8; 4];
        io.copy_records(Region::Primary, 0, 5, &mut buf).unwrap();

        let mut copied = Vec::new();
        backup.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
        backup.as_file_mut().read_to_end(&mut copied).unwrap();
        assert_eq!(copied, b"0123456789");
    }

    #[rstest]
    fn test_read_past_end_fails(mut backup: tempfile::NamedTempFile) {
        let mut primary = Cursor::new(b"aabb".to_vec());

        let mut io = RegionPair::new(&mut primary, backup.as_file_mut(), 2);

        let mut record = [0u8; 2];
        let err = io.read_record(Region::Primary, 2, &mut record).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
