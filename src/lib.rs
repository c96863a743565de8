//! `ext-kmerge` is an external k-way merge sort for fixed-size records.
//!
//! External sorting handles datasets that do not fit into main memory. The
//! sorter works on a caller-provided seekable byte stream holding records
//! of a fixed width, keeping at most `n` records (the merge fan-in) in
//! memory at any time. A first pass sorts buffer-sized chunks in place;
//! the following passes merge groups of `n` sorted runs into runs `n`
//! times as long, double-buffering between the stream and a temporary
//! backup file, until a single run spans the whole dataset. For more
//! information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-kmerge` supports the following features:
//!
//! * **Record agnostic:**
//!   records are opaque byte sequences of a caller-specified width,
//!   ordered only through an injected comparator; their contents are never
//!   interpreted.
//! * **Bounded memory:**
//!   the internal buffer holds exactly `n` records; the merge heap keeps
//!   one record per active run, never more.
//! * **In-place result:**
//!   the sorted data always ends up in the caller's stream; the backup
//!   file is created before the first pass and removed on every exit path.
//!
//! A two-way in-memory variant ([`two_way_merge_sort`]) over `u64` arrays
//! is included as a trivially-auditable baseline of the same algorithm.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//!
//! use ext_kmerge::ExternalSorterBuilder;
//!
//! let mut data = Cursor::new(b"00000005000000020000000900000001".to_vec());
//!
//! let sorter = ExternalSorterBuilder::new()
//!     .with_record_size(8)
//!     .with_fan_in(2)
//!     .build()
//!     .unwrap();
//!
//! sorter.sort(&mut data).unwrap();
//!
//! assert_eq!(data.get_ref().as_slice(), b"00000001000000020000000500000009");
//! ```

pub mod sort;
pub mod two_way;

mod merger;
mod region;

pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, DEFAULT_FAN_IN};
pub use two_way::{two_way_merge_sort, two_way_merge_sort_verified};
