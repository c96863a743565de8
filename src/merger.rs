//! Heap-driven n-way run merger.

use std::cmp::Ordering;
use std::io;
use std::io::prelude::*;

use crate::region::{Region, RegionPair};

/// A record pulled from one of the input runs, tagged with the run index so
/// the run can be advanced after the record is written out.
struct Entry {
    record: Vec<u8>,
    run: usize,
}

/// Binary min-heap over run entries, keyed by the injected comparator.
///
/// `std::collections::BinaryHeap` requires `Ord` items, which an opaque
/// byte record with a runtime comparator cannot provide, so the sift
/// routines are spelled out here. Capacity is fixed at the merge fan-in:
/// the heap never holds more than one entry per input run.
struct MergeHeap<'a, F> {
    entries: Vec<Entry>,
    compare: &'a F,
}

impl<'a, F> MergeHeap<'a, F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn with_capacity(capacity: usize, compare: &'a F) -> Self {
        MergeHeap {
            entries: Vec::with_capacity(capacity),
            compare,
        }
    }

    fn less(&self, i: usize, j: usize) -> bool {
        (self.compare)(&self.entries[i].record, &self.entries[j].record) == Ordering::Less
    }

    fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
        self.sift_up(self.entries.len() - 1);
    }

    fn pop(&mut self) -> Option<Entry> {
        let last = self.entries.pop()?;
        if self.entries.is_empty() {
            return Some(last);
        }

        let top = std::mem::replace(&mut self.entries[0], last);
        self.sift_down(0);

        return Some(top);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.entries.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            if left >= self.entries.len() {
                break;
            }

            let mut child = left;
            if left + 1 < self.entries.len() && self.less(left + 1, left) {
                child = left + 1;
            }

            if !self.less(child, idx) {
                break;
            }
            self.entries.swap(idx, child);
            idx = child;
        }
    }
}

/// Merges the sorted `runs` (record-offset ranges within the `input`
/// region) into one sorted run written sequentially to the opposite region
/// starting at `out_start`.
///
/// Holds one record per run in memory. Time complexity is *m* \* log(*n*)
/// where *m* is the total record count of the group and *n* the number of
/// runs. Equal records are emitted in whatever order the heap resolves
/// them; the merge is not stable.
pub(crate) fn merge_runs<S, F>(
    io: &mut RegionPair<S>,
    input: Region,
    runs: &[(usize, usize)],
    out_start: usize,
    record_size: usize,
    compare: &F,
) -> io::Result<()>
where
    S: Read + Write + Seek,
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    let mut heap = MergeHeap::with_capacity(runs.len(), compare);
    let mut cursors = Vec::with_capacity(runs.len());

    for (run, &(start, end)) in runs.iter().enumerate() {
        cursors.push(start);
        if start >= end {
            continue;
        }

        let mut record = vec![0u8; record_size];
        io.read_record(input, start, &mut record)?;
        cursors[run] = start + 1;
        heap.push(Entry { record, run });
    }

    let output = input.other();
    let mut out_pos = out_start;

    while let Some(mut entry) = heap.pop() {
        io.write_record(output, out_pos, &entry.record)?;
        out_pos += 1;

        let run = entry.run;
        if cursors[run] < runs[run].1 {
            // run not exhausted, refill the slot we just drained
            io.read_record(input, cursors[run], &mut entry.record)?;
            cursors[run] += 1;
            heap.push(entry);
        }
    }

    return Ok(());
}
