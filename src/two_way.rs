//! Two-way in-memory merge sort.
//!
//! Minimal form of the external merge with the fan-in fixed at two and
//! plain arrays standing in for the external regions. A two-run merge is a
//! single comparison, so no heap is involved. It exists as a
//! trivially-auditable baseline for the general algorithm: same pass
//! structure, same role swap, same two-record internal buffer discipline.

use crate::region::Region;

/// Internal buffer capacity in records.
const BUF_LEN: usize = 2;

/// The primary array (caller-owned) and its same-length backup, addressed
/// through a region selector like the external variant.
struct Regions<'a> {
    primary: &'a mut [u64],
    backup: Vec<u64>,
}

impl Regions<'_> {
    fn slice(&self, region: Region) -> &[u64] {
        match region {
            Region::Primary => self.primary,
            Region::Backup => &self.backup,
        }
    }

    /// Copies records at `pos` into `buf`, clamped to the region end.
    fn read(&self, region: Region, pos: usize, buf: &mut [u64]) {
        let src = self.slice(region);
        let len = buf.len().min(src.len() - pos);
        buf[..len].copy_from_slice(&src[pos..pos + len]);
    }

    /// Copies `buf` to the records at `pos`, clamped to the region end.
    fn write(&mut self, region: Region, pos: usize, buf: &[u64]) {
        let dst = match region {
            Region::Primary => &mut *self.primary,
            Region::Backup => &mut self.backup,
        };
        let len = buf.len().min(dst.len() - pos);
        dst[pos..pos + len].copy_from_slice(&buf[..len]);
    }
}

/// Sorts `data` in place in ascending order, never holding more than two
/// records in the working buffer.
pub fn two_way_merge_sort(data: &mut [u64]) {
    sort_inner(data);
}

/// Self-verifying variant for test harnesses: sorts `data` in place and
/// returns whether the region holding the result was sorted before the
/// final copy-back.
pub fn two_way_merge_sort_verified(data: &mut [u64]) -> bool {
    sort_inner(data)
}

fn sort_inner(data: &mut [u64]) -> bool {
    let total = data.len();
    let backup = vec![0; total];
    let mut regions = Regions { primary: data, backup };
    let mut buf = [0u64; BUF_LEN];

    // pass 0: sort every full pair in place; a trailing odd record is a
    // sorted run of one already
    let mut offset = 0;
    while offset + BUF_LEN <= total {
        regions.read(Region::Primary, offset, &mut buf);
        if buf[1] < buf[0] {
            buf.swap(0, 1);
        }
        regions.write(Region::Primary, offset, &buf);
        offset += BUF_LEN;
    }

    if total <= BUF_LEN {
        return is_sorted(regions.slice(Region::Primary));
    }

    let mut input = Region::Primary;
    let mut segment_len = BUF_LEN;

    while segment_len < total {
        merge_pass(&mut regions, input, segment_len, total, &mut buf);
        input = input.other();
        segment_len <<= 1;
    }

    let sorted = is_sorted(regions.slice(input));

    if input == Region::Backup {
        let mut pos = 0;
        while pos < total {
            let len = BUF_LEN.min(total - pos);
            regions.read(Region::Backup, pos, &mut buf[..len]);
            regions.write(Region::Primary, pos, &buf[..len]);
            pos += len;
        }
    }

    return sorted;
}

/// Merges every adjacent pair of sorted runs of `segment_len` records from
/// the `input` region into the opposite region.
fn merge_pass(regions: &mut Regions, input: Region, segment_len: usize, total: usize, buf: &mut [u64; BUF_LEN]) {
    let output = input.other();

    let (mut offset1, mut offset2) = (0, segment_len);
    while offset2 < total {
        // [offset1, end1) is the left run, [offset2, end2) the right one;
        // the right run may be short
        let end1 = offset2;
        let end2 = total.min(offset2 + segment_len);

        // loaded[i] marks that buf[i] holds a record not yet written out
        let mut loaded = [false; BUF_LEN];
        let (mut i1, mut i2, mut out) = (offset1, offset2, offset1);

        while out < end2 {
            if !loaded[0] && i1 < end1 {
                regions.read(input, i1, &mut buf[0..1]);
                loaded[0] = true;
            }
            if !loaded[1] && i2 < end2 {
                regions.read(input, i2, &mut buf[1..2]);
                loaded[1] = true;
            }

            let take_left = if loaded[0] && loaded[1] {
                buf[0] < buf[1]
            } else {
                loaded[0]
            };

            if take_left {
                regions.write(output, out, &buf[0..1]);
                loaded[0] = false;
                i1 += 1;
            } else {
                regions.write(output, out, &buf[1..2]);
                loaded[1] = false;
                i2 += 1;
            }
            out += 1;
        }

        offset1 = end2;
        offset2 = end2 + segment_len;
    }

    // lone trailing run with no merge partner: already sorted, copy it
    // through one buffer-full at a time
    while offset1 < total {
        let len = BUF_LEN.min(total - offset1);
        regions.read(input, offset1, &mut buf[..len]);
        regions.write(output, offset1, &buf[..len]);
        offset1 += len;
    }
}

fn is_sorted(data: &[u64]) -> bool {
    data.windows(2).all(|pair| pair[0] <= pair[1])
}
