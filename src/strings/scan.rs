//! Null-terminated printable ASCII scanner.
//!
//! A candidate grows over bytes in `0x20..=0x7e`, is emitted when a NUL ends
//! it, and is thrown away by any other byte. Bytes after the last NUL in the
//! range never form a string.

/// Lowest and highest printable byte
const PRINTABLE: std::ops::RangeInclusive<u8> = 0x20..=0x7e;

#[inline]
fn is_printable(b: u8) -> bool {
    PRINTABLE.contains(&b)
}

/// Iterator over `(offset, bytes)` of every terminated run in `data` whose
/// length is at least `min_length`. Offsets are relative to `data`.
pub struct TerminatedRuns<'a> {
    data: &'a [u8],
    nuls: memchr::Memchr<'a>,
    segment_start: usize,
    min_length: usize,
    done: bool,
}

impl<'a> TerminatedRuns<'a> {
    pub fn new(data: &'a [u8], min_length: usize) -> Self {
        Self {
            data,
            nuls: memchr::memchr_iter(0, data),
            segment_start: 0,
            min_length: min_length.max(1),
            done: false,
        }
    }

    /// Next run, giving up once `limit` bytes have been consumed.
    /// `None` with [`is_done`](Self::is_done) false means the limit was hit.
    pub fn next_before(&mut self, limit: usize) -> Option<(usize, &'a [u8])> {
        for nul in self.nuls.by_ref() {
            let segment = &self.data[self.segment_start..nul];
            let base = self.segment_start;
            self.segment_start = nul + 1;

            // Only the printable suffix survives to the terminator
            let start = segment
                .iter()
                .rposition(|&b| !is_printable(b))
                .map_or(0, |p| p + 1);
            let run = &segment[start..];
            if run.len() >= self.min_length {
                return Some((base + start, run));
            }
            if self.segment_start >= limit {
                return None;
            }
        }
        self.done = true;
        None
    }

    /// No terminators left to visit.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.segment_start
    }
}

impl<'a> Iterator for TerminatedRuns<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_before(usize::MAX)
    }
}

/// Terminated runs, deduplicated by content in first-seen order.
pub fn scan_unique(data: &[u8], min_length: usize, max_results: Option<usize>) -> Vec<(usize, &[u8])> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for (offset, run) in TerminatedRuns::new(data, min_length) {
        if max_results.is_some_and(|cap| out.len() >= cap) {
            break;
        }
        if seen.insert(run) {
            out.push((offset, run));
        }
    }
    out
}
