use std::num::NonZeroUsize;

/// Half-open byte range `[offset, offset + length)` copied by one worker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

impl Segment {
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Splits `[0, total_size)` into `workers` contiguous segments.
///
/// The first `workers - 1` segments get `total_size / workers` bytes each and the last one
/// absorbs the remainder. When `workers > total_size` the leading segments are empty.
#[must_use]
pub fn partition(total_size: u64, workers: NonZeroUsize) -> Vec<Segment> {
    let count = workers.get() as u64;
    let base = total_size / count;
    let mut segments: Vec<Segment> = (0..count - 1)
        .map(|idx| Segment {
            offset: idx * base,
            length: base,
        })
        .collect();
    let last_offset = (count - 1) * base;
    segments.push(Segment {
        offset: last_offset,
        length: total_size - last_offset,
    });
    segments
}
