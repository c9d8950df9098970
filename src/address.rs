use core::ops::{Bound, Range, RangeBounds};

use crate::PAGE_SIZE;

/// A contiguous run of bytes inside one page of one chip
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Index of the chip select of the chip
    pub chip: usize,
    /// Offset inside the chip
    pub offset: u32,
    /// Number of bytes before the end of the request or the next page
    pub len: usize,
}

/// Largest chip the 24 bit addresses of the instruction set can reach
pub const MAX_CHIP_SIZE: u32 = 0x100_0000;

/// Layout of the array, `chips` identical chips of `chip_size` bytes placed one after the other
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    chip_size: u32,
    chips: usize,
    capacity: u32,
}

impl Geometry {
    /// Returns `None` unless the chip size is a non zero multiple of [`PAGE_SIZE`] no larger
    /// than [`MAX_CHIP_SIZE`] and the whole array, with at least one chip, fits in an `u32`.
    pub const fn new(chip_size: u32, chips: usize) -> Option<Self> {
        if chip_size == 0 || chip_size % PAGE_SIZE != 0 || chip_size > MAX_CHIP_SIZE {
            return None;
        }
        if chips == 0 || chips > u32::MAX as usize {
            return None;
        }
        match chip_size.checked_mul(chips as u32) {
            Some(capacity) => Some(Self {
                chip_size,
                chips,
                capacity,
            }),
            None => None,
        }
    }

    pub const fn chip_size(&self) -> u32 {
        self.chip_size
    }

    pub const fn chips(&self) -> usize {
        self.chips
    }

    /// Total size of the array in bytes
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Find the chip holding `addr` and how many of the `len` bytes can be transferred
    /// in one burst from there. Returns `None` if `addr` is outside the array.
    pub fn translate(&self, addr: u32, len: usize) -> Option<Segment> {
        if addr >= self.capacity() {
            return None;
        }
        let chip = (addr / self.chip_size) as usize;
        let offset = addr % self.chip_size;
        let next_page = (offset & !(PAGE_SIZE - 1)) + PAGE_SIZE;
        let available = (next_page - offset) as usize;
        Some(Segment {
            chip,
            offset,
            len: len.min(available),
        })
    }

    /// Split `len` bytes starting at `addr` into page bounded segments.
    /// Returns `None` if any byte of the range is outside the array.
    pub fn segments(&self, addr: u32, len: usize) -> Option<Segments> {
        let len_u32 = u32::try_from(len).ok()?;
        let end = addr.checked_add(len_u32)?;
        if end > self.capacity() {
            return None;
        }
        Some(Segments {
            geometry: *self,
            addr,
            remaining: len,
        })
    }
}

/// Iterator over the segments of a transfer, in increasing address order
#[derive(Debug, Clone)]
pub struct Segments {
    geometry: Geometry,
    addr: u32,
    remaining: usize,
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.remaining == 0 {
            return None;
        }
        let segment = self.geometry.translate(self.addr, self.remaining)?;
        self.addr += segment.len as u32;
        self.remaining -= segment.len;
        Some(segment)
    }
}

/// Resolve a range over an array of `capacity` bytes.
///
/// An unbounded start is `0`, an unbounded end is `capacity` and negative bounds count
/// from the end of the array, so `-10..` covers the last ten bytes. Returns `None` when
/// the resolved range does not fit in the array or ends before it starts.
pub fn normalize_range<R: RangeBounds<i64>>(range: R, capacity: u32) -> Option<Range<u32>> {
    let capacity = i64::from(capacity);
    let wrap = |idx: i64| if idx < 0 { capacity + idx } else { idx };

    let start = match range.start_bound() {
        Bound::Included(&idx) => wrap(idx),
        Bound::Excluded(&idx) => wrap(idx).checked_add(1)?,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&idx) => wrap(idx).checked_add(1)?,
        Bound::Excluded(&idx) => wrap(idx),
        Bound::Unbounded => capacity,
    };

    if start < 0 || end > capacity || start > end {
        return None;
    }
    Some(start as u32..end as u32)
}
