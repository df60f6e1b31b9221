//! Segmented virtual address space
//!
//! The mapper owns the contiguous address line shared by the compiler and
//! the VM. Segments are configured in order through the builder; within a
//! segment each cell type gets its own sub-range with an allocation
//! cursor. Addresses are plain integers, so the reverse mapping
//! ([`MemoryMapper::resolve`]) is the only place type information can be
//! recovered from an address.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::semantics::types::{Addr, Segment, SegmentSizes, ValueType};

/// Half-open address range `[min, max)` with an allocation cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TypeRange {
    min: i32,
    max: i32,
    curr: i32,
}

impl TypeRange {
    fn new(min: i32, cells: usize) -> Self {
        TypeRange {
            min,
            max: min + cells as i32,
            curr: min,
        }
    }

    fn contains(&self, addr: Addr) -> bool {
        addr.0 >= self.min && addr.0 < self.max
    }

    fn used(&self) -> usize {
        (self.curr - self.min) as usize
    }
}

/// One segment's sub-ranges, in [`ValueType::ALL`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SegmentLayout {
    segment: Segment,
    ranges: Vec<(ValueType, TypeRange)>,
}

impl SegmentLayout {
    fn range(&self, vt: ValueType) -> &TypeRange {
        // ranges always holds all five types
        &self.ranges.iter().find(|(t, _)| *t == vt).unwrap().1
    }

    fn range_mut(&mut self, vt: ValueType) -> &mut TypeRange {
        &mut self.ranges.iter_mut().find(|(t, _)| *t == vt).unwrap().1
    }
}

/// Builder for a [`MemoryMapper`]
///
/// Segments are laid out back to back in the order they are added, each
/// type sub-range immediately following the previous one, so ranges can
/// never overlap; adding the same segment twice is rejected.
#[derive(Debug, Default)]
pub struct MemoryMapperBuilder {
    next: i32,
    segments: Vec<SegmentLayout>,
}

impl MemoryMapperBuilder {
    /// Adds a segment with the same capacity for every cell type
    pub fn segment(self, segment: Segment, cells_per_type: usize) -> Result<Self> {
        self.segment_with(segment, SegmentSizes::uniform(cells_per_type))
    }

    /// Adds a segment with per-type capacities
    pub fn segment_with(mut self, segment: Segment, sizes: SegmentSizes) -> Result<Self> {
        if self.segments.iter().any(|s| s.segment == segment) {
            return Err(Error::OverlappingSegments {
                segment: segment.to_string(),
            });
        }

        let mut ranges = Vec::with_capacity(ValueType::ALL.len());
        for vt in ValueType::ALL {
            let range = TypeRange::new(self.next, sizes.get(vt));
            self.next = range.max;
            ranges.push((vt, range));
        }

        self.segments.push(SegmentLayout { segment, ranges });
        Ok(self)
    }

    /// Freezes the layout
    pub fn build(self) -> MemoryMapper {
        MemoryMapper {
            segments: self.segments,
        }
    }
}

/// Virtual address layout and allocation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMapper {
    segments: Vec<SegmentLayout>,
}

impl MemoryMapper {
    /// Starts an empty layout
    pub fn builder() -> MemoryMapperBuilder {
        MemoryMapperBuilder::default()
    }

    /// Sample layout: global, local, temporal, constant, 1000 cells per
    /// type per segment
    pub fn default_layout() -> Result<Self> {
        Ok(Self::builder()
            .segment(Segment::Global, 1000)?
            .segment(Segment::Local, 1000)?
            .segment(Segment::Temporal, 1000)?
            .segment(Segment::Constant, 1000)?
            .build())
    }

    fn layout(&self, segment: Segment) -> Result<&SegmentLayout> {
        self.segments
            .iter()
            .find(|s| s.segment == segment)
            .ok_or_else(|| Error::address(format!("segment {} is not configured", segment)))
    }

    fn layout_mut(&mut self, segment: Segment) -> Result<&mut SegmentLayout> {
        self.segments
            .iter_mut()
            .find(|s| s.segment == segment)
            .ok_or_else(|| Error::address(format!("segment {} is not configured", segment)))
    }

    /// Hands out the next free address for a type within a segment
    pub fn allocate(&mut self, vt: ValueType, segment: Segment) -> Result<Addr> {
        let range = self.layout_mut(segment)?.range_mut(vt);
        if range.curr >= range.max {
            return Err(Error::OutOfMemory {
                segment: segment.to_string(),
                value_type: vt.to_string(),
            });
        }

        let addr = Addr(range.curr);
        range.curr += 1;
        trace!(segment = %segment, value_type = %vt, addr = addr.0, "allocated address");
        Ok(addr)
    }

    /// Reserves `count` consecutive cells without handing them out one by
    /// one; used for array and matrix backing storage
    pub fn bulk_advance(&mut self, vt: ValueType, segment: Segment, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidAllocation);
        }

        let range = self.layout_mut(segment)?.range_mut(vt);
        if range.curr + count as i32 > range.max {
            return Err(Error::OutOfMemory {
                segment: segment.to_string(),
                value_type: vt.to_string(),
            });
        }

        range.curr += count as i32;
        Ok(())
    }

    /// Cells consumed so far for each type of a segment
    pub fn size_of(&self, segment: Segment) -> Result<SegmentSizes> {
        let layout = self.layout(segment)?;
        let mut sizes = SegmentSizes::default();
        for (vt, range) in &layout.ranges {
            sizes.set(*vt, range.used());
        }
        Ok(sizes)
    }

    /// Rewinds every cursor of a segment to the start of its range
    ///
    /// Called when a function body ends so the next body reuses the
    /// local and temporal ranges; addresses stay meaningful per frame
    /// because each activation record carries its own store.
    pub fn reset(&mut self, segment: Segment) -> Result<()> {
        let layout = self.layout_mut(segment)?;
        for (_, range) in layout.ranges.iter_mut() {
            range.curr = range.min;
        }
        Ok(())
    }

    /// Maps an address back to the segment and type that own it
    pub fn resolve(&self, addr: Addr) -> Result<(Segment, ValueType)> {
        for layout in &self.segments {
            for (vt, range) in &layout.ranges {
                if range.contains(addr) {
                    return Ok((layout.segment, *vt));
                }
            }
        }
        Err(Error::OutOfRange { address: addr.0 })
    }

    /// Offset of an address inside its type sub-range
    pub fn context_offset(&self, addr: Addr) -> Result<usize> {
        let (segment, vt) = self.resolve(addr)?;
        let range = self.layout(segment)?.range(vt);
        Ok((addr.0 - range.min) as usize)
    }
}
