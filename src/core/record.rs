//! Record formatting and the fixed-capacity staging buffer.
//!
//! Records are CSV rows `t,gx,gy,gz,ax,ay,az` with the timestamp in integer
//! microseconds, gyro at 3 decimals and accel at 4 decimals. Each record is
//! rendered into a stack buffer of [`MAX_RECORD_LEN`] bytes and then copied
//! into [`RecordBuffer`], which is allocated once and never grows.

use crate::sensor::types::Sample;
use std::io::Write;

/// Upper bound on a single formatted record, newline included.
///
/// Records that would not fit are rejected by [`format_record`]. The buffer's
/// low-water mark must be at least this large.
pub const MAX_RECORD_LEN: usize = 80;

/// Render `sample` as one CSV row into `out`.
///
/// Returns the number of bytes written, or `None` if the sample has
/// non-finite values or the row does not fit.
pub fn format_record(sample: &Sample, out: &mut [u8]) -> Option<usize> {
    if !sample.gyro.is_finite() || !sample.accel.is_finite() {
        return None;
    }

    let capacity = out.len();
    let mut cursor = &mut out[..];
    writeln!(
        cursor,
        "{},{:.3},{:.3},{:.3},{:.4},{:.4},{:.4}",
        sample.timestamp_us,
        sample.gyro.x,
        sample.gyro.y,
        sample.gyro.z,
        sample.accel.x,
        sample.accel.y,
        sample.accel.z
    )
    .ok()?;

    Some(capacity - cursor.len())
}

/// Returned when an append is refused because the buffer is near full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOverflow {
    pub remaining: usize,
    pub requested: usize,
}

impl std::fmt::Display for BufferOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record buffer near full ({} bytes left, {} requested)",
            self.remaining, self.requested
        )
    }
}

impl std::error::Error for BufferOverflow {}

/// Fixed-capacity byte staging area for formatted records.
///
/// Invariant: `write_offset <= capacity`. Owned by the main context only.
#[derive(Debug)]
pub struct RecordBuffer {
    storage: Box<[u8]>,
    write_offset: usize,
    low_water: usize,
}

impl RecordBuffer {
    /// Allocate a buffer of `capacity` bytes that refuses appends once fewer
    /// than `low_water` bytes remain.
    pub fn new(capacity: usize, low_water: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            write_offset: 0,
            low_water: low_water.min(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes currently staged.
    pub fn len(&self) -> usize {
        self.write_offset
    }

    pub fn is_empty(&self) -> bool {
        self.write_offset == 0
    }

    pub fn remaining(&self) -> usize {
        self.storage.len() - self.write_offset
    }

    pub fn low_water(&self) -> usize {
        self.low_water
    }

    /// True once the remaining space is below the low-water mark.
    pub fn is_near_full(&self) -> bool {
        self.remaining() < self.low_water
    }

    /// Append one complete record.
    ///
    /// Refused once the buffer is near full, so a record never straddles a
    /// flush boundary. The caller must flush and retry.
    pub fn append(&mut self, record: &[u8]) -> Result<(), BufferOverflow> {
        if self.is_near_full() || record.len() > self.remaining() {
            return Err(BufferOverflow {
                remaining: self.remaining(),
                requested: record.len(),
            });
        }

        let end = self.write_offset + record.len();
        self.storage[self.write_offset..end].copy_from_slice(record);
        self.write_offset = end;
        Ok(())
    }

    /// Hand the filled region to the writer and reset the offset.
    pub fn take_and_clear(&mut self) -> &[u8] {
        let len = std::mem::take(&mut self.write_offset);
        &self.storage[..len]
    }

    /// Drop any staged bytes.
    pub fn clear(&mut self) {
        self.write_offset = 0;
    }
}
