use std::sync::Arc;
use std::time::Instant;

/// Pixels as decoded by a stream collaborator, before the frame source stamps them.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub dims: (u32, u32),
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(dims: (u32, u32), data: Vec<u8>) -> Self {
        Self { dims, data }
    }
}

/// Immutable captured image. Shared read-only as `Arc<Frame>`.
#[derive(Debug)]
pub struct Frame {
    seq: u64,
    captured_at: Instant,
    dims: (u32, u32),
    data: Arc<[u8]>,
}

impl Frame {
    pub fn new(seq: u64, raw: RawFrame) -> Self {
        Self {
            seq,
            captured_at: Instant::now(),
            dims: raw.dims,
            data: raw.data.into(),
        }
    }

    /// Capture order, strictly increasing per source, starting at 1.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.dims
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
