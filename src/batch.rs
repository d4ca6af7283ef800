use std::sync::Arc;

/// Shared handle to an immutable packet batch.
///
/// Fan-out clones the `Arc`, never the packets; the reference count is the
/// only cross-thread mutation a batch ever sees.
pub type BatchRef<P> = Arc<PacketBatch<P>>;

/// An immutable bundle of decoded packets.
///
/// Produced upstream (capture and decoding are out of scope here) and
/// released when the last report host finishes with it.
#[derive(Debug)]
pub struct PacketBatch<P> {
    packets: Vec<P>,
}

impl<P> PacketBatch<P> {
    pub fn new(packets: Vec<P>) -> Self {
        Self { packets }
    }

    /// Construct directly as a shared [`BatchRef`].
    pub fn shared(packets: Vec<P>) -> BatchRef<P> {
        Arc::new(Self::new(packets))
    }

    #[inline]
    pub fn packets(&self) -> &[P] {
        &self.packets
    }

    #[inline]
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
