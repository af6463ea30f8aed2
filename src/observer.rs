/// Receives counts of packets the link dropped, coalesced or discarded.
///
/// The link never fails loudly on packet-level anomalies; this is where they
/// become visible. Implementations are called on the hot path from any
/// thread and should do little more than bump counters. Every method has a
/// no-op default.
pub trait LinkObserver: Send + Sync {
    /// `n` outbound packets were dropped because the queue was full or closed.
    fn outbound_dropped(&self, n: usize) {
        let _ = n;
    }

    /// An inbound packet failed checksum validation and was dropped.
    fn inbound_rejected(&self) {}

    /// A GRO flush merged `n` segments into packets they were appended to.
    fn gro_coalesced(&self, n: usize) {
        let _ = n;
    }

    /// `n` buffered GRO packets were discarded without delivery.
    fn gro_discarded(&self, n: usize) {
        let _ = n;
    }

    /// `n` queued outbound packets were released by a drain.
    fn drained(&self, n: usize) {
        let _ = n;
    }
}

/// The observer used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LinkObserver for NoopObserver {}
