use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;

use crate::error::Error;
use crate::gro::{FlushStats, GroBatcher};
use crate::interrupt::InterruptEvent;
use crate::observer::{LinkObserver, NoopObserver};
use crate::offload::rx_checksum_offload;
use crate::packet::{NetworkProtocol, PacketBuffer, Parsed};
use crate::queue::PacketQueue;

/// Largest packet the stack may hand over for segmentation offload.
pub const GSO_MAX_SIZE: u32 = (1 << 16) - 1;

bitflags::bitflags! {
    /// Offload and resolution capabilities a link declares to the stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LinkCapabilities: u32 {
        /// Inbound IPv4 header and TCP/UDP checksums are verified by the link.
        const RX_CHECKSUM_OFFLOAD = 1 << 0;
        /// Outbound checksums are filled in by the link.
        const TX_CHECKSUM_OFFLOAD = 1 << 1;
        /// The link needs neighbor resolution before sending.
        const RESOLUTION_REQUIRED = 1 << 2;
    }
}

/// Kind of segmentation offload the stack may use on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupportedGso {
    #[default]
    NotSupported,
    /// Outbound packets are segmented into fixed-size pieces downstream.
    Fixed,
    /// Outbound packets may carry a segment size of their own.
    Variable,
}

/// ARP hardware type of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpHardwareType {
    None,
    Ether,
    Loopback,
}

/// Link-layer address of an endpoint. Tunnels usually have none.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct LinkAddress(Bytes);

impl LinkAddress {
    pub fn new(addr: impl Into<Bytes>) -> Self {
        LinkAddress(addr.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<[u8; 6]> for LinkAddress {
    fn from(mac: [u8; 6]) -> Self {
        LinkAddress(Bytes::copy_from_slice(&mac))
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddress({self})")
    }
}

/// The stack's entry point for inbound packets.
///
/// Called from the inbound loop, possibly while the stack holds locks of its
/// own; implementations must not call back into the delivering endpoint's
/// `close`.
pub trait NetworkDispatcher: Send + Sync {
    fn deliver_network_packet(&self, protocol: NetworkProtocol, pkt: &PacketBuffer);
}

impl<F> NetworkDispatcher for F
where
    F: Fn(NetworkProtocol, &PacketBuffer) + Send + Sync,
{
    fn deliver_network_packet(&self, protocol: NetworkProtocol, pkt: &PacketBuffer) {
        self(protocol, pkt)
    }
}

struct LinkState {
    dispatcher: Option<Arc<dyn NetworkDispatcher>>,
    link_addr: LinkAddress,
    mtu: u32,
    closed: bool,
}

type OnClose = Box<dyn FnOnce() + Send>;

/// A raw-IP link between a tunnel device and an embedded network stack.
///
/// Outbound, the stack calls [`write_packets`](Self::write_packets) from any
/// number of threads and one device writer drains the bounded queue with
/// [`read`](Self::read) or [`read_interruptible`](Self::read_interruptible).
/// A full queue drops packets instead of blocking the stack.
///
/// Inbound, the device reader hands parsed packets to
/// [`inject_inbound`](Self::inject_inbound), or batches them through the
/// [`GroInbound`] handle obtained from [`gro_inbound`](Self::gro_inbound).
/// Every inbound packet is checksum-verified before delivery, which is why
/// the endpoint can advertise [`LinkCapabilities::RX_CHECKSUM_OFFLOAD`].
///
/// The endpoint goes from unattached to attached to closed. Closing is final
/// and idempotent.
pub struct LinkEndpoint {
    supported_gso: SupportedGso,
    state: RwLock<LinkState>,
    queue: PacketQueue,
    // parked batcher while no GroInbound handle is live
    gro: Mutex<Option<GroBatcher>>,
    observer: Arc<dyn LinkObserver>,
    on_close: Mutex<Option<OnClose>>,
}

impl LinkEndpoint {
    /// Creates an endpoint with an outbound queue of `size` packets.
    pub fn new(size: usize, mtu: u32, link_addr: LinkAddress) -> Self {
        Self::with_parts(
            size,
            mtu,
            link_addr,
            SupportedGso::NotSupported,
            Arc::new(NoopObserver),
        )
    }

    pub(crate) fn with_parts(
        size: usize,
        mtu: u32,
        link_addr: LinkAddress,
        supported_gso: SupportedGso,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        LinkEndpoint {
            supported_gso,
            state: RwLock::new(LinkState {
                dispatcher: None,
                link_addr,
                mtu,
                closed: false,
            }),
            queue: PacketQueue::new(size),
            gro: Mutex::new(Some(GroBatcher::new())),
            observer,
            on_close: Mutex::new(None),
        }
    }

    /// Binds the stack's dispatcher, replacing any previous one.
    ///
    /// Deliveries that capture the dispatcher after this returns use the new
    /// one. Attaching a closed endpoint is ignored.
    pub fn attach(&self, dispatcher: Arc<dyn NetworkDispatcher>) {
        let mut state = self.state.write().unwrap();
        if state.closed {
            log::warn!("attach on closed link endpoint ignored");
            return;
        }
        let replaced = state.dispatcher.replace(dispatcher).is_some();
        log::debug!("link endpoint attached, replaced={replaced}");
    }

    pub fn detach(&self) {
        if self.state.write().unwrap().dispatcher.take().is_some() {
            log::debug!("link endpoint detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state.read().unwrap().dispatcher.is_some()
    }

    fn dispatcher(&self) -> Option<Arc<dyn NetworkDispatcher>> {
        self.state.read().unwrap().dispatcher.clone()
    }

    pub fn mtu(&self) -> u32 {
        self.state.read().unwrap().mtu
    }

    pub fn set_mtu(&self, mtu: u32) {
        self.state.write().unwrap().mtu = mtu;
    }

    pub fn link_address(&self) -> LinkAddress {
        self.state.read().unwrap().link_addr.clone()
    }

    pub fn set_link_address(&self, addr: LinkAddress) {
        self.state.write().unwrap().link_addr = addr;
    }

    /// Always [`LinkCapabilities::RX_CHECKSUM_OFFLOAD`].
    pub fn capabilities(&self) -> LinkCapabilities {
        LinkCapabilities::RX_CHECKSUM_OFFLOAD
    }

    pub fn gso_max_size(&self) -> u32 {
        GSO_MAX_SIZE
    }

    pub fn supported_gso(&self) -> SupportedGso {
        self.supported_gso
    }

    /// Raw IP links carry no link-layer header.
    pub fn max_header_length(&self) -> u16 {
        0
    }

    pub fn arp_hardware_type(&self) -> ArpHardwareType {
        ArpHardwareType::None
    }

    pub fn add_header(&self, _pkt: &PacketBuffer) {}

    pub fn parse_header(&self, _pkt: &PacketBuffer) -> bool {
        true
    }

    /// The endpoint owns no threads, so there is nothing to wait for.
    pub fn wait(&self) {}

    /// Registers `action` to run once when the endpoint is first closed.
    ///
    /// Replaces a previously registered action. An action registered after
    /// the endpoint closed is never run.
    pub fn set_on_close_action<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_close.lock().unwrap() = Some(Box::new(action));
    }

    /// Queues a batch of outbound packets without blocking.
    ///
    /// Writing stops at the first packet the queue refuses; that packet and
    /// the rest of the batch are dropped. Returns the number of packets
    /// queued, or the refusal when not even the first packet was queued.
    pub fn write_packets<I>(&self, pkts: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = PacketBuffer>,
    {
        let mut pkts = pkts.into_iter();
        let mut n = 0;
        let mut refused = None;
        for pkt in pkts.by_ref() {
            if let Err(e) = self.queue.write(pkt) {
                refused = Some(e);
                break;
            }
            n += 1;
        }
        let Some(e) = refused else {
            return Ok(n);
        };
        let dropped = 1 + pkts.count();
        log::trace!("outbound queue refused {dropped} packets after {n}: {e}");
        self.observer.outbound_dropped(dropped);
        if n == 0 {
            Err(e)
        } else {
            Ok(n)
        }
    }

    /// Dequeues one outbound packet without blocking.
    pub fn read(&self) -> Option<PacketBuffer> {
        self.queue.read()
    }

    /// Dequeues one outbound packet, blocking until one is queued.
    ///
    /// See [`PacketQueue::read_interruptible`].
    pub fn read_interruptible(
        &self,
        event: &InterruptEvent,
        timeout: Option<Duration>,
    ) -> Option<PacketBuffer> {
        self.queue.read_interruptible(event, timeout)
    }

    #[cfg_attr(docsrs, doc(cfg(feature = "async_tokio")))]
    #[cfg(feature = "async_tokio")]
    pub async fn read_async(&self) -> Option<PacketBuffer> {
        self.queue.read_async().await
    }

    /// Releases every queued outbound packet, returning how many there were.
    pub fn drain(&self) -> usize {
        let n = self.queue.drain();
        if n > 0 {
            log::debug!("drained {n} outbound packets");
            self.observer.drained(n);
        }
        n
    }

    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }

    /// Verifies `p` and delivers it straight to the attached dispatcher.
    ///
    /// Returns `false` when the packet failed verification or no dispatcher
    /// is attached.
    pub fn inject_inbound(&self, p: &Parsed<'_>) -> bool {
        let Some(pkt) = rx_checksum_offload(p) else {
            log::trace!("dropping inbound packet with bad checksum from {}", p.src);
            self.observer.inbound_rejected();
            return false;
        };
        match self.dispatcher() {
            Some(d) => {
                d.deliver_network_packet(pkt.network_protocol(), &pkt);
                true
            }
            None => false,
        }
    }

    /// Hands out the endpoint's GRO batcher.
    ///
    /// Returns `None` while another handle is live or once the endpoint is
    /// closed.
    pub fn gro_inbound(self: &Arc<Self>) -> Option<GroInbound> {
        if self.is_closed() {
            return None;
        }
        let gro = self.gro.lock().unwrap().take()?;
        Some(GroInbound {
            endpoint: self.clone(),
            gro,
            _not_sync: PhantomData,
        })
    }

    /// Closes the endpoint, returning the number of outbound packets drained.
    ///
    /// Detaches the dispatcher and closes the outbound queue, which wakes
    /// blocked readers. Only the first call does anything.
    pub fn close(&self) -> usize {
        {
            let mut state = self.state.write().unwrap();
            if state.closed {
                return 0;
            }
            state.closed = true;
            state.dispatcher = None;
        }
        self.queue.close();
        if let Some(gro) = self.gro.lock().unwrap().as_mut() {
            self.discard_gro(gro);
        }
        let n = self.drain();
        let action = self.on_close.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
        log::debug!("link endpoint closed, {n} outbound packets drained");
        n
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().unwrap().closed
    }

    fn discard_gro(&self, gro: &mut GroBatcher) {
        let n = gro.discard();
        if n > 0 {
            log::warn!("link endpoint closed, discarding {n} buffered inbound packets");
            self.observer.gro_discarded(n);
        }
    }
}

impl fmt::Debug for LinkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("LinkEndpoint")
            .field("mtu", &state.mtu)
            .field("link_addr", &state.link_addr)
            .field("attached", &state.dispatcher.is_some())
            .field("closed", &state.closed)
            .field("supported_gso", &self.supported_gso)
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// The inbound side of a [`LinkEndpoint`], owned by one device-read loop.
///
/// Holds the endpoint's [`GroBatcher`]. The handle can be moved to the
/// thread running the loop but not shared, and at most one exists per
/// endpoint, so the batcher sees segments in arrival order without a lock.
///
/// Call [`flush_gro`](Self::flush_gro) once per read-loop iteration. Dropping
/// the handle flushes and returns the batcher to the endpoint.
pub struct GroInbound {
    endpoint: Arc<LinkEndpoint>,
    gro: GroBatcher,
    _not_sync: PhantomData<Cell<()>>,
}

impl GroInbound {
    pub fn endpoint(&self) -> &Arc<LinkEndpoint> {
        &self.endpoint
    }

    /// Delivers `p` immediately, bypassing the batch.
    ///
    /// The packet may reach the stack ahead of packets batched before it.
    pub fn inject_inbound(&self, p: &Parsed<'_>) -> bool {
        self.endpoint.inject_inbound(p)
    }

    /// Verifies `p` and adds it to the batch.
    ///
    /// Returns `false` when no dispatcher is attached or the packet failed
    /// verification; the packet is dropped either way.
    pub fn enqueue_gro(&mut self, p: &Parsed<'_>) -> bool {
        if !self.endpoint.is_attached() {
            return false;
        }
        if self.gro.enqueue(p) {
            return true;
        }
        log::trace!("dropping inbound packet with bad checksum from {}", p.src);
        self.endpoint.observer.inbound_rejected();
        false
    }

    /// Delivers the batch to the attached dispatcher.
    ///
    /// Without a dispatcher the batch is kept, unless the endpoint has been
    /// closed, in which case it is discarded.
    pub fn flush_gro(&mut self) -> FlushStats {
        if self.gro.is_empty() {
            return FlushStats::default();
        }
        let Some(d) = self.endpoint.dispatcher() else {
            if self.endpoint.is_closed() {
                self.endpoint.discard_gro(&mut self.gro);
            }
            return FlushStats::default();
        };
        let stats = self.gro.flush(d.as_ref());
        if stats.coalesced > 0 {
            self.endpoint.observer.gro_coalesced(stats.coalesced);
        }
        stats
    }

    /// Flushes the batch, then closes the endpoint.
    ///
    /// Returns the number of outbound packets drained by the close.
    pub fn close(mut self) -> usize {
        self.flush_gro();
        self.endpoint.close()
    }
}

impl Drop for GroInbound {
    fn drop(&mut self) {
        self.flush_gro();
        if self.endpoint.is_closed() {
            self.endpoint.discard_gro(&mut self.gro);
        }
        let gro = std::mem::take(&mut self.gro);
        *self.endpoint.gro.lock().unwrap() = Some(gro);
    }
}

impl fmt::Debug for GroInbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroInbound")
            .field("batched", &self.gro.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tcp4, udp4, Recorder, Seg};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const A: [u8; 4] = [10, 0, 0, 1];
    const B: [u8; 4] = [10, 0, 0, 2];

    fn pkt(tag: u8) -> PacketBuffer {
        PacketBuffer::new(NetworkProtocol::Ipv4, vec![tag; 20])
    }

    #[derive(Default)]
    struct Counts {
        dropped: AtomicUsize,
        rejected: AtomicUsize,
        coalesced: AtomicUsize,
        discarded: AtomicUsize,
        drained: AtomicUsize,
    }

    impl LinkObserver for Counts {
        fn outbound_dropped(&self, n: usize) {
            self.dropped.fetch_add(n, Ordering::SeqCst);
        }
        fn inbound_rejected(&self) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        fn gro_coalesced(&self, n: usize) {
            self.coalesced.fetch_add(n, Ordering::SeqCst);
        }
        fn gro_discarded(&self, n: usize) {
            self.discarded.fetch_add(n, Ordering::SeqCst);
        }
        fn drained(&self, n: usize) {
            self.drained.fetch_add(n, Ordering::SeqCst);
        }
    }

    fn observed(size: usize) -> (Arc<LinkEndpoint>, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let ep = LinkEndpoint::with_parts(
            size,
            1280,
            LinkAddress::empty(),
            SupportedGso::NotSupported,
            counts.clone(),
        );
        (Arc::new(ep), counts)
    }

    #[test]
    fn fixed_descriptors() {
        let ep = LinkEndpoint::new(4, 1500, LinkAddress::from([2, 0, 0, 0, 0, 1]));
        assert_eq!(ep.capabilities(), LinkCapabilities::RX_CHECKSUM_OFFLOAD);
        assert_eq!(ep.gso_max_size(), 65535);
        assert_eq!(ep.supported_gso(), SupportedGso::NotSupported);
        assert_eq!(ep.max_header_length(), 0);
        assert_eq!(ep.arp_hardware_type(), ArpHardwareType::None);
        assert_eq!(ep.link_address().to_string(), "02:00:00:00:00:01");
        assert!(ep.parse_header(&pkt(0)));
        ep.set_mtu(1400);
        assert_eq!(ep.mtu(), 1400);
        ep.set_link_address(LinkAddress::empty());
        assert!(ep.link_address().is_empty());
    }

    #[test]
    fn write_packets_stops_at_first_refusal() {
        let (ep, counts) = observed(3);
        assert_eq!(ep.write_packets((0..5).map(pkt)), Ok(3));
        assert_eq!(counts.dropped.load(Ordering::SeqCst), 2);
        assert_eq!(ep.write_packets([pkt(9)]), Err(Error::NoBufferSpace));
        assert_eq!(ep.num_queued(), 3);
        for i in 0..3 {
            assert_eq!(ep.read().unwrap().as_slice()[0], i);
        }
        assert_eq!(ep.write_packets(Vec::new()), Ok(0));
    }

    #[test]
    fn write_after_close_fails_closed() {
        let (ep, counts) = observed(1);
        ep.write_packets([pkt(0)]).unwrap();
        assert_eq!(ep.close(), 1);
        assert_eq!(counts.drained.load(Ordering::SeqCst), 1);
        assert_eq!(ep.write_packets([pkt(1), pkt(2)]), Err(Error::ClosedForSend));
        assert_eq!(counts.dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_is_idempotent_and_runs_action_once() {
        let ep = LinkEndpoint::new(4, 1280, LinkAddress::empty());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        ep.set_on_close_action(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        ep.attach(Arc::new(Recorder::default()));
        let held = pkt(1);
        ep.write_packets([held.clone()]).unwrap();
        assert_eq!(ep.close(), 1);
        assert_eq!(ep.close(), 0);
        assert_eq!(ep.close(), 0);
        assert_eq!(held.ref_count(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(ep.is_closed());
        assert!(!ep.is_attached());
        ep.attach(Arc::new(Recorder::default()));
        assert!(!ep.is_attached());
    }

    #[test]
    fn inject_inbound_needs_dispatcher_and_valid_packet() {
        let (ep, counts) = observed(4);
        let good = udp4(A, B, b"hello");
        assert!(!ep.inject_inbound(&Parsed::decode(&good).unwrap()));

        let rec = Arc::new(Recorder::default());
        ep.attach(rec.clone());
        assert!(ep.inject_inbound(&Parsed::decode(&good).unwrap()));
        let mut bad = good.clone();
        bad[good.len() - 1] ^= 0xff;
        assert!(!ep.inject_inbound(&Parsed::decode(&bad).unwrap()));
        assert_eq!(counts.rejected.load(Ordering::SeqCst), 1);

        let got = rec.got.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, NetworkProtocol::Ipv4);
        assert!(got[0].1.rx_checksum_validated());
        // the dispatcher holds the only reference left
        assert_eq!(got[0].1.ref_count(), 1);
    }

    #[test]
    fn reattach_switches_dispatcher() {
        let ep = LinkEndpoint::new(4, 1280, LinkAddress::empty());
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let good = udp4(A, B, b"x");
        ep.attach(first.clone());
        ep.inject_inbound(&Parsed::decode(&good).unwrap());
        ep.attach(second.clone());
        ep.inject_inbound(&Parsed::decode(&good).unwrap());
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        ep.detach();
        assert!(!ep.is_attached());
    }

    #[test]
    fn gro_handle_is_exclusive() {
        let ep = Arc::new(LinkEndpoint::new(4, 1280, LinkAddress::empty()));
        let h = ep.gro_inbound().unwrap();
        assert!(ep.gro_inbound().is_none());
        drop(h);
        let h = ep.gro_inbound().unwrap();
        drop(h);
        ep.close();
        assert!(ep.gro_inbound().is_none());
    }

    #[test]
    fn gro_enqueue_and_flush() {
        let (ep, counts) = observed(4);
        let mut h = ep.gro_inbound().unwrap();
        let seg = tcp4(A, B, Seg::ack(0), &[1; 10]);
        assert!(!h.enqueue_gro(&Parsed::decode(&seg).unwrap()));
        assert_eq!(h.flush_gro(), FlushStats::default());

        let rec = Arc::new(Recorder::default());
        ep.attach(rec.clone());
        assert!(h.enqueue_gro(&Parsed::decode(&seg).unwrap()));
        let next = tcp4(A, B, Seg::ack(10), &[2; 10]);
        assert!(h.enqueue_gro(&Parsed::decode(&next).unwrap()));
        let mut bad = udp4(A, B, b"y");
        bad[12] ^= 1;
        assert!(!h.enqueue_gro(&Parsed::decode(&bad).unwrap()));
        assert_eq!(rec.count(), 0);

        let stats = h.flush_gro();
        assert_eq!(stats.delivered, 1);
        assert_eq!(rec.payloads()[0].len(), 60);
        assert_eq!(counts.coalesced.load(Ordering::SeqCst), 1);
        assert_eq!(counts.rejected.load(Ordering::SeqCst), 1);
        assert_eq!(h.flush_gro().delivered, 0);
    }

    #[test]
    fn dropping_handle_flushes() {
        let ep = Arc::new(LinkEndpoint::new(4, 1280, LinkAddress::empty()));
        let rec = Arc::new(Recorder::default());
        ep.attach(rec.clone());
        let mut h = ep.gro_inbound().unwrap();
        h.enqueue_gro(&Parsed::decode(&udp4(A, B, b"z")).unwrap());
        drop(h);
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn handle_close_flushes_before_closing() {
        let ep = Arc::new(LinkEndpoint::new(4, 1280, LinkAddress::empty()));
        let rec = Arc::new(Recorder::default());
        ep.attach(rec.clone());
        let mut h = ep.gro_inbound().unwrap();
        h.enqueue_gro(&Parsed::decode(&udp4(A, B, b"z")).unwrap());
        h.close();
        assert_eq!(rec.count(), 1);
        assert!(ep.is_closed());
    }

    #[test]
    fn close_underneath_handle_discards_batch() {
        let (ep, counts) = observed(4);
        let rec = Arc::new(Recorder::default());
        ep.attach(rec.clone());
        let mut h = ep.gro_inbound().unwrap();
        h.enqueue_gro(&Parsed::decode(&udp4(A, B, b"1")).unwrap());
        h.enqueue_gro(&Parsed::decode(&udp4(A, B, b"2")).unwrap());
        ep.close();
        assert_eq!(h.flush_gro(), FlushStats::default());
        assert_eq!(rec.count(), 0);
        assert_eq!(counts.discarded.load(Ordering::SeqCst), 2);
        drop(h);
        assert_eq!(counts.discarded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closure_dispatcher() {
        let ep = LinkEndpoint::new(1, 1280, LinkAddress::empty());
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        ep.attach(Arc::new(move |proto: NetworkProtocol, p: &PacketBuffer| {
            assert_eq!(proto, NetworkProtocol::Ipv4);
            s.fetch_add(p.len(), Ordering::SeqCst);
        }));
        let good = udp4(A, B, b"abc");
        assert!(ep.inject_inbound(&Parsed::decode(&good).unwrap()));
        assert_eq!(seen.load(Ordering::SeqCst), good.len());
    }
}
