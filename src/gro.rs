/*!
# Generic Receive Offload

[`GroBatcher`] collects validated inbound packets between two explicit
flushes and merges runs of in-order TCP segments of one flow into a single
larger segment, so the stack processes one packet where it would otherwise
process many.

## Ordering

Packets are delivered in the order their batch entry was created. A segment
appended to an earlier entry of its flow is delivered with that entry, ahead
of unrelated packets enqueued after the entry but before the segment.
Bytes of a single flow are never reordered: each flow has at most one entry
open for appending, and any TCP packet of the flow that cannot be appended
takes its place (or, if it is no coalescing candidate at all, just closes it).

## Threading

A batcher is a plain single-owner value with `&mut self` methods. It has no
internal locking: coalescing depends on seeing segments in arrival order, so
exactly one inbound loop owns it. See [`GroInbound`](crate::GroInbound).
*/

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;

use crate::checksum::checksum;
use crate::endpoint::NetworkDispatcher;
use crate::offload::rx_checksum_offload;
use crate::packet::{PacketBuffer, Parsed, IPV4_MIN_HEADER_LEN, IPV6_HEADER_LEN};

/// Number of batch entries preallocated by a new batcher.
pub const IDEAL_BATCH_SIZE: usize = 128;

const TCP_H_MIN_LEN: usize = 20;
const TCP_FLAGS_OFFSET: usize = 13;

const TCP_FLAG_PSH: u8 = 0x08;
const TCP_FLAG_ACK: u8 = 0x10;

const IPV4_FLAG_MORE_FRAGMENTS: u8 = 0x20;
const IPV4_SRC_ADDR_OFFSET: usize = 12;
const IPV6_SRC_ADDR_OFFSET: usize = 8;

const IPPROTO_TCP: u8 = 6;

/// Identifies the TCP flow a segment belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct TcpFlowKey {
    src_addr: [u8; 16],
    dst_addr: [u8; 16],
    src_port: u16,
    dst_port: u16,
    is_v6: bool,
}

impl TcpFlowKey {
    fn new(pkt: &[u8], tcph_offset: usize, is_v6: bool) -> Self {
        let (src_at, addr_len) = if is_v6 {
            (IPV6_SRC_ADDR_OFFSET, 16)
        } else {
            (IPV4_SRC_ADDR_OFFSET, 4)
        };
        let mut key = TcpFlowKey {
            src_addr: [0; 16],
            dst_addr: [0; 16],
            src_port: BigEndian::read_u16(&pkt[tcph_offset..]),
            dst_port: BigEndian::read_u16(&pkt[tcph_offset + 2..]),
            is_v6,
        };
        key.src_addr[..addr_len].copy_from_slice(&pkt[src_at..src_at + addr_len]);
        key.dst_addr[..addr_len].copy_from_slice(&pkt[src_at + addr_len..src_at + 2 * addr_len]);
        key
    }
}

/// Header facts of a TCP packet, read once at enqueue time.
#[derive(Debug, Clone, Copy)]
struct TcpSegment {
    key: TcpFlowKey,
    iph_len: usize,
    tcph_len: usize,
    seq: u32,
    ack: u32,
    psh_set: bool,
    payload_len: usize,
    // may start or extend a coalesced entry
    candidate: bool,
}

/// Parses `pkt` as an unfragmented TCP packet.
///
/// Returns `None` for anything that is not one, in which case the packet
/// takes no part in flow tracking.
fn parse_tcp(pkt: &[u8]) -> Option<TcpSegment> {
    let (iph_len, is_v6, lengths_ok) = match pkt.first()? >> 4 {
        4 => {
            if pkt.len() < IPV4_MIN_HEADER_LEN || pkt[9] != IPPROTO_TCP {
                return None;
            }
            let ihl = ((pkt[0] & 0x0F) as usize) * 4;
            if ihl < IPV4_MIN_HEADER_LEN || pkt.len() < ihl {
                return None;
            }
            if pkt[6] & IPV4_FLAG_MORE_FRAGMENTS != 0 || pkt[6] & 0x1F != 0 || pkt[7] != 0 {
                return None;
            }
            let total_len = BigEndian::read_u16(&pkt[2..4]) as usize;
            // IPv4 options never coalesce
            (ihl, false, ihl == IPV4_MIN_HEADER_LEN && total_len == pkt.len())
        }
        6 => {
            // extension headers are not walked; they disqualify the packet
            if pkt.len() < IPV6_HEADER_LEN || pkt[6] != IPPROTO_TCP {
                return None;
            }
            let payload_len = BigEndian::read_u16(&pkt[4..6]) as usize;
            (IPV6_HEADER_LEN, true, payload_len + IPV6_HEADER_LEN == pkt.len())
        }
        _ => return None,
    };

    if pkt.len() < iph_len + TCP_H_MIN_LEN {
        return None;
    }
    let tcph_len = ((pkt[iph_len + 12] >> 4) as usize) * 4;
    if tcph_len < TCP_H_MIN_LEN || pkt.len() < iph_len + tcph_len {
        return None;
    }

    let flags = pkt[iph_len + TCP_FLAGS_OFFSET];
    let psh_set = flags == TCP_FLAG_ACK | TCP_FLAG_PSH;
    let payload_len = pkt.len() - iph_len - tcph_len;

    Some(TcpSegment {
        key: TcpFlowKey::new(pkt, iph_len, is_v6),
        iph_len,
        tcph_len,
        seq: BigEndian::read_u32(&pkt[iph_len + 4..]),
        ack: BigEndian::read_u32(&pkt[iph_len + 8..]),
        psh_set,
        payload_len,
        candidate: lengths_ok && (flags == TCP_FLAG_ACK || psh_set) && payload_len > 0,
    })
}

/// Returns true if the IP headers of `pkt_a` and `pkt_b` may be merged.
fn ip_headers_can_coalesce(pkt_a: &[u8], pkt_b: &[u8]) -> bool {
    if pkt_a.len() < 9 || pkt_b.len() < 9 {
        return false;
    }
    if pkt_a[0] >> 4 == 6 {
        // traffic class spans the low nibble of byte 0 and the high nibble of byte 1
        pkt_a[0] == pkt_b[0] && pkt_a[1] >> 4 == pkt_b[1] >> 4 && pkt_a[7] == pkt_b[7]
    } else {
        // ToS, DF/reserved bits and TTL
        pkt_a[1] == pkt_b[1] && pkt_a[6] >> 5 == pkt_b[6] >> 5 && pkt_a[8] == pkt_b[8]
    }
}

/// Coalescing state of an entry that heads a TCP run.
#[derive(Debug, Clone, Copy)]
struct TcpRun {
    iph_len: usize,
    tcph_len: usize,
    is_v6: bool,
    ack: u32,
    next_seq: u32,
    gso_size: usize,
    num_merged: usize,
    psh_set: bool,
    // a segment shorter than gso_size was appended; nothing may follow it
    short_tail: bool,
}

struct GroItem {
    pkt: PacketBuffer,
    merged: Option<BytesMut>,
    run: Option<TcpRun>,
}

impl GroItem {
    fn single(pkt: PacketBuffer) -> Self {
        GroItem {
            pkt,
            merged: None,
            run: None,
        }
    }

    fn tcp(pkt: PacketBuffer, seg: &TcpSegment) -> Self {
        GroItem {
            pkt,
            merged: None,
            run: Some(TcpRun {
                iph_len: seg.iph_len,
                tcph_len: seg.tcph_len,
                is_v6: seg.key.is_v6,
                ack: seg.ack,
                next_seq: seg.seq.wrapping_add(seg.payload_len as u32),
                gso_size: seg.payload_len,
                num_merged: 0,
                psh_set: seg.psh_set,
                short_tail: false,
            }),
        }
    }

    fn head(&self) -> &[u8] {
        match &self.merged {
            Some(buf) => &buf[..],
            None => self.pkt.as_slice(),
        }
    }

    /// Whether `pkt`, described by `seg`, can be appended to this entry.
    fn can_append(&self, seg: &TcpSegment, pkt: &[u8]) -> bool {
        let Some(run) = &self.run else {
            return false;
        };
        let head = self.head();
        if seg.tcph_len != run.tcph_len {
            return false;
        }
        if seg.tcph_len > TCP_H_MIN_LEN
            && pkt[seg.iph_len + TCP_H_MIN_LEN..seg.iph_len + seg.tcph_len]
                != head[run.iph_len + TCP_H_MIN_LEN..run.iph_len + run.tcph_len]
        {
            // unequal tcp options
            return false;
        }
        if !ip_headers_can_coalesce(pkt, head) {
            return false;
        }
        if seg.ack != run.ack || seg.seq != run.next_seq {
            return false;
        }
        if run.psh_set || run.short_tail {
            // PSH and a short segment may only end a run
            return false;
        }
        if seg.payload_len > run.gso_size {
            return false;
        }
        // the IPv6 length field excludes the fixed header
        let fixed = if run.is_v6 { IPV6_HEADER_LEN } else { 0 };
        head.len() + seg.payload_len - fixed <= u16::MAX as usize
    }

    fn append(&mut self, seg: &TcpSegment, pkt: &[u8]) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let first = &self.pkt;
        let merged = self
            .merged
            .get_or_insert_with(|| BytesMut::from(first.as_slice()));
        merged.extend_from_slice(&pkt[seg.iph_len + seg.tcph_len..]);
        if seg.psh_set {
            merged[run.iph_len + TCP_FLAGS_OFFSET] |= TCP_FLAG_PSH;
            run.psh_set = true;
        }
        if seg.payload_len < run.gso_size {
            run.short_tail = true;
        }
        run.next_seq = run.next_seq.wrapping_add(seg.payload_len as u32);
        run.num_merged += 1;
    }

    /// Produces the packet to deliver, fixing up IP lengths of a merged run.
    ///
    /// The TCP checksum of a merged run is left as the first segment's: the
    /// buffer is marked validated, so the stack does not look at it.
    fn finish(self) -> PacketBuffer {
        let (Some(mut buf), Some(run)) = (self.merged, self.run) else {
            return self.pkt;
        };
        if run.is_v6 {
            let payload_len = (buf.len() - IPV6_HEADER_LEN) as u16;
            BigEndian::write_u16(&mut buf[4..6], payload_len);
        } else {
            let total_len = buf.len() as u16;
            BigEndian::write_u16(&mut buf[2..4], total_len);
            buf[10] = 0;
            buf[11] = 0;
            let iph_csum = !checksum(&buf[..run.iph_len], 0);
            BigEndian::write_u16(&mut buf[10..12], iph_csum);
        }
        PacketBuffer::new_validated(self.pkt.network_protocol(), buf.freeze())
    }
}

/// Outcome of a [`GroBatcher::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Packets handed to the dispatcher.
    pub delivered: usize,
    /// Segments that were merged into another delivered packet.
    pub coalesced: usize,
}

/// Explicitly flushed TCP receive coalescing.
#[derive(Default)]
pub struct GroBatcher {
    items: Vec<GroItem>,
    open_by_flow: HashMap<TcpFlowKey, usize>,
}

impl GroBatcher {
    pub fn new() -> Self {
        GroBatcher {
            items: Vec::with_capacity(IDEAL_BATCH_SIZE),
            open_by_flow: HashMap::with_capacity(IDEAL_BATCH_SIZE),
        }
    }

    /// Validates `p` and adds it to the batch.
    ///
    /// A packet failing validation is dropped and `false` is returned.
    pub fn enqueue(&mut self, p: &Parsed<'_>) -> bool {
        match rx_checksum_offload(p) {
            Some(pkt) => {
                self.enqueue_validated(pkt);
                true
            }
            None => false,
        }
    }

    pub(crate) fn enqueue_validated(&mut self, pkt: PacketBuffer) {
        let Some(seg) = parse_tcp(pkt.as_slice()) else {
            self.items.push(GroItem::single(pkt));
            return;
        };
        if !seg.candidate {
            self.open_by_flow.remove(&seg.key);
            self.items.push(GroItem::single(pkt));
            return;
        }
        if let Some(&i) = self.open_by_flow.get(&seg.key) {
            let item = &mut self.items[i];
            if item.can_append(&seg, pkt.as_slice()) {
                item.append(&seg, pkt.as_slice());
                return;
            }
        }
        self.open_by_flow.insert(seg.key, self.items.len());
        self.items.push(GroItem::tcp(pkt, &seg));
    }

    /// Delivers every batched packet to `dispatcher` in batch order and
    /// empties the batcher.
    pub fn flush(&mut self, dispatcher: &dyn NetworkDispatcher) -> FlushStats {
        self.open_by_flow.clear();
        let mut stats = FlushStats::default();
        for item in self.items.drain(..) {
            stats.coalesced += item.run.map_or(0, |r| r.num_merged);
            let pkt = item.finish();
            dispatcher.deliver_network_packet(pkt.network_protocol(), &pkt);
            stats.delivered += 1;
        }
        stats
    }

    /// Drops every batched packet without delivering it, returning how many.
    pub fn discard(&mut self) -> usize {
        self.open_by_flow.clear();
        let n = self.items.len();
        self.items.clear();
        n
    }

    /// Number of packets a flush would deliver.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
