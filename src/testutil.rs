//! Packet builders and a recording dispatcher for unit tests.

use std::sync::Mutex;

use byteorder::{BigEndian, ByteOrder};

use crate::checksum::{checksum, pseudo_header_checksum_no_fold};
use crate::endpoint::NetworkDispatcher;
use crate::packet::{NetworkProtocol, PacketBuffer};

pub(crate) const TCP_ACK: u8 = 0x10;
pub(crate) const TCP_PSH: u8 = 0x08;
pub(crate) const TCP_FIN: u8 = 0x01;

fn ipv4_header(pkt: &mut [u8], proto: u8, src: [u8; 4], dst: [u8; 4]) {
    let total = pkt.len() as u16;
    pkt[0] = 0x45;
    BigEndian::write_u16(&mut pkt[2..4], total);
    pkt[6] = 0x40; // DF
    pkt[8] = 64;
    pkt[9] = proto;
    pkt[12..16].copy_from_slice(&src);
    pkt[16..20].copy_from_slice(&dst);
    let csum = !checksum(&pkt[..20], 0);
    BigEndian::write_u16(&mut pkt[10..12], csum);
}

fn ipv6_header(pkt: &mut [u8], proto: u8, src: [u8; 16], dst: [u8; 16]) {
    let payload = (pkt.len() - 40) as u16;
    pkt[0] = 0x60;
    BigEndian::write_u16(&mut pkt[4..6], payload);
    pkt[6] = proto;
    pkt[7] = 64;
    pkt[8..24].copy_from_slice(&src);
    pkt[24..40].copy_from_slice(&dst);
}

fn finish_transport(pkt: &mut [u8], iph_len: usize, proto: u8, csum_at: usize, src: &[u8], dst: &[u8]) {
    let seg_len = (pkt.len() - iph_len) as u16;
    let psum = pseudo_header_checksum_no_fold(proto, src, dst, seg_len);
    let csum = !checksum(&pkt[iph_len..], psum);
    BigEndian::write_u16(&mut pkt[iph_len + csum_at..iph_len + csum_at + 2], csum);
}

pub(crate) fn udp4(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; 28 + payload.len()];
    ipv4_header(&mut pkt, 17, src, dst);
    BigEndian::write_u16(&mut pkt[20..22], 4000);
    BigEndian::write_u16(&mut pkt[22..24], 53);
    BigEndian::write_u16(&mut pkt[24..26], (8 + payload.len()) as u16);
    pkt[28..].copy_from_slice(payload);
    finish_transport(&mut pkt, 20, 17, 6, &src, &dst);
    pkt
}

/// Header fields of a test TCP segment.
#[derive(Clone, Copy)]
pub(crate) struct Seg {
    pub sport: u16,
    pub dport: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
}

impl Seg {
    pub(crate) fn ack(seq: u32) -> Self {
        Seg {
            sport: 40000,
            dport: 443,
            seq,
            ack: 1,
            flags: TCP_ACK,
        }
    }
}

fn tcp_header(pkt: &mut [u8], at: usize, seg: Seg) {
    BigEndian::write_u16(&mut pkt[at..at + 2], seg.sport);
    BigEndian::write_u16(&mut pkt[at + 2..at + 4], seg.dport);
    BigEndian::write_u32(&mut pkt[at + 4..at + 8], seg.seq);
    BigEndian::write_u32(&mut pkt[at + 8..at + 12], seg.ack);
    pkt[at + 12] = 5 << 4;
    pkt[at + 13] = seg.flags;
    BigEndian::write_u16(&mut pkt[at + 14..at + 16], 65535);
}

pub(crate) fn tcp4(src: [u8; 4], dst: [u8; 4], seg: Seg, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; 40 + payload.len()];
    ipv4_header(&mut pkt, 6, src, dst);
    tcp_header(&mut pkt, 20, seg);
    pkt[40..].copy_from_slice(payload);
    finish_transport(&mut pkt, 20, 6, 16, &src, &dst);
    pkt
}

pub(crate) fn tcp6(src: [u8; 16], dst: [u8; 16], seg: Seg, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; 60 + payload.len()];
    ipv6_header(&mut pkt, 6, src, dst);
    tcp_header(&mut pkt, 40, seg);
    pkt[60..].copy_from_slice(payload);
    finish_transport(&mut pkt, 40, 6, 16, &src, &dst);
    pkt
}

/// A dispatcher that keeps every packet it is handed.
#[derive(Default)]
pub(crate) struct Recorder {
    pub got: Mutex<Vec<(NetworkProtocol, PacketBuffer)>>,
}

impl Recorder {
    pub(crate) fn payloads(&self) -> Vec<Vec<u8>> {
        self.got
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p.as_slice().to_vec())
            .collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.got.lock().unwrap().len()
    }
}

impl NetworkDispatcher for Recorder {
    fn deliver_network_packet(&self, protocol: NetworkProtocol, pkt: &PacketBuffer) {
        self.got.lock().unwrap().push((protocol, pkt.clone()));
    }
}
