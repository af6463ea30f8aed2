//! Software receive-checksum offload.
//!
//! The endpoint advertises [`LinkCapabilities::RX_CHECKSUM_OFFLOAD`] to the
//! stack, which then skips its own verification. Every inbound packet must
//! therefore pass through [`rx_checksum_offload`] before delivery; it
//! verifies exactly what the stack would otherwise have verified: the IPv4
//! header checksum and the TCP or UDP checksum.
//!
//! [`LinkCapabilities::RX_CHECKSUM_OFFLOAD`]: crate::LinkCapabilities::RX_CHECKSUM_OFFLOAD

use std::net::IpAddr;

use bytes::Bytes;

use crate::checksum::{checksum, pseudo_header_checksum_no_fold};
use crate::packet::{
    IpProto, NetworkProtocol, PacketBuffer, Parsed, IPV4_MAX_HEADER_LEN, IPV4_MIN_HEADER_LEN,
    IPV6_HEADER_LEN,
};

/// Validates the checksums of `p`, returning a private, validated copy of it.
///
/// Returns `None` for anything malformed: an unknown IP version, a buffer
/// shorter than its IP header, an IPv4 header length outside `[20, 60]`, a bad
/// IPv4 header checksum, or a bad TCP/UDP checksum. The input is never
/// modified and no input can make this panic.
///
/// For IPv6 the transport checksum covers everything after the fixed 40-byte
/// header. A TCP or UDP packet behind extension headers therefore fails
/// verification.
pub fn rx_checksum_offload(p: &Parsed<'_>) -> Option<PacketBuffer> {
    let buf = p.buffer();

    let (protocol, csum_start) = match p.ip_version {
        4 => {
            if buf.len() < IPV4_MIN_HEADER_LEN {
                return None;
            }
            let ihl = ((buf[0] & 0x0F) as usize) * 4;
            if !(IPV4_MIN_HEADER_LEN..=IPV4_MAX_HEADER_LEN).contains(&ihl) || buf.len() < ihl {
                return None;
            }
            if !checksum(&buf[..ihl], 0) != 0 {
                return None;
            }
            (NetworkProtocol::Ipv4, ihl)
        }
        6 => {
            if buf.len() < IPV6_HEADER_LEN {
                return None;
            }
            (NetworkProtocol::Ipv6, IPV6_HEADER_LEN)
        }
        _ => return None,
    };

    if matches!(p.ip_proto, IpProto::Tcp | IpProto::Udp) {
        let segment = &buf[csum_start..];
        let seg_len = u16::try_from(segment.len()).ok()?;
        let psum = match (p.src, p.dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => pseudo_header_checksum_no_fold(
                p.ip_proto.number(),
                &src.octets(),
                &dst.octets(),
                seg_len,
            ),
            (IpAddr::V6(src), IpAddr::V6(dst)) => pseudo_header_checksum_no_fold(
                p.ip_proto.number(),
                &src.octets(),
                &dst.octets(),
                seg_len,
            ),
            _ => return None,
        };
        if !checksum(segment, psum) != 0 {
            return None;
        }
    }

    Some(PacketBuffer::new_validated(protocol, Bytes::copy_from_slice(buf)))
}
