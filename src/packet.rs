use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::Bytes;

/// Length of an IPv4 header without options.
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Length of an IPv4 header carrying the maximum 40 bytes of options.
pub const IPV4_MAX_HEADER_LEN: usize = 60;
/// Length of the fixed IPv6 header.
pub const IPV6_HEADER_LEN: usize = 40;

/// Network-layer protocol carried by a [`PacketBuffer`].
///
/// The numeric values are the EtherType numbers the embedded stack keys its
/// network protocols on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkProtocol {
    Ipv4,
    Ipv6,
}

impl NetworkProtocol {
    /// EtherType number of the protocol.
    pub fn number(self) -> u16 {
        match self {
            NetworkProtocol::Ipv4 => 0x0800,
            NetworkProtocol::Ipv6 => 0x86dd,
        }
    }

    /// Looks up a protocol by its EtherType number.
    pub fn from_number(number: u16) -> Option<Self> {
        match number {
            0x0800 => Some(NetworkProtocol::Ipv4),
            0x86dd => Some(NetworkProtocol::Ipv6),
            _ => None,
        }
    }
}

/// Transport protocol numbers the link layer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProto {
    Icmpv4,
    Tcp,
    Udp,
    Icmpv6,
    Other(u8),
}

impl IpProto {
    pub fn number(self) -> u8 {
        match self {
            IpProto::Icmpv4 => 1,
            IpProto::Tcp => 6,
            IpProto::Udp => 17,
            IpProto::Icmpv6 => 58,
            IpProto::Other(n) => n,
        }
    }
}

impl From<u8> for IpProto {
    fn from(n: u8) -> Self {
        match n {
            1 => IpProto::Icmpv4,
            6 => IpProto::Tcp,
            17 => IpProto::Udp,
            58 => IpProto::Icmpv6,
            n => IpProto::Other(n),
        }
    }
}

/// A borrowed, already-parsed view of an inbound packet.
///
/// This is what the device reader hands to the inbound path. The buffer is
/// owned by the caller and is only read; anything that must outlive the call
/// is copied out.
#[derive(Debug, Clone, Copy)]
pub struct Parsed<'a> {
    buf: &'a [u8],
    /// IP version (4 or 6) as reported by the parser.
    pub ip_version: u8,
    /// Transport protocol of the packet.
    pub ip_proto: IpProto,
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl<'a> Parsed<'a> {
    /// Builds a view from already-known header fields.
    ///
    /// Nothing is checked here; the inbound validator treats every field as
    /// untrusted.
    pub fn new(buf: &'a [u8], ip_version: u8, ip_proto: IpProto, src: IpAddr, dst: IpAddr) -> Self {
        Parsed {
            buf,
            ip_version,
            ip_proto,
            src,
            dst,
        }
    }

    /// Parses the fixed IP header of `buf`.
    ///
    /// Fails with `InvalidInput` when the version nibble is neither 4 nor 6 or
    /// the buffer is shorter than that version's fixed header.
    pub fn decode(buf: &'a [u8]) -> io::Result<Self> {
        let Some(&first) = buf.first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty packet"));
        };
        match first >> 4 {
            4 => {
                if buf.len() < IPV4_MIN_HEADER_LEN {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "too short"));
                }
                let src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
                let dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
                Ok(Parsed::new(buf, 4, IpProto::from(buf[9]), src.into(), dst.into()))
            }
            6 => {
                if buf.len() < IPV6_HEADER_LEN {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "too short"));
                }
                let mut src = [0u8; 16];
                let mut dst = [0u8; 16];
                src.copy_from_slice(&buf[8..24]);
                dst.copy_from_slice(&buf[24..40]);
                Ok(Parsed::new(
                    buf,
                    6,
                    IpProto::from(buf[6]),
                    Ipv6Addr::from(src).into(),
                    Ipv6Addr::from(dst).into(),
                ))
            }
            v => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown ip version {v}"),
            )),
        }
    }

    /// The raw packet bytes, starting at the IP header.
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }
}

struct Inner {
    payload: Bytes,
    protocol: NetworkProtocol,
    rx_checksum_validated: bool,
}

/// A reference-counted, immutable packet.
///
/// Cloning takes another reference and dropping releases one; the payload is
/// freed with the last reference. The payload can never be mutated once the
/// buffer exists, so sharing it between the queue, the device writer and the
/// stack is always safe.
#[derive(Clone)]
pub struct PacketBuffer(Arc<Inner>);

impl PacketBuffer {
    /// Wraps an outbound packet produced by the stack.
    pub fn new(protocol: NetworkProtocol, payload: impl Into<Bytes>) -> Self {
        PacketBuffer(Arc::new(Inner {
            payload: payload.into(),
            protocol,
            rx_checksum_validated: false,
        }))
    }

    pub(crate) fn new_validated(protocol: NetworkProtocol, payload: Bytes) -> Self {
        PacketBuffer(Arc::new(Inner {
            payload,
            protocol,
            rx_checksum_validated: true,
        }))
    }

    pub fn network_protocol(&self) -> NetworkProtocol {
        self.0.protocol
    }

    /// Whether the link already verified the IPv4 header and TCP/UDP checksums.
    pub fn rx_checksum_validated(&self) -> bool {
        self.0.rx_checksum_validated
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0.payload
    }

    /// A cheap handle to the payload bytes, sharing the same allocation.
    pub fn payload(&self) -> Bytes {
        self.0.payload.clone()
    }

    pub fn len(&self) -> usize {
        self.0.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.payload.is_empty()
    }

    /// Number of live references to this packet.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether two handles refer to the same packet.
    pub fn ptr_eq(&self, other: &PacketBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("protocol", &self.0.protocol)
            .field("len", &self.0.payload.len())
            .field("rx_checksum_validated", &self.0.rx_checksum_validated)
            .field("refs", &self.ref_count())
            .finish()
    }
}
