#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
# netstack-link: a raw-IP link between a TUN device and a user-space TCP/IP stack

This crate moves IP packets between a tunnel device and an embedded network
stack running in the same process. The stack sees an ordinary link; the device
side sees a queue to drain and a function to push packets into.

## Features

- **Non-blocking outbound path**: the stack writes batches into a bounded queue;
  a full queue drops packets instead of stalling the sender
- **Blocking, interruptible and async reads** for the device writer
- **Receive checksum offload in software**: every inbound packet has its IPv4
  header and TCP/UDP checksums verified before the stack sees it, so the stack
  can skip its own verification
- **Generic Receive Offload (GRO)**: in-order TCP segments of a flow are merged
  into one larger segment between two explicit flushes
- **Injected observer** for drop, coalesce and drain counts

## Quick Start

```
use std::sync::Arc;
use netstack_link::{LinkEndpointBuilder, NetworkProtocol, PacketBuffer};

let ep = Arc::new(LinkEndpointBuilder::new().queue_size(64).mtu(1400).build()?);

// the stack binds its dispatcher
ep.attach(Arc::new(|proto: NetworkProtocol, pkt: &PacketBuffer| {
    println!("inbound {proto:?} packet, {} bytes", pkt.len());
}));

// outbound: the stack writes, the device writer reads
let n = ep.write_packets([PacketBuffer::new(NetworkProtocol::Ipv4, vec![0x45; 20])])?;
assert_eq!(n, 1);
let pkt = ep.read().unwrap();
assert_eq!(pkt.len(), 20);

ep.close();
# Ok::<(), Box<dyn std::error::Error>>(())
```

## Inbound Paths

The device reader parses each packet into a [`Parsed`] view and either
delivers it right away with [`LinkEndpoint::inject_inbound`], or batches it:

```no_run
use std::sync::Arc;
use netstack_link::{LinkEndpoint, Parsed};

fn read_loop(ep: Arc<LinkEndpoint>, mut recv: impl FnMut(&mut [u8]) -> usize) {
    let mut gro = ep.gro_inbound().expect("one inbound loop per endpoint");
    let mut buf = vec![0u8; 65535];
    while !ep.is_closed() {
        let len = recv(&mut buf);
        if let Ok(p) = Parsed::decode(&buf[..len]) {
            gro.enqueue_gro(&p);
        }
        gro.flush_gro();
    }
}
```

Only one [`GroInbound`] exists per endpoint at a time. It is the single owner
of the batcher, which is what keeps segments in arrival order without a lock.

## Shutdown

[`LinkEndpoint::close`] detaches the stack, closes the outbound queue (waking a
reader blocked in [`LinkEndpoint::read_interruptible`]) and releases every
packet still queued. It may be called any number of times. To unblock a reader
without closing, trigger the [`InterruptEvent`] it reads with.

## Features Flags

- `async_tokio` (alias `async`): [`PacketQueue::read_async`] and
  [`LinkEndpoint::read_async`], built on `tokio::sync::Notify`
*/

mod builder;
pub mod checksum;
mod endpoint;
mod error;
mod gro;
mod interrupt;
mod observer;
mod offload;
mod packet;
mod queue;

#[cfg(test)]
mod testutil;

pub use crate::builder::*;
pub use crate::endpoint::{
    ArpHardwareType, GroInbound, LinkAddress, LinkCapabilities, LinkEndpoint, NetworkDispatcher,
    SupportedGso, GSO_MAX_SIZE,
};
pub use crate::error::Error;
pub use crate::gro::{FlushStats, GroBatcher, IDEAL_BATCH_SIZE};
pub use crate::interrupt::InterruptEvent;
pub use crate::observer::{LinkObserver, NoopObserver};
pub use crate::offload::rx_checksum_offload;
pub use crate::packet::{
    IpProto, NetworkProtocol, PacketBuffer, Parsed, IPV4_MAX_HEADER_LEN, IPV4_MIN_HEADER_LEN,
    IPV6_HEADER_LEN,
};
pub use crate::queue::PacketQueue;
