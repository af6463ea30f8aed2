/*!
# Endpoint Builder Module

This module provides the [`LinkEndpointBuilder`] struct for configuring and creating a
[`LinkEndpoint`].

## Overview

Every setting is optional. Configuration includes:
- Outbound queue size (packets buffered between the stack and the device writer)
- MTU reported to the stack
- Link-layer address (tunnels usually leave it empty)
- The kind of segmentation offload the stack may use
- An observer receiving drop and drain counts

## Basic Usage

```
use netstack_link::LinkEndpointBuilder;

let ep = LinkEndpointBuilder::new()
    .queue_size(1024)
    .mtu(1400)
    .build()?;
assert_eq!(ep.mtu(), 1400);
# Ok::<(), std::io::Error>(())
```

## Defaults

| setting         | default                      |
|-----------------|------------------------------|
| `queue_size`    | 512                          |
| `mtu`           | 1280                         |
| `link_address`  | empty                        |
| `supported_gso` | [`SupportedGso::NotSupported`] |
| `observer`      | [`NoopObserver`]             |

A queue size or MTU of zero is rejected by [`LinkEndpointBuilder::build`] with
[`io::ErrorKind::InvalidInput`].
*/

use std::io;
use std::sync::Arc;

use crate::endpoint::{LinkAddress, LinkEndpoint, SupportedGso};
use crate::observer::{LinkObserver, NoopObserver};

/// Outbound queue size used when none is configured.
pub const DEFAULT_QUEUE_SIZE: usize = 512;
/// MTU used when none is configured. The IPv6 minimum.
pub const DEFAULT_MTU: u32 = 1280;

/// A consuming builder for [`LinkEndpoint`].
#[derive(Default)]
pub struct LinkEndpointBuilder {
    queue_size: Option<usize>,
    mtu: Option<u32>,
    link_address: Option<LinkAddress>,
    supported_gso: Option<SupportedGso>,
    observer: Option<Arc<dyn LinkObserver>>,
}

impl LinkEndpointBuilder {
    /// Creates a new LinkEndpointBuilder instance with default settings.
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets the number of outbound packets buffered before writes are dropped.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }
    /// Sets the MTU reported to the stack.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }
    pub fn link_address<A: Into<LinkAddress>>(mut self, link_address: A) -> Self {
        self.link_address = Some(link_address.into());
        self
    }
    pub fn supported_gso(mut self, supported_gso: SupportedGso) -> Self {
        self.supported_gso = Some(supported_gso);
        self
    }
    /// Sets the observer that receives drop, coalesce and drain counts.
    pub fn observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
    /// Builds the endpoint, unattached and open.
    pub fn build(self) -> io::Result<LinkEndpoint> {
        let queue_size = self.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE);
        if queue_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "queue size must be non-zero",
            ));
        }
        let mtu = self.mtu.unwrap_or(DEFAULT_MTU);
        if mtu == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "mtu must be non-zero",
            ));
        }
        Ok(LinkEndpoint::with_parts(
            queue_size,
            mtu,
            self.link_address.unwrap_or_default(),
            self.supported_gso.unwrap_or_default(),
            self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        ))
    }
}
