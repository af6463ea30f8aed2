use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::interrupt::{InterruptEvent, Wake};
use crate::packet::PacketBuffer;

struct QueueState {
    buf: VecDeque<PacketBuffer>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    readable: Condvar,
    capacity: usize,
    #[cfg(feature = "async_tokio")]
    notify: tokio::sync::Notify,
}

impl Wake for Shared {
    fn wake(&self) {
        // taking the lock orders this wake-up after a reader's last check
        let _guard = self.state.lock().unwrap();
        self.readable.notify_all();
    }
}

/// A bounded, closeable FIFO of outbound packets.
///
/// Writes never block: a full queue drops the packet and reports
/// [`Error::NoBufferSpace`]. The closed flag and the buffered packets sit
/// behind one lock, so a packet can never be accepted into a queue that has
/// already been closed and drained.
///
/// Packets still buffered when the queue is closed remain readable until
/// they are drained.
pub struct PacketQueue {
    shared: Arc<Shared>,
}

impl PacketQueue {
    /// Creates a queue holding at most `capacity` packets.
    pub fn new(capacity: usize) -> Self {
        PacketQueue {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    buf: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                readable: Condvar::new(),
                capacity,
                #[cfg(feature = "async_tokio")]
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// Enqueues `pkt` without blocking.
    ///
    /// On failure the queue's reference to `pkt` is released immediately.
    pub fn write(&self, pkt: PacketBuffer) -> Result<(), Error> {
        {
            let mut guard = self.shared.state.lock().unwrap();
            if guard.closed {
                return Err(Error::ClosedForSend);
            }
            if guard.buf.len() >= self.shared.capacity {
                return Err(Error::NoBufferSpace);
            }
            guard.buf.push_back(pkt);
            self.shared.readable.notify_all();
        }
        #[cfg(feature = "async_tokio")]
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Dequeues one packet without blocking.
    pub fn read(&self) -> Option<PacketBuffer> {
        self.shared.state.lock().unwrap().buf.pop_front()
    }

    /// Dequeues one packet, blocking until one is available.
    ///
    /// Returns `None` when `event` is triggered, when `timeout` elapses, or
    /// when the queue is closed and empty. A triggered event takes precedence
    /// over buffered packets: a read started with an already triggered event
    /// returns `None` without dequeuing anything.
    pub fn read_interruptible(
        &self,
        event: &InterruptEvent,
        timeout: Option<Duration>,
    ) -> Option<PacketBuffer> {
        let waiter: Arc<dyn Wake> = self.shared.clone();
        event.register(&waiter);
        let pkt = self.wait_pop(event, timeout);
        event.unregister(&waiter);
        pkt
    }

    fn wait_pop(&self, event: &InterruptEvent, timeout: Option<Duration>) -> Option<PacketBuffer> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.shared.state.lock().unwrap();
        loop {
            if event.is_trigger() {
                return None;
            }
            if let Some(pkt) = guard.buf.pop_front() {
                return Some(pkt);
            }
            if guard.closed {
                return None;
            }
            guard = match deadline {
                None => self.shared.readable.wait(guard).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.shared
                        .readable
                        .wait_timeout(guard, deadline - now)
                        .unwrap()
                        .0
                }
            };
        }
    }

    /// Dequeues one packet, waiting asynchronously until one is available.
    ///
    /// Returns `None` once the queue is closed and empty. Cancel by dropping
    /// the future; a packet is only dequeued by a future that then returns it.
    #[cfg_attr(docsrs, doc(cfg(feature = "async_tokio")))]
    #[cfg(feature = "async_tokio")]
    pub async fn read_async(&self) -> Option<PacketBuffer> {
        loop {
            let mut notified = std::pin::pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            {
                let mut guard = self.shared.state.lock().unwrap();
                if let Some(pkt) = guard.buf.pop_front() {
                    return Some(pkt);
                }
                if guard.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue for writing and wakes every blocked reader.
    ///
    /// Returns `true` for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        {
            let mut guard = self.shared.state.lock().unwrap();
            if guard.closed {
                return false;
            }
            guard.closed = true;
            self.shared.readable.notify_all();
        }
        #[cfg(feature = "async_tokio")]
        self.shared.notify.notify_waiters();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }

    /// Removes and releases every buffered packet, returning how many there were.
    pub fn drain(&self) -> usize {
        let drained = std::mem::take(&mut self.shared.state.lock().unwrap().buf);
        // released outside the lock
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
