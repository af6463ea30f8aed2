use std::sync::{Arc, Mutex, Weak};

/// Something blocked on its own condition variable that an
/// [`InterruptEvent`] must be able to wake.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct State {
    value: i32,
    waiters: Vec<Weak<dyn Wake>>,
}

/// A one-shot cancellation signal for blocking reads.
///
/// Once triggered, every [`PacketQueue::read_interruptible`] using the event
/// returns `None`, both those already blocked and those started later, until
/// [`reset`](InterruptEvent::reset) is called.
///
/// [`PacketQueue::read_interruptible`]: crate::PacketQueue::read_interruptible
#[derive(Default)]
pub struct InterruptEvent {
    state: Mutex<State>,
}

impl InterruptEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.trigger_value(1)
    }

    /// Triggers the event with a caller-defined non-zero value.
    ///
    /// Triggering an already triggered event keeps the first value. A value of
    /// zero is treated as 1.
    pub fn trigger_value(&self, val: i32) {
        let waiters: Vec<Arc<dyn Wake>> = {
            let mut guard = self.state.lock().unwrap();
            if guard.value != 0 {
                return;
            }
            guard.value = if val == 0 { 1 } else { val };
            guard.waiters.iter().filter_map(Weak::upgrade).collect()
        };
        // woken outside our lock: waiters take their own lock and then ours
        for w in waiters {
            w.wake();
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.state.lock().unwrap().value != 0
    }

    pub fn value(&self) -> i32 {
        self.state.lock().unwrap().value
    }

    pub fn reset(&self) {
        self.state.lock().unwrap().value = 0;
    }

    pub(crate) fn register(&self, waiter: &Arc<dyn Wake>) {
        let mut guard = self.state.lock().unwrap();
        guard.waiters.retain(|w| w.strong_count() > 0);
        guard.waiters.push(Arc::downgrade(waiter));
    }

    pub(crate) fn unregister(&self, waiter: &Arc<dyn Wake>) {
        let target = Arc::downgrade(waiter);
        self.state
            .lock()
            .unwrap()
            .waiters
            .retain(|w| w.strong_count() > 0 && !w.ptr_eq(&target));
    }
}
