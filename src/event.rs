//! Completion and signal events.
//!
//! Interrupt and transfer-engine handlers condense what happened into an
//! [`Event`] bitmask and either hand it to the registered callback or park it
//! in the instance's bounded queue for [`Usart::take_event`] to collect.
//!
//! [`Usart::take_event`]: crate::Usart::take_event

use core::cell::RefCell;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use critical_section::Mutex;
use heapless::Deque;

/// A set of signal events, one bit each.
///
/// A single interrupt may report several events at once, so handlers receive
/// the whole set rather than one event per call.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event(u32);

impl Event {
    /// No event.
    pub const NONE: Event = Event(0);
    /// Send finished; the last byte was handed to the transmit FIFO.
    pub const SEND_COMPLETE: Event = Event(1 << 0);
    /// Receive finished; the requested number of bytes arrived.
    pub const RECEIVE_COMPLETE: Event = Event(1 << 1);
    /// Both halves of a synchronous transfer finished.
    pub const TRANSFER_COMPLETE: Event = Event(1 << 2);
    /// Transmit shift register drained; the line is idle.
    pub const TX_COMPLETE: Event = Event(1 << 3);
    /// A synchronous slave had to clock out data with no send active.
    pub const TX_UNDERFLOW: Event = Event(1 << 4);
    /// Receive data was lost to an overrun.
    pub const RX_OVERFLOW: Event = Event(1 << 5);
    /// The line went quiet mid-receive.
    pub const RX_TIMEOUT: Event = Event(1 << 6);
    /// Break condition detected on the receive line.
    pub const RX_BREAK: Event = Event(1 << 7);
    /// Framing error on a received character.
    pub const RX_FRAMING_ERROR: Event = Event(1 << 8);
    /// Parity error on a received character.
    pub const RX_PARITY_ERROR: Event = Event(1 << 9);
    /// CTS modem line changed state.
    pub const CTS_CHANGED: Event = Event(1 << 10);
    /// DSR modem line changed state.
    pub const DSR_CHANGED: Event = Event(1 << 11);
    /// DCD modem line changed state.
    pub const DCD_CHANGED: Event = Event(1 << 12);
    /// RI modem line changed state.
    pub const RI_CHANGED: Event = Event(1 << 13);

    /// Raw bitmask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Event) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Event {
    type Output = Event;
    fn bitor(self, rhs: Event) -> Event {
        Event(self.0 | rhs.0)
    }
}

impl BitOrAssign for Event {
    fn bitor_assign(&mut self, rhs: Event) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({:#06x})", self.0)
    }
}

/// Callback invoked from interrupt context with the events of one dispatch.
pub type EventHandler = fn(Event);

/// Queue depth of parked event sets per instance.
const QUEUE_DEPTH: usize = 8;

/// Bounded queue of event sets awaiting collection.
///
/// Posted from interrupt context, drained from thread context. When the
/// queue is full the oldest set is dropped to make room, so a stalled
/// consumer sees the most recent activity.
pub(crate) struct EventQueue {
    inner: Mutex<RefCell<Deque<Event, QUEUE_DEPTH>>>,
}

impl EventQueue {
    pub(crate) const fn new() -> Self {
        EventQueue {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub(crate) fn post(&self, event: Event) {
        critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            if queue.is_full() {
                queue.pop_front();
            }
            // Cannot fail, a slot was just guaranteed.
            let _ = queue.push_back(event);
        });
    }

    pub(crate) fn take(&self) -> Option<Event> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }
}
