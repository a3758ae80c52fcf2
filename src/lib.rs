//! Driver core for LPC18xx-class USART/UART peripherals
//!
//! This crate implements the serial-line driver logic for the 16550-style
//! USART blocks with a fractional baud-rate divider found on LPC18xx-class
//! parts: divider search, mode/line configuration, non-blocking send/receive
//! state machines (polled, interrupt-driven and transfer-engine driven) and
//! the decoding of interrupt and completion sources into an application
//! visible [`Event`] mask.
//!
//! The crate is hardware independent: register access goes through
//! [`registers::RegisterBlock`], and pin multiplexing, clock-tree queries,
//! transfer-engine programming and interrupt-controller primitives are
//! consumed through the traits in [`platform`]. A board crate maps the real
//! peripheral with [`registers::RegisterBlock::at`] and implements the
//! service traits; tests run the same driver against an in-memory block.
//!
//! ## Usage
//!
//! ```no_run
//! use lpc_usart::{config, resources::Resources, usart::{PowerState, Usart}};
//! # fn services() -> lpc_usart::platform::Services<'static> { unimplemented!() }
//! # fn resources() -> Resources<'static> { unimplemented!() }
//!
//! let usart = Usart::new(resources(), services());
//! usart.initialize(None).unwrap();
//! usart.power(PowerState::Full).unwrap();
//! usart.configure(&config::_9600_8_N_1).unwrap();
//! usart.enable_transmitter(true).unwrap();
//! usart.write_full_blocking(b"Hello World!\r\n");
//! ```
//!
//! ## Concurrency contract
//!
//! All public operations return immediately; none block (`Busy` is reported
//! instead). An instance must be operated from one priority level at a time:
//! callers either run at the priority that services the instance's interrupt
//! or mask that vector for the duration of the call. The event queue fed by
//! [`usart::Usart::handle_interrupt`] is the only structure shared across
//! priorities and is guarded by `critical-section`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod baud;
pub mod config;
pub mod event;
pub mod platform;
pub mod registers;
pub mod registry;
pub mod resources;
pub mod usart;

pub use self::config::Config;
pub use self::event::{Event, EventHandler};
pub use self::usart::{LineError, ModemControl, ModemStatus, PowerState, Status, Usart};

/// Errors reported by the driver surface.
///
/// Hardware-detected line faults (overrun, parity, framing, break, TX
/// underflow) are never returned from a call; they surface as [`Event`] bits
/// and sticky [`Status`] flags instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// An argument is out of range (empty buffer, zero length, ...).
    InvalidParameter,
    /// Operation requires `initialize` first.
    NotInitialized,
    /// Operation requires `power(Full)` first.
    NotPowered,
    /// Operation requires a successful `configure` first.
    NotConfigured,
    /// The instance is powered; power it off first.
    AlreadyPowered,
    /// A send or receive is outstanding, or a required resource is taken.
    Busy,
    /// The instance's capabilities do not include the requested feature.
    UnsupportedCapability,
    /// No integer/fractional divider combination reaches the target rate.
    NoDivisorFound,
    /// The best reachable rate misses the target by more than the tolerance.
    BaudRateOutOfTolerance,
    /// Unsupported clock polarity/phase for a synchronous mode.
    InvalidClockConfiguration,
}
