//! The USART driver core.
//!
//! [`Usart`] drives one peripheral instance through its whole life: pin
//! bring-up, clock and reset sequencing, line/mode configuration,
//! non-blocking send/receive/transfer state machines and the decoding of
//! interrupt and transfer-engine completions into [`Event`] masks.
//!
//! The lifecycle is an explicit ladder: `new` → [`Usart::initialize`] →
//! [`Usart::power`]`(Full)` → [`Usart::configure`] → data transfers. Each
//! rung checks the one below it and steps back down in reverse order.

use core::cell::Cell;

use fugit::HertzU32;

use crate::baud;
use crate::config::{ClockPhase, ClockPolarity, Config, DataBits, Mode, Parity, StopBits};
use crate::event::{Event, EventHandler, EventQueue};
use crate::platform::{pin_cfg, Services};
use crate::registers::{self, RegisterBlock};
use crate::resources::{Capabilities, PinBinding, Resources};
use crate::Error;

mod io;
mod irq;
mod transfer;

#[cfg(test)]
mod tests;

pub use self::io::LineError;
pub use self::transfer::SyncMode;

use self::transfer::TransferState;

/// Requested power state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Clocks gated, interrupt disabled.
    Off,
    /// Reduced-power operation (not available on this hardware).
    Low,
    /// Fully clocked and operational.
    Full,
}

/// Lifecycle rung an instance currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    /// Fresh or uninitialized.
    Idle,
    /// Runtime state and modem pins set up.
    Initialized,
    /// Clocked, reset and ready for configuration.
    Powered,
    /// Mode and line format committed; transfers allowed.
    Configured,
}

/// Snapshot of the instance's transfer and line status.
///
/// The error flags are sticky: set by the interrupt handler, cleared when
/// the next receive (or send, for `tx_underflow`) starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// A character is still in the transmit holding or shift register.
    pub tx_busy: bool,
    /// A receive operation is in progress.
    pub rx_busy: bool,
    /// A synchronous slave clocked out data with no send active.
    pub tx_underflow: bool,
    /// Receive data was lost to an overrun.
    pub rx_overflow: bool,
    /// A break condition was seen.
    pub rx_break: bool,
    /// A framing error was seen.
    pub rx_framing_error: bool,
    /// A parity error was seen.
    pub rx_parity_error: bool,
}

/// Modem output line commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemControl {
    /// Deassert RTS.
    RtsClear,
    /// Assert RTS.
    RtsSet,
    /// Deassert DTR.
    DtrClear,
    /// Assert DTR.
    DtrSet,
}

/// State of the modem input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModemStatus {
    /// Clear to send.
    pub cts: bool,
    /// Data set ready.
    pub dsr: bool,
    /// Data carrier detect.
    pub dcd: bool,
    /// Ring indicator.
    pub ri: bool,
}

/// One USART instance.
///
/// All methods take `&self`; runtime state lives in `Cell`s. The instance
/// must be operated from one priority level at a time (see the crate-level
/// concurrency contract); the event queue is the only structure accessed
/// from both thread and interrupt context.
pub struct Usart<'a> {
    resources: Resources<'a>,
    services: Services<'a>,

    state: Cell<State>,
    mode: Cell<Option<Mode>>,
    tx_enabled: Cell<bool>,
    rx_enabled: Cell<bool>,
    handler: Cell<Option<EventHandler>>,
    /// Requested rate of the last successful `configure`.
    baudrate: Cell<u32>,
    /// Rate actually produced by the committed divisors.
    actual_baudrate: Cell<u32>,

    tx_underflow: Cell<bool>,
    rx_overflow: Cell<bool>,
    rx_break: Cell<bool>,
    rx_framing_error: Cell<bool>,
    rx_parity_error: Cell<bool>,

    xfer: TransferState,
    events: EventQueue,
}

// The register block reference and service trait objects are plain shared
// borrows; the Cell state is only touched under the single-priority
// operating contract, and the event queue is critical-section guarded.
unsafe impl Send for Usart<'_> {}
unsafe impl Sync for Usart<'_> {}

impl<'a> Usart<'a> {
    /// Binds a driver to one instance's resources and services.
    ///
    /// The instance starts idle; call [`initialize`](Self::initialize)
    /// next.
    pub fn new(resources: Resources<'a>, services: Services<'a>) -> Usart<'a> {
        Usart {
            resources,
            services,
            state: Cell::new(State::Idle),
            mode: Cell::new(None),
            tx_enabled: Cell::new(false),
            rx_enabled: Cell::new(false),
            handler: Cell::new(None),
            baudrate: Cell::new(0),
            actual_baudrate: Cell::new(0),
            tx_underflow: Cell::new(false),
            rx_overflow: Cell::new(false),
            rx_break: Cell::new(false),
            rx_framing_error: Cell::new(false),
            rx_parity_error: Cell::new(false),
            xfer: TransferState::new(),
            events: EventQueue::new(),
        }
    }

    pub(crate) fn regs(&self) -> &RegisterBlock {
        self.resources.regs
    }

    /// The instance's capability flags.
    pub fn capabilities(&self) -> Capabilities {
        self.resources.capabilities
    }

    /// The interrupt vector this instance raises.
    pub fn interrupt_vector(&self) -> crate::platform::InterruptVector {
        self.resources.irq
    }

    /// The rate actually produced by the last successful
    /// [`configure`](Self::configure), or 0 before that.
    pub fn baudrate(&self) -> HertzU32 {
        HertzU32::from_raw(self.actual_baudrate.get())
    }

    /// Sets up runtime state and modem pins.
    ///
    /// `handler` is invoked from interrupt context with each dispatched
    /// [`Event`] mask; pass `None` to collect events with
    /// [`take_event`](Self::take_event) instead. Idempotent while the
    /// instance stays unpowered.
    pub fn initialize(&self, handler: Option<EventHandler>) -> Result<(), Error> {
        if self.state.get() >= State::Powered {
            return Err(Error::AlreadyPowered);
        }
        if self.state.get() == State::Initialized {
            return Ok(());
        }

        self.handler.set(handler);
        self.tx_underflow.set(false);
        self.rx_overflow.set(false);
        self.rx_break.set(false);
        self.rx_framing_error.set(false);
        self.rx_parity_error.set(false);
        self.mode.set(None);
        self.tx_enabled.set(false);
        self.rx_enabled.set(false);
        self.xfer.reset();

        let caps = self.resources.capabilities;
        let pins = self.resources.pins;
        if caps.cts {
            self.route_input(pins.cts);
        }
        if caps.rts {
            self.route_output(pins.rts);
        }
        if caps.dcd {
            self.route_input(pins.dcd);
        }
        if caps.dsr {
            self.route_input(pins.dsr);
        }
        if caps.dtr {
            self.route_output(pins.dtr);
        }
        if caps.ri {
            self.route_input(pins.ri);
        }

        self.state.set(State::Initialized);
        Ok(())
    }

    /// Releases the pins and forgets the runtime state.
    ///
    /// The instance must be powered off first.
    pub fn uninitialize(&self) -> Result<(), Error> {
        if self.state.get() >= State::Powered {
            return Err(Error::AlreadyPowered);
        }
        if self.state.get() == State::Idle {
            return Ok(());
        }

        let caps = self.resources.capabilities;
        let pins = self.resources.pins;
        self.release_pin(pins.tx);
        self.release_pin(pins.rx);
        self.release_pin(pins.clk);
        if caps.cts {
            self.release_pin(pins.cts);
        }
        if caps.rts {
            self.release_pin(pins.rts);
        }
        if caps.dcd {
            self.release_pin(pins.dcd);
        }
        if caps.dsr {
            self.release_pin(pins.dsr);
        }
        if caps.dtr {
            self.release_pin(pins.dtr);
        }
        if caps.ri {
            self.release_pin(pins.ri);
        }

        self.state.set(State::Idle);
        Ok(())
    }

    /// Steps the instance between the powered and unpowered rungs.
    ///
    /// `Full` opens the clock gates, cycles the peripheral reset, programs
    /// the FIFO and (on modem-capable instances) the modem status interrupt,
    /// and enables the interrupt vector. `Off` reverses that. `Low` is not
    /// available on this hardware. Refused with [`Error::Busy`] while a
    /// transfer is outstanding or the transmitter still drains.
    pub fn power(&self, state: PowerState) -> Result<(), Error> {
        if self.state.get() == State::Idle {
            return Err(Error::NotInitialized);
        }
        if self.xfer.rx_busy() || self.xfer.send_active() {
            return Err(Error::Busy);
        }
        if self.state.get() >= State::Powered
            && self.regs().lsr.get() & registers::lsr::TEMT == 0
        {
            return Err(Error::Busy);
        }

        match state {
            PowerState::Off => {
                if self.state.get() < State::Powered {
                    return Ok(());
                }
                self.services.interrupt_controller.disable(self.resources.irq);
                self.resources.clocks.peripheral_gate.disable();
                while self.resources.clocks.peripheral_gate.is_enabled() {}
                self.resources.clocks.register_gate.disable();
                while self.resources.clocks.register_gate.is_enabled() {}
                self.state.set(State::Initialized);
                Ok(())
            }
            PowerState::Low => Err(Error::UnsupportedCapability),
            PowerState::Full => {
                if self.state.get() >= State::Powered {
                    return Ok(());
                }
                self.resources.clocks.register_gate.enable();
                while !self.resources.clocks.register_gate.is_enabled() {}
                self.resources.clocks.peripheral_gate.enable();
                while !self.resources.clocks.peripheral_gate.is_enabled() {}

                self.resources.reset.reset_assert();
                while !self.resources.reset.reset_done() {}

                let regs = self.regs();
                regs.ter.set(regs.ter.get() & !registers::ter::TXEN);
                regs.rs485ctrl
                    .set(regs.rs485ctrl.get() | registers::rs485ctrl::RXDIS);
                regs.ier.set(0);
                regs.fcr.set(self.fcr_base());
                if self.resources.capabilities.has_modem_lines() {
                    regs.ier.set(regs.ier.get() | registers::ier::MSIE);
                }

                self.state.set(State::Powered);
                self.services
                    .interrupt_controller
                    .clear_pending(self.resources.irq);
                self.services.interrupt_controller.enable(self.resources.irq);
                Ok(())
            }
        }
    }

    /// Commits mode, line format, flow control and baud rate.
    ///
    /// Requires a powered, idle instance. On success the instance is ready
    /// for transfers; on any error the previous configuration (and pin
    /// routing) is left untouched.
    pub fn configure(&self, config: &Config) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        if self.xfer.rx_busy() || self.xfer.send_active() {
            return Err(Error::Busy);
        }

        let caps = self.resources.capabilities;

        let mut syncctrl_val = 0;
        let mut hden_val = 0;
        let mut icr_val = 0;
        let mut scictrl_val = 0;
        match config.mode {
            Mode::Asynchronous => {}
            Mode::SynchronousMaster => {
                if !caps.synchronous_master {
                    return Err(Error::UnsupportedCapability);
                }
                syncctrl_val = registers::syncctrl::SYNC | registers::syncctrl::CSRC;
            }
            Mode::SynchronousSlave => {
                if !caps.synchronous_slave {
                    return Err(Error::UnsupportedCapability);
                }
                syncctrl_val = registers::syncctrl::SYNC;
            }
            Mode::SingleWire => {
                if !caps.single_wire {
                    return Err(Error::UnsupportedCapability);
                }
                hden_val = registers::hden::HDEN;
            }
            Mode::IrDA => {
                if !caps.irda {
                    return Err(Error::UnsupportedCapability);
                }
                icr_val = registers::icr::IRDAEN;
            }
            Mode::SmartCard => {
                if !caps.smart_card {
                    return Err(Error::UnsupportedCapability);
                }
                scictrl_val = registers::scictrl::SCIEN;
            }
        }

        let mut lcr_val = match config.data_bits {
            DataBits::Five => 0,
            DataBits::Six => 1,
            DataBits::Seven => 2,
            DataBits::Eight => 3,
        } << registers::lcr::WLS_POS;
        match config.parity {
            None => {}
            Some(Parity::Odd) => lcr_val |= registers::lcr::PE,
            Some(Parity::Even) => {
                lcr_val |= registers::lcr::PE | (1 << registers::lcr::PS_POS)
            }
        }
        if config.stop_bits == StopBits::Two {
            lcr_val |= registers::lcr::SBS;
        }

        let mut mcr_val = 0;
        match config.flow_control {
            crate::config::FlowControl::None => {}
            crate::config::FlowControl::Rts => {
                if !caps.flow_control_rts {
                    return Err(Error::UnsupportedCapability);
                }
                mcr_val |= registers::mcr::RTSEN;
            }
            crate::config::FlowControl::Cts => {
                if !caps.flow_control_cts {
                    return Err(Error::UnsupportedCapability);
                }
                mcr_val |= registers::mcr::CTSEN;
            }
            crate::config::FlowControl::RtsCts => {
                if !(caps.flow_control_rts && caps.flow_control_cts) {
                    return Err(Error::UnsupportedCapability);
                }
                mcr_val |= registers::mcr::RTSEN | registers::mcr::CTSEN;
            }
        }

        // The shifter only supports the idle-low, capture-on-second-edge
        // clock combination.
        if config.mode.is_synchronous()
            && (config.clock_polarity != ClockPolarity::IdleLow
                || config.clock_phase != ClockPhase::CaptureOnSecond)
        {
            return Err(Error::InvalidClockConfiguration);
        }

        let pclk = self
            .services
            .clock_tree
            .frequency(self.resources.clocks.base_clock);
        let divisors = baud::compute(config.baudrate, pclk)?;
        self.commit_divisors(&divisors);
        self.baudrate.set(config.baudrate.to_Hz());
        self.actual_baudrate.set(divisors.actual.to_Hz());

        self.mode.set(Some(config.mode));
        self.route_data_pins(config.mode);

        let regs = self.regs();
        if caps.synchronous_master || caps.synchronous_slave {
            regs.syncctrl.set(
                registers::syncctrl::FES | registers::syncctrl::SSDIS | syncctrl_val,
            );
        }
        if caps.single_wire {
            regs.hden.set(hden_val);
        }
        if caps.irda {
            regs.icr
                .set((regs.icr.get() & !registers::icr::IRDAEN) | icr_val);
        }
        if caps.smart_card {
            regs.scictrl
                .set((regs.scictrl.get() & !registers::scictrl::SCIEN) | scictrl_val);
        }
        if caps.flow_control_rts || caps.flow_control_cts || caps.has_modem_lines() {
            regs.mcr.set(
                (regs.mcr.get() & !(registers::mcr::RTSEN | registers::mcr::CTSEN))
                    | mcr_val,
            );
        }
        regs.lcr.set(
            (regs.lcr.get() & (registers::lcr::BC | registers::lcr::DLAB)) | lcr_val,
        );

        self.state.set(State::Configured);
        Ok(())
    }

    fn commit_divisors(&self, divisors: &baud::Divisors) {
        let regs = self.regs();
        regs.lcr.set(regs.lcr.get() | registers::lcr::DLAB);
        // Divisor 65536 wraps to 0 in the 16-bit latch.
        regs.dll.set(divisors.divisor & 0xFF);
        regs.dlm.set((divisors.divisor >> 8) & 0xFF);
        regs.fdr.set(
            ((divisors.mul as u32) << registers::fdr::MULVAL_POS)
                | (divisors.div_add as u32),
        );
        regs.lcr.set(regs.lcr.get() & !registers::lcr::DLAB);
    }

    /// Sets the fill character clocked out when a synchronous receive has
    /// no send paired with it.
    pub fn set_default_tx_value(&self, value: u8) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        self.xfer.set_tx_fill(value);
        Ok(())
    }

    /// Selects the IrDA fixed pulse width, in nanoseconds.
    ///
    /// `0` returns to the variable 3/16-bit-time pulse. Otherwise the
    /// smallest divider whose pulse covers `pulse_ns` is committed; a pulse
    /// longer than 256 peripheral clock periods is rejected.
    pub fn set_irda_pulse(&self, pulse_ns: u32) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        if !self.resources.capabilities.irda {
            return Err(Error::UnsupportedCapability);
        }
        let regs = self.regs();
        if pulse_ns == 0 {
            regs.icr.set(regs.icr.get() & !registers::icr::FIXPULSEEN);
            return Ok(());
        }

        let pclk = self
            .services
            .clock_tree
            .frequency(self.resources.clocks.base_clock)
            .to_Hz();
        if pclk == 0 {
            return Err(Error::InvalidClockConfiguration);
        }
        // Widen to u64: at slow base clocks the period times the ladder
        // entry does not fit in 32 bits.
        let period_ns = u64::from(1_000_000_000 / pclk);
        let mut div = None;
        for (sel, periods) in [2u64, 4, 8, 16, 32, 64, 128, 256].iter().enumerate() {
            if u64::from(pulse_ns) <= periods * period_ns {
                div = Some(sel as u32);
                break;
            }
        }
        let div = div.ok_or(Error::InvalidParameter)?;
        let icr = regs.icr.get() & !registers::icr::PULSEDIV_MASK;
        regs.icr.set(
            icr | (div << registers::icr::PULSEDIV_POS) | registers::icr::FIXPULSEEN,
        );
        Ok(())
    }

    /// Sets the smart-card guard time, in bit times (0..=255).
    pub fn set_smart_card_guard_time(&self, bit_times: u32) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        if !self.resources.capabilities.smart_card {
            return Err(Error::UnsupportedCapability);
        }
        if bit_times > 0xFF {
            return Err(Error::InvalidParameter);
        }
        let regs = self.regs();
        let val = regs.scictrl.get() & !registers::scictrl::GUARDTIME_MASK;
        regs.scictrl
            .set(val | (bit_times << registers::scictrl::GUARDTIME_POS));
        Ok(())
    }

    /// Checks a requested smart-card clock against the configured rate.
    ///
    /// The clock output is tied to the baud generator at 372 clocks per
    /// bit; only `0` (leave unchanged) or exactly `372 * baudrate` is
    /// accepted.
    pub fn set_smart_card_clock(&self, clock_hz: u32) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        if !self.resources.capabilities.smart_card {
            return Err(Error::UnsupportedCapability);
        }
        if clock_hz == 0 {
            return Ok(());
        }
        if !self.resources.capabilities.smart_card_clock {
            return Err(Error::UnsupportedCapability);
        }
        if self.baudrate.get().wrapping_mul(372) != clock_hz {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }

    /// Enables or disables the smart-card NACK response.
    pub fn set_smart_card_nack(&self, enable: bool) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        if !self.resources.capabilities.smart_card {
            return Err(Error::UnsupportedCapability);
        }
        let regs = self.regs();
        if enable {
            regs.scictrl
                .set(regs.scictrl.get() & !registers::scictrl::NACKDIS);
        } else {
            regs.scictrl
                .set(regs.scictrl.get() | registers::scictrl::NACKDIS);
        }
        Ok(())
    }

    /// Enables or disables the transmitter, routing the TX pin along with
    /// it (except in smart-card mode, where the pin always carries the
    /// bidirectional data line).
    pub fn enable_transmitter(&self, enable: bool) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        let smart_card = self.mode.get() == Some(Mode::SmartCard);
        if enable {
            if !smart_card {
                if let Some(tx) = self.resources.pins.tx {
                    self.services.pin_router.configure(
                        tx.port,
                        tx.pin,
                        pin_cfg::PULLUP_DISABLE
                            | pin_cfg::INPUT_FILTER_DISABLE
                            | tx.function,
                    );
                }
            }
            self.tx_enabled.set(true);
            regs.ter.set(regs.ter.get() | registers::ter::TXEN);
        } else {
            self.tx_enabled.set(false);
            regs.ter.set(regs.ter.get() & !registers::ter::TXEN);
            if !smart_card {
                if let Some(tx) = self.resources.pins.tx {
                    self.services.pin_router.configure(
                        tx.port,
                        tx.pin,
                        pin_cfg::PULLUP_DISABLE
                            | pin_cfg::INPUT_FILTER_DISABLE
                            | pin_cfg::FUNC_GPIO,
                    );
                }
            }
        }
        Ok(())
    }

    /// Enables or disables the receiver, routing the RX pin along with it
    /// (except in smart-card and single-wire modes, where the RX pin is
    /// unused).
    pub fn enable_receiver(&self, enable: bool) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        let pin_unused = matches!(
            self.mode.get(),
            Some(Mode::SmartCard) | Some(Mode::SingleWire)
        );
        if enable {
            if !pin_unused {
                if let Some(rx) = self.resources.pins.rx {
                    self.services.pin_router.configure(
                        rx.port,
                        rx.pin,
                        pin_cfg::PULLUP_DISABLE
                            | pin_cfg::INPUT_FILTER_DISABLE
                            | pin_cfg::INPUT_BUFFER_ENABLE
                            | rx.function,
                    );
                }
            }
            self.rx_enabled.set(true);
            regs.rs485ctrl
                .set(regs.rs485ctrl.get() & !registers::rs485ctrl::RXDIS);
            regs.ier.set(regs.ier.get() | registers::ier::RXIE);
        } else {
            self.rx_enabled.set(false);
            regs.rs485ctrl
                .set(regs.rs485ctrl.get() | registers::rs485ctrl::RXDIS);
            regs.ier.set(regs.ier.get() & !registers::ier::RXIE);
            if !pin_unused {
                if let Some(rx) = self.resources.pins.rx {
                    self.services.pin_router.configure(
                        rx.port,
                        rx.pin,
                        pin_cfg::PULLUP_DISABLE
                            | pin_cfg::INPUT_FILTER_DISABLE
                            | pin_cfg::FUNC_GPIO,
                    );
                }
            }
        }
        Ok(())
    }

    /// Starts or stops a break condition on the TX line.
    pub fn set_break(&self, enable: bool) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        if enable {
            regs.lcr.set(regs.lcr.get() | registers::lcr::BC);
        } else {
            regs.lcr.set(regs.lcr.get() & !registers::lcr::BC);
        }
        Ok(())
    }

    /// Current transfer and sticky line status.
    ///
    /// `tx_busy` is sampled live from the transmitter-empty flag.
    pub fn status(&self) -> Status {
        Status {
            tx_busy: self.regs().lsr.get() & registers::lsr::TEMT == 0,
            rx_busy: self.xfer.rx_busy(),
            tx_underflow: self.tx_underflow.get(),
            rx_overflow: self.rx_overflow.get(),
            rx_break: self.rx_break.get(),
            rx_framing_error: self.rx_framing_error.get(),
            rx_parity_error: self.rx_parity_error.get(),
        }
    }

    /// Drives one modem output line.
    pub fn set_modem_control(&self, control: ModemControl) -> Result<(), Error> {
        if self.state.get() < State::Configured {
            return Err(Error::NotConfigured);
        }
        let caps = self.resources.capabilities;
        let regs = self.regs();
        match control {
            ModemControl::RtsClear | ModemControl::RtsSet => {
                if !caps.rts {
                    return Err(Error::UnsupportedCapability);
                }
                if control == ModemControl::RtsSet {
                    regs.mcr.set(regs.mcr.get() | registers::mcr::RTSCTRL);
                } else {
                    regs.mcr.set(regs.mcr.get() & !registers::mcr::RTSCTRL);
                }
            }
            ModemControl::DtrClear | ModemControl::DtrSet => {
                if !caps.dtr {
                    return Err(Error::UnsupportedCapability);
                }
                if control == ModemControl::DtrSet {
                    regs.mcr.set(regs.mcr.get() | registers::mcr::DTRCTRL);
                } else {
                    regs.mcr.set(regs.mcr.get() & !registers::mcr::DTRCTRL);
                }
            }
        }
        Ok(())
    }

    /// Samples the modem input lines.
    ///
    /// Unwired lines (and any line before `configure`) read as inactive.
    pub fn modem_status(&self) -> ModemStatus {
        let caps = self.resources.capabilities;
        if self.state.get() < State::Configured || !caps.has_modem_lines() {
            return ModemStatus::default();
        }
        let msr = self.regs().msr.get();
        ModemStatus {
            cts: caps.cts && msr & registers::msr::CTS != 0,
            dsr: caps.dsr && msr & registers::msr::DSR != 0,
            dcd: caps.dcd && msr & registers::msr::DCD != 0,
            ri: caps.ri && msr & registers::msr::RI != 0,
        }
    }

    /// Pops one queued event mask, oldest first.
    pub fn take_event(&self) -> Option<Event> {
        self.events.take()
    }

    /// Drains the event queue into one combined mask, invoking the
    /// registered handler with it when non-empty.
    pub fn poll_events(&self) -> Event {
        let mut combined = Event::NONE;
        while let Some(event) = self.events.take() {
            combined |= event;
        }
        if !combined.is_empty() {
            if let Some(handler) = self.handler.get() {
                handler(combined);
            }
        }
        combined
    }

    /// Hands an event mask to the registered handler, or parks it in the
    /// queue when no handler was registered.
    pub(crate) fn dispatch(&self, event: Event) {
        if event.is_empty() {
            return;
        }
        match self.handler.get() {
            Some(handler) => handler(event),
            None => self.events.post(event),
        }
    }

    fn configured(&self) -> bool {
        self.state.get() == State::Configured
    }

    pub(crate) fn check_configured(&self) -> Result<(), Error> {
        if self.configured() {
            Ok(())
        } else {
            Err(Error::NotConfigured)
        }
    }

    pub(crate) fn mode_is_synchronous(&self) -> bool {
        self.mode.get().is_some_and(Mode::is_synchronous)
    }

    pub(crate) fn current_mode(&self) -> Option<Mode> {
        self.mode.get()
    }

    pub(crate) fn rx_is_enabled(&self) -> bool {
        self.rx_enabled.get()
    }

    /// Baseline FIFO control value: trigger level, FIFO enable and, when a
    /// transfer-engine channel is bound, engine request mode.
    pub(crate) fn fcr_base(&self) -> u32 {
        let mut val = self.resources.rx_trigger.fcr_bits() | registers::fcr::FIFOEN;
        if self.resources.dma_tx.is_some() || self.resources.dma_rx.is_some() {
            val |= registers::fcr::DMAMODE;
        }
        val
    }

    pub(crate) fn resources(&self) -> &Resources<'a> {
        &self.resources
    }

    pub(crate) fn services(&self) -> &Services<'a> {
        &self.services
    }

    fn route_data_pins(&self, mode: Mode) {
        let pins = self.resources.pins;
        let base = pin_cfg::INPUT_FILTER_DISABLE | pin_cfg::PULLUP_DISABLE;

        if let Some(tx) = pins.tx {
            let bits = match mode {
                Mode::SmartCard => base | tx.function,
                _ if self.tx_enabled.get() => base | tx.function,
                _ => base | pin_cfg::FUNC_GPIO,
            };
            self.services.pin_router.configure(tx.port, tx.pin, bits);
        }

        if let Some(rx) = pins.rx {
            let bits = match mode {
                Mode::SingleWire | Mode::SmartCard => base | pin_cfg::FUNC_GPIO,
                _ if self.rx_enabled.get() => {
                    base | pin_cfg::INPUT_BUFFER_ENABLE | rx.function
                }
                _ => base | pin_cfg::FUNC_GPIO,
            };
            self.services.pin_router.configure(rx.port, rx.pin, bits);
        }

        if let Some(clk) = pins.clk {
            let bits = match mode {
                Mode::SmartCard | Mode::SynchronousMaster => base | clk.function,
                Mode::SynchronousSlave => {
                    base | pin_cfg::INPUT_BUFFER_ENABLE | clk.function
                }
                _ => base | pin_cfg::INPUT_BUFFER_ENABLE | pin_cfg::FUNC_GPIO,
            };
            self.services.pin_router.configure(clk.port, clk.pin, bits);
        }
    }

    fn route_input(&self, binding: Option<PinBinding>) {
        if let Some(p) = binding {
            self.services.pin_router.configure(
                p.port,
                p.pin,
                pin_cfg::INPUT_FILTER_DISABLE
                    | pin_cfg::INPUT_BUFFER_ENABLE
                    | pin_cfg::PULLUP_DISABLE
                    | p.function,
            );
        }
    }

    fn route_output(&self, binding: Option<PinBinding>) {
        if let Some(p) = binding {
            self.services
                .pin_router
                .configure(p.port, p.pin, pin_cfg::PULLUP_DISABLE | p.function);
        }
    }

    fn release_pin(&self, binding: Option<PinBinding>) {
        if let Some(p) = binding {
            self.services.pin_router.configure(p.port, p.pin, 0);
        }
    }

    pub(crate) fn set_tx_underflow(&self, value: bool) {
        self.tx_underflow.set(value);
    }

    pub(crate) fn set_rx_overflow(&self, value: bool) {
        self.rx_overflow.set(value);
    }

    pub(crate) fn set_rx_break(&self, value: bool) {
        self.rx_break.set(value);
    }

    pub(crate) fn set_rx_framing_error(&self, value: bool) {
        self.rx_framing_error.set(value);
    }

    pub(crate) fn set_rx_parity_error(&self, value: bool) {
        self.rx_parity_error.set(value);
    }
}
