//! Static description of one peripheral instance.
//!
//! A [`Resources`] value describes everything that belongs to one USART
//! instance: which registers, pins, clock gates, reset line, interrupt
//! vector and transfer-engine channels it owns. It is assembled once by the
//! board crate and consumed by [`Usart::new`](crate::Usart::new).

use crate::platform::{ClockGate, ClockSource, InterruptVector, PeripheralReset};
use crate::registers::{fcr, RegisterBlock};

/// Optional-feature flags of one instance, fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    /// Asynchronous (plain UART) mode.
    pub asynchronous: bool,
    /// Synchronous master mode.
    pub synchronous_master: bool,
    /// Synchronous slave mode.
    pub synchronous_slave: bool,
    /// Single-wire (half-duplex) mode.
    pub single_wire: bool,
    /// IrDA mode.
    pub irda: bool,
    /// Smart card mode.
    pub smart_card: bool,
    /// Smart card clock generator on the CLK pin.
    pub smart_card_clock: bool,
    /// Auto-RTS flow control.
    pub flow_control_rts: bool,
    /// Auto-CTS flow control.
    pub flow_control_cts: bool,
    /// TX-complete (shift register empty) signaling.
    pub event_tx_complete: bool,
    /// RX character-timeout signaling.
    pub event_rx_timeout: bool,
    /// RTS line wired.
    pub rts: bool,
    /// CTS line wired.
    pub cts: bool,
    /// DTR line wired.
    pub dtr: bool,
    /// DSR line wired.
    pub dsr: bool,
    /// DCD line wired.
    pub dcd: bool,
    /// RI line wired.
    pub ri: bool,
    /// CTS change notification.
    pub event_cts: bool,
    /// DSR change notification.
    pub event_dsr: bool,
    /// DCD change notification.
    pub event_dcd: bool,
    /// RI change notification.
    pub event_ri: bool,
}

impl Capabilities {
    /// Capabilities of a full USART instance: synchronous and smart-card
    /// clocking only when the CLK pin is wired, no modem lines.
    pub const fn usart(clk_pin: bool, dma_rx: bool) -> Self {
        Capabilities {
            asynchronous: true,
            synchronous_master: clk_pin,
            synchronous_slave: clk_pin,
            single_wire: true,
            irda: false,
            smart_card: true,
            smart_card_clock: clk_pin,
            flow_control_rts: false,
            flow_control_cts: false,
            event_tx_complete: false,
            // The character-timeout interrupt is consumed by the engine in
            // DMA receive mode.
            event_rx_timeout: !dma_rx,
            rts: false,
            cts: false,
            dtr: false,
            dsr: false,
            dcd: false,
            ri: false,
            event_cts: false,
            event_dsr: false,
            event_dcd: false,
            event_ri: false,
        }
    }

    /// Capabilities of a modem-line UART instance: asynchronous only, with
    /// every modem line and its change notification wired.
    pub const fn modem_uart(dma_rx: bool) -> Self {
        Capabilities {
            asynchronous: true,
            synchronous_master: false,
            synchronous_slave: false,
            single_wire: false,
            irda: false,
            smart_card: false,
            smart_card_clock: false,
            flow_control_rts: true,
            flow_control_cts: true,
            event_tx_complete: false,
            event_rx_timeout: !dma_rx,
            rts: true,
            cts: true,
            dtr: true,
            dsr: true,
            dcd: true,
            ri: true,
            event_cts: true,
            event_dsr: true,
            event_dcd: true,
            event_ri: true,
        }
    }

    /// Whether any modem status line is wired.
    pub fn has_modem_lines(&self) -> bool {
        self.cts || self.dsr || self.dcd || self.ri
    }
}

/// Routing description of one pin: where it sits and which function value
/// selects the USART signal on it.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinBinding {
    /// Pin-multiplexer port.
    pub port: u8,
    /// Pin number within the port.
    pub pin: u8,
    /// Function field value selecting the USART signal.
    pub function: u32,
}

/// Per-signal pin bindings; `None` means the signal is unwired.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pins {
    /// Transmit data.
    pub tx: Option<PinBinding>,
    /// Receive data.
    pub rx: Option<PinBinding>,
    /// Synchronous/smart-card clock.
    pub clk: Option<PinBinding>,
    /// Clear to send.
    pub cts: Option<PinBinding>,
    /// Request to send.
    pub rts: Option<PinBinding>,
    /// Data carrier detect.
    pub dcd: Option<PinBinding>,
    /// Data set ready.
    pub dsr: Option<PinBinding>,
    /// Data terminal ready.
    pub dtr: Option<PinBinding>,
    /// Ring indicator.
    pub ri: Option<PinBinding>,
}

/// Clock resources of one instance.
#[derive(Clone, Copy)]
pub struct ClockBinding<'a> {
    /// Gate of the register-interface clock branch.
    pub register_gate: &'a dyn ClockGate,
    /// Gate of the peripheral clock branch.
    pub peripheral_gate: &'a dyn ClockGate,
    /// Clock-tree source feeding the baud generator.
    pub base_clock: ClockSource,
}

/// One transfer-engine channel assignment.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaBinding {
    /// Engine channel number.
    pub channel: u8,
    /// Peripheral request line of this direction.
    pub peripheral: u8,
    /// Request-mux selector value for that line.
    pub peripheral_select: u8,
}

/// Receive FIFO trigger level.
///
/// Determines how many characters must be pending before the receive
/// interrupt (or engine request) fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxTrigger {
    /// Trigger on 1 character.
    #[default]
    Char1,
    /// Trigger on 4 characters.
    Char4,
    /// Trigger on 8 characters.
    Char8,
    /// Trigger on 14 characters.
    Char14,
}

impl RxTrigger {
    pub(crate) fn fcr_bits(self) -> u32 {
        let level = match self {
            RxTrigger::Char1 => 0,
            RxTrigger::Char4 => 1,
            RxTrigger::Char8 => 2,
            RxTrigger::Char14 => 3,
        };
        (level << 6) & fcr::RXTRIGLVL_MASK
    }
}

/// Everything that statically belongs to one instance.
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    /// The instance's register file.
    pub regs: &'a RegisterBlock,
    /// Optional-feature flags.
    pub capabilities: Capabilities,
    /// Pin bindings.
    pub pins: Pins,
    /// Clock gates and baud source.
    pub clocks: ClockBinding<'a>,
    /// Reset control.
    pub reset: &'a dyn PeripheralReset,
    /// The instance's interrupt vector.
    pub irq: InterruptVector,
    /// Receive FIFO trigger level.
    pub rx_trigger: RxTrigger,
    /// Transmit-direction engine channel, if any.
    pub dma_tx: Option<DmaBinding>,
    /// Receive-direction engine channel, if any.
    pub dma_rx: Option<DmaBinding>,
}
