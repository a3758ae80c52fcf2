//! Collaborator services consumed by the driver.
//!
//! Pin multiplexing, clock-tree queries, transfer-engine programming and
//! interrupt-controller primitives live outside this crate. A board crate
//! implements these traits over the real SCU/CGU/GPDMA/NVIC blocks and
//! passes them to [`Usart::new`](crate::Usart::new) as a [`Services`]
//! bundle; tests substitute recording mocks.

/// Pin-function configuration bits handed to [`PinRouter::configure`].
///
/// The values follow the SCU pin-configuration word: a 3-bit function field
/// plus buffer/filter/pull-up modifiers.
pub mod pin_cfg {
    /// Mask over the pin function field.
    pub const FUNC_MASK: u32 = 0x7;
    /// Function value routing the pin to GPIO (the reset function).
    pub const FUNC_GPIO: u32 = 0;
    /// Disable the pull-up resistor.
    pub const PULLUP_DISABLE: u32 = 1 << 4;
    /// Enable the input buffer.
    pub const INPUT_BUFFER_ENABLE: u32 = 1 << 6;
    /// Disable the input glitch filter.
    pub const INPUT_FILTER_DISABLE: u32 = 1 << 7;
}

/// Identifies a source in the clock tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockSource(pub u8);

/// Identifies an interrupt vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptVector(pub u16);

/// Pin-multiplexer service.
pub trait PinRouter {
    /// Applies `mode_bits` (a [`pin_cfg`] word) to the given pin.
    fn configure(&self, port: u8, pin: u8, mode_bits: u32);
}

/// Clock-frequency query against the clock tree.
pub trait ClockTree {
    /// Current frequency of `source`.
    fn frequency(&self, source: ClockSource) -> fugit::HertzU32;
}

/// One gateable clock (register-interface or peripheral branch).
pub trait ClockGate {
    /// Requests the gate to open.
    fn enable(&self);
    /// Requests the gate to close.
    fn disable(&self);
    /// Whether the gate currently acknowledges the requested state.
    fn is_enabled(&self) -> bool;
}

/// Peripheral reset control.
pub trait PeripheralReset {
    /// Asserts the peripheral's reset line.
    fn reset_assert(&self);
    /// Whether the reset cycle has completed.
    fn reset_done(&self) -> bool;
}

/// Direction of a transfer-engine move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    /// Memory to peripheral data register.
    MemoryToPeripheral,
    /// Peripheral data register to memory.
    PeripheralToMemory,
}

/// One transfer-engine descriptor.
///
/// Completion is not part of the request: the platform wires the channel's
/// terminal-count and error signals back into
/// [`Usart::handle_dma_tx_event`](crate::Usart::handle_dma_tx_event) /
/// [`Usart::handle_dma_rx_event`](crate::Usart::handle_dma_rx_event).
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest {
    /// Source address.
    pub src: *const u8,
    /// Destination address.
    pub dst: *mut u8,
    /// Number of bytes to move.
    pub len: usize,
    /// Whether the source address advances per byte.
    pub src_increment: bool,
    /// Whether the destination address advances per byte.
    pub dst_increment: bool,
    /// Flow direction of the move.
    pub direction: TransferDirection,
    /// Peripheral request line driving the channel.
    pub peripheral: u8,
}

/// Transfer-engine (DMA controller) service.
pub trait TransferEngine {
    /// Routes a peripheral request line through the engine's request mux.
    fn select_peripheral(&self, peripheral: u8, selector: u8);
    /// Programs and enables `channel`. Fails when the channel is already
    /// active.
    fn configure(&self, channel: u8, request: &TransferRequest) -> Result<(), EngineBusy>;
    /// Stops `channel` immediately.
    fn disable(&self, channel: u8);
}

/// The requested transfer-engine channel is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineBusy;

/// Completion signal of one transfer-engine channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaEvent {
    /// The programmed transfer count was reached.
    TerminalCount,
    /// The channel raised a bus error.
    Error,
}

/// Interrupt-controller primitives.
pub trait InterruptController {
    /// Enables delivery of `vector`.
    fn enable(&self, vector: InterruptVector);
    /// Disables delivery of `vector`.
    fn disable(&self, vector: InterruptVector);
    /// Clears a pending activation of `vector`.
    fn clear_pending(&self, vector: InterruptVector);
}

/// The collaborator services one instance runs against.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    /// Pin-multiplexer service.
    pub pin_router: &'a dyn PinRouter,
    /// Clock-tree frequency query.
    pub clock_tree: &'a dyn ClockTree,
    /// Transfer-engine service; `None` on interrupt-only platforms.
    pub transfer_engine: Option<&'a dyn TransferEngine>,
    /// Interrupt-controller primitives.
    pub interrupt_controller: &'a dyn InterruptController,
}
