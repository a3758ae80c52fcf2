use std::cell::{Cell, RefCell};

use critical_section::Mutex as CsMutex;
use fugit::{HertzU32, RateExtU32};

use crate::config::{self, Mode};
use crate::event::Event;
use crate::platform::{
    ClockGate, ClockSource, ClockTree, DmaEvent, EngineBusy, InterruptController,
    InterruptVector, PeripheralReset, PinRouter, Services, TransferDirection,
    TransferEngine, TransferRequest,
};
use crate::registers::{self, iir, lsr, RegisterBlock};
use crate::registry::InstanceRegistry;
use crate::resources::{
    Capabilities, ClockBinding, DmaBinding, PinBinding, Pins, Resources, RxTrigger,
};
use crate::Error;

use super::{ModemControl, PowerState, Usart};

struct MockPinRouter {
    calls: RefCell<Vec<(u8, u8, u32)>>,
}

impl PinRouter for MockPinRouter {
    fn configure(&self, port: u8, pin: u8, mode_bits: u32) {
        self.calls.borrow_mut().push((port, pin, mode_bits));
    }
}

struct MockClockTree {
    hz: u32,
}

impl ClockTree for MockClockTree {
    fn frequency(&self, _source: ClockSource) -> HertzU32 {
        self.hz.Hz()
    }
}

struct MockGate {
    on: Cell<bool>,
}

impl ClockGate for MockGate {
    fn enable(&self) {
        self.on.set(true);
    }
    fn disable(&self) {
        self.on.set(false);
    }
    fn is_enabled(&self) -> bool {
        self.on.get()
    }
}

struct MockReset {
    asserted: Cell<bool>,
}

impl PeripheralReset for MockReset {
    fn reset_assert(&self) {
        self.asserted.set(true);
    }
    fn reset_done(&self) -> bool {
        self.asserted.get()
    }
}

struct MockEngine {
    busy: Cell<bool>,
    busy_channel: Cell<Option<u8>>,
    configured: RefCell<Vec<(u8, TransferRequest)>>,
    selected: RefCell<Vec<(u8, u8)>>,
    disabled: RefCell<Vec<u8>>,
}

impl TransferEngine for MockEngine {
    fn select_peripheral(&self, peripheral: u8, selector: u8) {
        self.selected.borrow_mut().push((peripheral, selector));
    }
    fn configure(&self, channel: u8, request: &TransferRequest) -> Result<(), EngineBusy> {
        if self.busy.get() || self.busy_channel.get() == Some(channel) {
            return Err(EngineBusy);
        }
        self.configured.borrow_mut().push((channel, *request));
        Ok(())
    }
    fn disable(&self, channel: u8) {
        self.disabled.borrow_mut().push(channel);
    }
}

struct MockIrqCtrl {
    enabled: Cell<bool>,
    cleared: Cell<u32>,
}

impl InterruptController for MockIrqCtrl {
    fn enable(&self, _vector: InterruptVector) {
        self.enabled.set(true);
    }
    fn disable(&self, _vector: InterruptVector) {
        self.enabled.set(false);
    }
    fn clear_pending(&self, _vector: InterruptVector) {
        self.cleared.set(self.cleared.get() + 1);
    }
}

struct Harness {
    regs: RegisterBlock,
    pins: MockPinRouter,
    clock: MockClockTree,
    reg_gate: MockGate,
    peri_gate: MockGate,
    reset: MockReset,
    engine: MockEngine,
    irq: MockIrqCtrl,
}

fn test_pins() -> Pins {
    let f = |port, pin, function| Some(PinBinding { port, pin, function });
    Pins {
        tx: f(2, 0, 1),
        rx: f(2, 1, 1),
        clk: f(2, 2, 2),
        cts: f(2, 3, 1),
        rts: f(2, 4, 1),
        dcd: f(2, 5, 1),
        dsr: f(2, 6, 1),
        dtr: f(2, 7, 1),
        ri: f(2, 8, 1),
    }
}

impl Harness {
    fn new(hz: u32) -> Harness {
        Harness {
            regs: RegisterBlock::new(),
            pins: MockPinRouter {
                calls: RefCell::new(Vec::new()),
            },
            clock: MockClockTree { hz },
            reg_gate: MockGate { on: Cell::new(false) },
            peri_gate: MockGate { on: Cell::new(false) },
            reset: MockReset {
                asserted: Cell::new(false),
            },
            engine: MockEngine {
                busy: Cell::new(false),
                busy_channel: Cell::new(None),
                configured: RefCell::new(Vec::new()),
                selected: RefCell::new(Vec::new()),
                disabled: RefCell::new(Vec::new()),
            },
            irq: MockIrqCtrl {
                enabled: Cell::new(false),
                cleared: Cell::new(0),
            },
        }
    }

    fn usart_with(&self, capabilities: Capabilities, dma: bool) -> Usart<'_> {
        let resources = Resources {
            regs: &self.regs,
            capabilities,
            pins: test_pins(),
            clocks: ClockBinding {
                register_gate: &self.reg_gate,
                peripheral_gate: &self.peri_gate,
                base_clock: ClockSource(1),
            },
            reset: &self.reset,
            irq: InterruptVector(24),
            rx_trigger: RxTrigger::Char1,
            dma_tx: dma.then_some(DmaBinding {
                channel: 0,
                peripheral: 1,
                peripheral_select: 2,
            }),
            dma_rx: dma.then_some(DmaBinding {
                channel: 1,
                peripheral: 2,
                peripheral_select: 2,
            }),
        };
        let services = Services {
            pin_router: &self.pins,
            clock_tree: &self.clock,
            transfer_engine: dma.then_some(&self.engine as &dyn TransferEngine),
            interrupt_controller: &self.irq,
        };
        Usart::new(resources, services)
    }

    fn usart(&self) -> Usart<'_> {
        self.usart_with(Capabilities::usart(true, false), false)
    }
}

fn bring_up<'a>(usart: &Usart<'a>, config: &config::Config) {
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();
    usart.configure(config).unwrap();
    usart.enable_transmitter(true).unwrap();
    usart.enable_receiver(true).unwrap();
}

#[test]
fn lifecycle_rungs_are_enforced() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();

    assert_eq!(usart.power(PowerState::Full), Err(Error::NotInitialized));
    usart.initialize(None).unwrap();
    assert_eq!(usart.configure(&config::_9600_8_N_1), Err(Error::NotPowered));
    usart.power(PowerState::Full).unwrap();
    assert_eq!(unsafe { usart.send(b"x") }, Err(Error::NotConfigured));
    usart.configure(&config::_9600_8_N_1).unwrap();
    assert_eq!(unsafe { usart.send(b"x") }, Ok(()));

    // Powered instances refuse re- and de-initialization.
    assert_eq!(usart.initialize(None), Err(Error::AlreadyPowered));
    assert_eq!(usart.uninitialize(), Err(Error::AlreadyPowered));
}

#[test]
fn initialize_is_idempotent_until_powered() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.initialize(None).unwrap();
    usart.uninitialize().unwrap();
    usart.uninitialize().unwrap();
}

#[test]
fn low_power_state_is_unsupported() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    assert_eq!(usart.power(PowerState::Low), Err(Error::UnsupportedCapability));
}

#[test]
fn power_full_sequences_clocks_reset_and_irq() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();

    assert!(h.reg_gate.is_enabled());
    assert!(h.peri_gate.is_enabled());
    assert!(h.reset.asserted.get());
    assert_ne!(h.regs.fcr.get() & registers::fcr::FIFOEN, 0);
    assert_eq!(h.regs.ier.get(), 0);
    assert!(h.irq.enabled.get());
    assert_eq!(h.irq.cleared.get(), 1);

    usart.power(PowerState::Off).unwrap();
    assert!(!h.reg_gate.is_enabled());
    assert!(!h.peri_gate.is_enabled());
    assert!(!h.irq.enabled.get());
}

#[test]
fn power_off_refused_while_transmitter_drains() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    h.regs.lsr.set(lsr::THRE);
    assert_eq!(usart.power(PowerState::Off), Err(Error::Busy));
    h.regs.lsr.set(lsr::THRE | lsr::TEMT);
    usart.power(PowerState::Off).unwrap();
}

#[test]
fn configure_commits_divisor_latches() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();
    usart.configure(&config::_9600_8_N_1).unwrap();

    // 12 MHz / (16 * 9600) = 78.125; the fractional search lands on
    // divisor 71 with mul 10 / add 1, within 4 Hz of the target.
    assert_eq!(h.regs.dll.get(), 71);
    assert_eq!(h.regs.dlm.get(), 0);
    assert_eq!(h.regs.fdr.get(), 0xA1);
    assert_eq!(h.regs.lcr.get() & registers::lcr::DLAB, 0);
    // 8N1: word length field 3, no parity, one stop bit.
    assert_eq!(h.regs.lcr.get() & 0x3F, 3);
    assert_eq!(usart.baudrate().to_Hz(), 9603);
    assert!(!usart.status().tx_busy);
}

#[test]
fn out_of_tolerance_rate_leaves_instance_unconfigured() {
    let h = Harness::new(15_520);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();
    let cfg = config::Config::new(
        1000.Hz(),
        config::DataBits::Eight,
        None,
        config::StopBits::One,
    );
    assert_eq!(usart.configure(&cfg), Err(Error::BaudRateOutOfTolerance));
    assert_eq!(unsafe { usart.send(b"x") }, Err(Error::NotConfigured));
}

#[test]
fn unsupported_mode_keeps_previous_configuration() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let cfg = config::_9600_8_N_1.mode(Mode::IrDA);
    assert_eq!(usart.configure(&cfg), Err(Error::UnsupportedCapability));
    // Still in asynchronous mode and operational.
    assert_eq!(unsafe { usart.send(b"x") }, Ok(()));
}

#[test]
fn synchronous_mode_requires_supported_clock_format() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();

    let mut cfg = config::_9600_8_N_1.mode(Mode::SynchronousMaster);
    cfg.clock_polarity = config::ClockPolarity::IdleHigh;
    assert_eq!(usart.configure(&cfg), Err(Error::InvalidClockConfiguration));
}

#[test]
fn send_refuses_overlapping_sends() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    unsafe { usart.send(b"ab") }.unwrap();
    assert_eq!(unsafe { usart.send(b"cd") }, Err(Error::Busy));
    assert_eq!(unsafe { usart.send(b"") }, Err(Error::InvalidParameter));
}

#[test]
fn send_completes_on_thre_interrupt() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    unsafe { usart.send(b"abc") }.unwrap();
    // Fits the FIFO, primed in one burst.
    assert_eq!(usart.tx_count(), 3);
    assert_ne!(h.regs.ier.get() & registers::ier::THREIE, 0);

    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::SEND_COMPLETE));
    assert_eq!(h.regs.ier.get() & registers::ier::THREIE, 0);
    assert_eq!(unsafe { usart.send(b"next") }, Ok(()));
}

#[test]
fn receive_drains_fifo_and_reports_completion() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 3];
    unsafe { usart.receive(&mut buf) }.unwrap();
    assert!(usart.status().rx_busy);

    h.regs.rbr.set(0x55);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();

    assert_eq!(buf, [0x55; 3]);
    assert_eq!(usart.rx_count(), 3);
    assert!(!usart.status().rx_busy);
    assert_eq!(usart.take_event(), Some(Event::RECEIVE_COMPLETE));
}

#[test]
fn completed_receive_ignores_stale_rx_data_dispatch() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 2];
    unsafe { usart.receive(&mut buf) }.unwrap();
    h.regs.rbr.set(0x5A);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::RECEIVE_COMPLETE));

    // A late RX-data dispatch with nothing outstanding must not write
    // past the finished buffer.
    usart.handle_interrupt();
    assert_eq!(usart.rx_count(), 2);
    assert_eq!(usart.take_event(), None);
}

#[test]
fn character_timeout_reports_rx_timeout() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 4];
    unsafe { usart.receive(&mut buf) }.unwrap();

    // Line went quiet with no data pending and the count unmet.
    h.regs.iir.set(iir::ID_CHAR_TIMEOUT);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::RX_TIMEOUT));
    assert!(usart.status().rx_busy);
}

#[test]
fn break_wins_over_framing_error() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 8];
    unsafe { usart.receive(&mut buf) }.unwrap();

    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::BI | lsr::FE);
    h.regs.iir.set(iir::ID_RX_LINE);
    usart.handle_interrupt();

    let event = usart.take_event().unwrap();
    assert!(event.contains(Event::RX_BREAK));
    assert!(!event.contains(Event::RX_FRAMING_ERROR));
    assert!(usart.status().rx_break);
    assert!(!usart.status().rx_framing_error);
}

#[test]
fn sticky_rx_flags_clear_on_next_receive() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 2];
    unsafe { usart.receive(&mut buf) }.unwrap();
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::OE);
    h.regs.iir.set(iir::ID_RX_LINE);
    usart.handle_interrupt();
    assert!(usart.status().rx_overflow);

    usart.abort_receive().unwrap();
    h.regs.lsr.set(lsr::THRE | lsr::TEMT);
    unsafe { usart.receive(&mut buf) }.unwrap();
    assert!(!usart.status().rx_overflow);
}

#[test]
fn sync_master_send_pairs_a_dummy_receive() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    unsafe { usart.send(b"hi") }.unwrap();
    // The discarding receive runs alongside the send.
    assert!(usart.status().rx_busy);

    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();
    // Completion waits for the paired receive.
    assert_eq!(usart.take_event(), None);

    h.regs.rbr.set(0);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::SEND_COMPLETE));
    assert!(!usart.status().rx_busy);
}

#[test]
fn sync_receive_clocks_out_the_fill_value() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));
    usart.set_default_tx_value(0xA5).unwrap();

    let mut buf = [0u8; 2];
    unsafe { usart.receive(&mut buf) }.unwrap();
    // The pacing dummy send pushed the fill value, not buffer bytes.
    assert_eq!(h.regs.thr.get(), 0xA5);
    assert_eq!(usart.tx_count(), 2);

    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();
    h.regs.rbr.set(0x7E);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();

    assert_eq!(buf, [0x7E; 2]);
    assert_eq!(usart.take_event(), Some(Event::RECEIVE_COMPLETE));
}

#[test]
fn transfer_requires_a_synchronous_mode() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let out = [1u8, 2];
    let mut inp = [0u8; 2];
    assert_eq!(
        unsafe { usart.transfer(&out, &mut inp) },
        Err(Error::NotConfigured)
    );
}

#[test]
fn transfer_completes_both_directions_as_one_event() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    let out = [0x11u8, 0x22, 0x33];
    let mut inp = [0u8; 3];
    unsafe { usart.transfer(&out, &mut inp) }.unwrap();
    assert_eq!(usart.tx_count(), 3);

    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), None);

    h.regs.rbr.set(0x44);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::TRANSFER_COMPLETE));
    assert_eq!(inp, [0x44; 3]);
}

#[test]
fn mismatched_transfer_lengths_are_invalid() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    let out = [1u8, 2, 3];
    let mut inp = [0u8; 2];
    assert_eq!(
        unsafe { usart.transfer(&out, &mut inp) },
        Err(Error::InvalidParameter)
    );
}

#[test]
fn abort_receive_idles_the_receiver() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 4];
    unsafe { usart.receive(&mut buf) }.unwrap();
    usart.abort_receive().unwrap();

    assert!(!usart.status().rx_busy);
    assert_eq!(h.regs.ier.get() & registers::ier::RBRIE, 0);
    assert_ne!(h.regs.fcr.get() & registers::fcr::RXFIFORES, 0);
    unsafe { usart.receive(&mut buf) }.unwrap();
    assert_eq!(usart.rx_count(), 0);
}

#[test]
fn abort_send_resets_the_transmit_fifo() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    unsafe { usart.send(b"pending") }.unwrap();
    usart.abort_send().unwrap();

    assert_eq!(h.regs.ier.get() & registers::ier::THREIE, 0);
    assert_ne!(h.regs.fcr.get() & registers::fcr::TXFIFORES, 0);
    assert_eq!(unsafe { usart.send(b"again") }, Ok(()));
}

#[test]
fn abort_transfer_consumes_the_sync_pairing() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    let out = [1u8, 2];
    let mut inp = [0u8; 2];
    unsafe { usart.transfer(&out, &mut inp) }.unwrap();
    usart.abort_transfer().unwrap();

    assert!(!usart.status().rx_busy);
    // A fresh send starts a new pairing instead of inheriting the old tag.
    unsafe { usart.send(b"xy") }.unwrap();
    assert!(usart.status().rx_busy);
}

#[test]
fn refused_transfer_keeps_the_receive_pairing() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    let mut buf = [0u8; 2];
    unsafe { usart.receive(&mut buf) }.unwrap();

    let out = [1u8, 2];
    let mut inp = [0u8; 2];
    assert_eq!(unsafe { usart.transfer(&out, &mut inp) }, Err(Error::Busy));

    // The outstanding receive still completes as a receive, not as a
    // bidirectional transfer.
    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();
    h.regs.rbr.set(0x5A);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();
    assert_eq!(usart.take_event(), Some(Event::RECEIVE_COMPLETE));
}

#[test]
fn dma_send_programs_the_engine() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1);

    unsafe { usart.send(b"dma out") }.unwrap();
    let configured = h.engine.configured.borrow();
    let (channel, request) = configured.last().copied().unwrap();
    assert_eq!(channel, 0);
    assert_eq!(request.len, 7);
    assert_eq!(request.direction, TransferDirection::MemoryToPeripheral);
    assert!(request.src_increment);
    assert!(!request.dst_increment);
    drop(configured);

    usart.handle_dma_tx_event(DmaEvent::TerminalCount);
    assert_eq!(usart.tx_count(), 7);
    assert_eq!(usart.take_event(), Some(Event::SEND_COMPLETE));
}

#[test]
fn dma_receive_completion_and_abort_use_the_rx_channel() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 5];
    unsafe { usart.receive(&mut buf) }.unwrap();
    let (channel, request) = h.engine.configured.borrow().last().copied().unwrap();
    assert_eq!(channel, 1);
    assert_eq!(request.direction, TransferDirection::PeripheralToMemory);
    assert!(!request.src_increment);
    assert!(request.dst_increment);

    usart.abort_receive().unwrap();
    assert_eq!(h.engine.disabled.borrow().as_slice(), &[1]);
    assert!(!usart.status().rx_busy);
}

#[test]
fn busy_engine_maps_to_driver_busy() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1);

    h.engine.busy.set(true);
    assert_eq!(unsafe { usart.send(b"xy") }, Err(Error::Busy));
    h.engine.busy.set(false);
    assert_eq!(unsafe { usart.send(b"xy") }, Ok(()));
}

#[test]
fn failed_dma_send_releases_the_paired_dummy_receive() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    // The pacing receive arms first; the send channel then refuses.
    h.engine.busy_channel.set(Some(0));
    assert_eq!(unsafe { usart.send(b"ab") }, Err(Error::Busy));
    assert!(!usart.status().rx_busy);
    assert_eq!(h.engine.disabled.borrow().as_slice(), &[1]);

    // Nothing stays wedged: a plain receive works afterwards.
    h.engine.busy_channel.set(None);
    let mut buf = [0u8; 2];
    unsafe { usart.receive(&mut buf) }.unwrap();
}

#[test]
fn failed_dummy_send_disarms_the_receive_channel() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousMaster));

    h.engine.busy_channel.set(Some(0));
    let mut buf = [0u8; 2];
    assert_eq!(unsafe { usart.receive(&mut buf) }, Err(Error::Busy));
    assert!(!usart.status().rx_busy);
    assert_eq!(h.engine.disabled.borrow().as_slice(), &[1]);
}

#[test]
fn engine_errors_are_silent() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::usart(true, true), true);
    bring_up(&usart, &config::_9600_8_N_1);

    let mut buf = [0u8; 5];
    unsafe { usart.receive(&mut buf) }.unwrap();
    usart.handle_dma_rx_event(DmaEvent::Error);
    assert_eq!(usart.take_event(), None);
    // The transfer stays pending until the caller aborts it.
    assert!(usart.status().rx_busy);
}

#[test]
fn slave_overrun_during_send_reports_tx_underflow() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1.mode(Mode::SynchronousSlave));

    unsafe { usart.send(b"ab") }.unwrap();
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::OE);
    h.regs.iir.set(iir::ID_RX_LINE);
    usart.handle_interrupt();

    let event = usart.take_event().unwrap();
    assert!(event.contains(Event::RX_OVERFLOW));
    assert!(event.contains(Event::TX_UNDERFLOW));
    assert!(usart.status().tx_underflow);

    // The sticky flag clears when the next send starts.
    usart.abort_transfer().unwrap();
    h.regs.lsr.set(lsr::THRE | lsr::TEMT);
    unsafe { usart.send(b"cd") }.unwrap();
    assert!(!usart.status().tx_underflow);
}

#[test]
fn modem_delta_raises_events_and_status_tracks_lines() {
    let h = Harness::new(12_000_000);
    let usart = h.usart_with(Capabilities::modem_uart(false), false);
    bring_up(&usart, &config::_9600_8_N_1);

    h.regs.msr.set(registers::msr::DCTS | registers::msr::CTS);
    h.regs.iir.set(iir::ID_MODEM_STATUS);
    usart.handle_interrupt();

    assert_eq!(usart.take_event(), Some(Event::CTS_CHANGED));
    let status = usart.modem_status();
    assert!(status.cts);
    assert!(!status.dsr);
}

#[test]
fn modem_control_requires_wired_lines() {
    let h = Harness::new(12_000_000);
    let plain = h.usart();
    bring_up(&plain, &config::_9600_8_N_1);
    assert_eq!(
        plain.set_modem_control(ModemControl::RtsSet),
        Err(Error::UnsupportedCapability)
    );

    let h2 = Harness::new(12_000_000);
    let modem = h2.usart_with(Capabilities::modem_uart(false), false);
    bring_up(&modem, &config::_9600_8_N_1);
    modem.set_modem_control(ModemControl::RtsSet).unwrap();
    assert_ne!(h2.regs.mcr.get() & registers::mcr::RTSCTRL, 0);
    modem.set_modem_control(ModemControl::RtsClear).unwrap();
    assert_eq!(h2.regs.mcr.get() & registers::mcr::RTSCTRL, 0);
}

#[test]
fn flow_control_needs_the_capability() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();

    let mut cfg = config::_9600_8_N_1;
    cfg.flow_control = config::FlowControl::RtsCts;
    assert_eq!(usart.configure(&cfg), Err(Error::UnsupportedCapability));

    let h2 = Harness::new(12_000_000);
    let modem = h2.usart_with(Capabilities::modem_uart(false), false);
    modem.initialize(None).unwrap();
    modem.power(PowerState::Full).unwrap();
    modem.configure(&cfg).unwrap();
    let mcr = h2.regs.mcr.get();
    assert_ne!(mcr & registers::mcr::RTSEN, 0);
    assert_ne!(mcr & registers::mcr::CTSEN, 0);
}

#[test]
fn irda_pulse_divider_selection() {
    let h = Harness::new(12_000_000);
    let caps = Capabilities {
        irda: true,
        ..Capabilities::usart(false, false)
    };
    let usart = h.usart_with(caps, false);
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();

    // One period at 12 MHz is 83 ns; 150 ns fits two periods.
    usart.set_irda_pulse(150).unwrap();
    let icr = h.regs.icr.get();
    assert_ne!(icr & registers::icr::FIXPULSEEN, 0);
    assert_eq!(icr & registers::icr::PULSEDIV_MASK, 0);

    // 600 ns needs eight periods.
    usart.set_irda_pulse(600).unwrap();
    assert_eq!(
        h.regs.icr.get() & registers::icr::PULSEDIV_MASK,
        2 << registers::icr::PULSEDIV_POS
    );

    // Longer than 256 periods cannot be generated.
    assert_eq!(usart.set_irda_pulse(50_000), Err(Error::InvalidParameter));

    usart.set_irda_pulse(0).unwrap();
    assert_eq!(h.regs.icr.get() & registers::icr::FIXPULSEEN, 0);
}

#[test]
fn irda_pulse_width_survives_slow_base_clocks() {
    // 8 Hz makes one period 125 ms; 64 of those overflow a u32 of
    // nanoseconds, so the divider math has to run wider.
    let h = Harness::new(8);
    let caps = Capabilities {
        irda: true,
        ..Capabilities::usart(false, false)
    };
    let usart = h.usart_with(caps, false);
    usart.initialize(None).unwrap();
    usart.power(PowerState::Full).unwrap();

    usart.set_irda_pulse(4_200_000_000).unwrap();
    assert_eq!(
        h.regs.icr.get() & registers::icr::PULSEDIV_MASK,
        5 << registers::icr::PULSEDIV_POS
    );
}

#[test]
fn smart_card_controls() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    usart.set_smart_card_guard_time(0x20).unwrap();
    assert_eq!(
        h.regs.scictrl.get() & registers::scictrl::GUARDTIME_MASK,
        0x20 << registers::scictrl::GUARDTIME_POS
    );
    assert_eq!(
        usart.set_smart_card_guard_time(0x100),
        Err(Error::InvalidParameter)
    );

    // The clock output is fixed at 372 clocks per bit.
    usart.set_smart_card_clock(0).unwrap();
    usart.set_smart_card_clock(9600 * 372).unwrap();
    assert_eq!(
        usart.set_smart_card_clock(1_000_000),
        Err(Error::InvalidParameter)
    );

    usart.set_smart_card_nack(false).unwrap();
    assert_ne!(h.regs.scictrl.get() & registers::scictrl::NACKDIS, 0);
    usart.set_smart_card_nack(true).unwrap();
    assert_eq!(h.regs.scictrl.get() & registers::scictrl::NACKDIS, 0);
}

#[test]
fn poll_events_combines_queued_masks() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    unsafe { usart.send(b"a") }.unwrap();
    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();

    let mut buf = [0u8; 1];
    unsafe { usart.receive(&mut buf) }.unwrap();
    h.regs.rbr.set(0x31);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    h.regs.iir.set(iir::ID_RX_DATA);
    usart.handle_interrupt();

    let combined = usart.poll_events();
    assert!(combined.contains(Event::SEND_COMPLETE));
    assert!(combined.contains(Event::RECEIVE_COMPLETE));
    assert!(usart.poll_events().is_empty());
}

static LAST_EVENT: CsMutex<Cell<u32>> = CsMutex::new(Cell::new(0));

fn record_event(event: Event) {
    critical_section::with(|cs| LAST_EVENT.borrow(cs).set(event.bits()));
}

#[test]
fn registered_handler_sees_events_directly() {
    let h = Harness::new(12_000_000);
    let usart = h.usart();
    usart.initialize(Some(record_event)).unwrap();
    usart.power(PowerState::Full).unwrap();
    usart.configure(&config::_9600_8_N_1).unwrap();
    usart.enable_transmitter(true).unwrap();

    unsafe { usart.send(b"a") }.unwrap();
    h.regs.iir.set(iir::ID_THRE);
    usart.handle_interrupt();

    let bits = critical_section::with(|cs| LAST_EVENT.borrow(cs).get());
    assert_eq!(bits, Event::SEND_COMPLETE.bits());
    // Handler delivery bypasses the queue.
    assert_eq!(usart.take_event(), None);
}

#[test]
fn registry_routes_vectors_to_instances() {
    let h: &'static Harness = Box::leak(Box::new(Harness::new(12_000_000)));
    let usart: &'static Usart<'static> = Box::leak(Box::new(h.usart()));
    bring_up(usart, &config::_9600_8_N_1);

    static REGISTRY: InstanceRegistry = InstanceRegistry::new();
    REGISTRY.register(usart).unwrap();

    unsafe { usart.send(b"a") }.unwrap();
    h.regs.iir.set(iir::ID_THRE);
    assert!(REGISTRY.dispatch(InterruptVector(24)));
    assert_eq!(usart.take_event(), Some(Event::SEND_COMPLETE));
    assert!(!REGISTRY.dispatch(InterruptVector(99)));
}

#[test]
fn blocking_and_polled_io() {
    let h = Harness::new(12_000_000);
    let mut usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    usart.write_full_blocking(b"ok");
    assert_eq!(h.regs.thr.get(), u32::from(b'k'));

    h.regs.rbr.set(0x41);
    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR);
    let mut buf = [0u8; 2];
    usart.read_full_blocking(&mut buf).unwrap();
    assert_eq!(buf, [0x41; 2]);

    // embedded-io read takes what the FIFO offers.
    let mut buf = [0u8; 4];
    assert_eq!(embedded_io::Read::read(&mut usart, &mut buf), Ok(4));

    // nb write reports WouldBlock while the holding register is full.
    h.regs.lsr.set(0);
    assert_eq!(
        embedded_hal_nb::serial::Write::write(&mut usart, b'x'),
        Err(nb::Error::WouldBlock)
    );
    h.regs.lsr.set(lsr::THRE | lsr::TEMT);
    embedded_hal_nb::serial::Write::write(&mut usart, b'x').unwrap();
}

#[test]
fn line_faults_surface_through_polled_reads() {
    let h = Harness::new(12_000_000);
    let mut usart = h.usart();
    bring_up(&usart, &config::_9600_8_N_1);

    h.regs.lsr.set(lsr::THRE | lsr::TEMT | lsr::RDR | lsr::OE);
    let mut buf = [0u8; 1];
    assert_eq!(
        usart.read_full_blocking(&mut buf),
        Err(super::LineError::Overrun)
    );
    assert_eq!(
        embedded_hal_nb::serial::Read::read(&mut usart),
        Err(nb::Error::Other(super::LineError::Overrun))
    );
}
