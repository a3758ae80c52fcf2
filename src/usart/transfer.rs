//! Non-blocking send/receive/transfer state machines.
//!
//! A transfer is started by [`Usart::send`], [`Usart::receive`] or
//! [`Usart::transfer`] and then driven to completion by the interrupt
//! handler or the transfer engine; the starting call only records the
//! buffer, primes the FIFO (or programs the engine channel) and returns.
//!
//! In the synchronous modes the two directions are paired: a send starts a
//! discarding dummy receive, a receive starts a dummy send clocking out the
//! fill value, and the pairing is tracked with a [`SyncMode`] tag that is
//! consumed when the receive side completes.

use core::cell::Cell;
use core::ptr;

use crate::platform::{TransferDirection, TransferRequest};
use crate::registers::{fcr, ier, lsr};
use crate::Error;

use super::{State, Usart};

/// Pairing tag of the synchronous-mode direction coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncMode {
    /// No synchronous operation in progress.
    #[default]
    Idle,
    /// Application send, paired with a discarding dummy receive.
    TxOnly,
    /// Application receive, paired with a fill-value dummy send.
    RxOnly,
    /// Full-duplex transfer with two application buffers.
    TxAndRx,
}

/// Runtime state of the two transfer directions.
pub(crate) struct TransferState {
    pub(crate) tx_buf: Cell<*const u8>,
    pub(crate) tx_num: Cell<usize>,
    pub(crate) tx_cnt: Cell<usize>,
    /// Character clocked out by dummy sends.
    pub(crate) tx_fill: Cell<u8>,
    pub(crate) send_active: Cell<bool>,

    pub(crate) rx_buf: Cell<*mut u8>,
    pub(crate) rx_num: Cell<usize>,
    pub(crate) rx_cnt: Cell<usize>,
    pub(crate) rx_busy: Cell<bool>,
    /// Landing byte for non-incrementing dummy engine reads.
    pub(crate) rx_dump: Cell<u8>,

    pub(crate) sync_mode: Cell<SyncMode>,
}

impl TransferState {
    pub(crate) const fn new() -> Self {
        TransferState {
            tx_buf: Cell::new(ptr::null()),
            tx_num: Cell::new(0),
            tx_cnt: Cell::new(0),
            tx_fill: Cell::new(0),
            send_active: Cell::new(false),
            rx_buf: Cell::new(ptr::null_mut()),
            rx_num: Cell::new(0),
            rx_cnt: Cell::new(0),
            rx_busy: Cell::new(false),
            rx_dump: Cell::new(0),
            sync_mode: Cell::new(SyncMode::Idle),
        }
    }

    pub(crate) fn reset(&self) {
        self.tx_buf.set(ptr::null());
        self.tx_num.set(0);
        self.tx_cnt.set(0);
        self.tx_fill.set(0);
        self.send_active.set(false);
        self.rx_buf.set(ptr::null_mut());
        self.rx_num.set(0);
        self.rx_cnt.set(0);
        self.rx_busy.set(false);
        self.sync_mode.set(SyncMode::Idle);
    }

    pub(crate) fn rx_busy(&self) -> bool {
        self.rx_busy.get()
    }

    pub(crate) fn send_active(&self) -> bool {
        self.send_active.get()
    }

    pub(crate) fn set_tx_fill(&self, value: u8) {
        self.tx_fill.set(value);
    }
}

impl Usart<'_> {
    /// Starts sending `data`.
    ///
    /// Returns as soon as the transfer is underway; completion is reported
    /// as [`Event::SEND_COMPLETE`](crate::Event::SEND_COMPLETE) (or
    /// `TRANSFER_COMPLETE` in a paired synchronous transfer). In a
    /// synchronous mode a discarding dummy receive of the same length is
    /// started alongside.
    ///
    /// # Safety
    ///
    /// `data` must stay valid and unmodified until the completion event is
    /// delivered or the send is aborted; the interrupt handler and the
    /// transfer engine read from it after this call returns.
    pub unsafe fn send(&self, data: &[u8]) -> Result<(), Error> {
        self.begin_send(data.as_ptr(), data.len())
    }

    /// Starts receiving into `data`.
    ///
    /// Returns as soon as the transfer is underway; completion is reported
    /// as [`Event::RECEIVE_COMPLETE`](crate::Event::RECEIVE_COMPLETE) (or
    /// `TRANSFER_COMPLETE` in a paired synchronous transfer). In a
    /// synchronous mode a dummy send of the fill value (see
    /// [`set_default_tx_value`](Self::set_default_tx_value)) paces the
    /// clock.
    ///
    /// # Safety
    ///
    /// `data` must stay valid, and must not be read or otherwise accessed,
    /// until the completion event is delivered or the receive is aborted;
    /// the interrupt handler and the transfer engine write into it after
    /// this call returns.
    pub unsafe fn receive(&self, data: &mut [u8]) -> Result<(), Error> {
        self.begin_receive(data.as_mut_ptr(), data.len())
    }

    /// Starts a full-duplex synchronous transfer.
    ///
    /// Both buffers must have the same non-zero length. Completion of both
    /// directions is reported as one
    /// [`Event::TRANSFER_COMPLETE`](crate::Event::TRANSFER_COMPLETE).
    /// Refused outside the synchronous modes.
    ///
    /// # Safety
    ///
    /// Both buffers must stay valid and untouched until the completion
    /// event is delivered or the transfer is aborted.
    pub unsafe fn transfer(&self, data_out: &[u8], data_in: &mut [u8]) -> Result<(), Error> {
        if data_out.is_empty() || data_out.len() != data_in.len() {
            return Err(Error::InvalidParameter);
        }
        self.check_configured()?;
        if !self.mode_is_synchronous() {
            return Err(Error::NotConfigured);
        }

        // A refusal must leave an outstanding operation's pairing intact.
        let previous = self.xfer.sync_mode.get();
        self.xfer.sync_mode.set(SyncMode::TxAndRx);
        if let Err(e) = self.begin_receive(data_in.as_mut_ptr(), data_in.len()) {
            self.xfer.sync_mode.set(previous);
            return Err(e);
        }
        if let Err(e) = self.begin_send(data_out.as_ptr(), data_out.len()) {
            self.idle_rx_side();
            self.xfer.sync_mode.set(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Number of bytes handed to the transmitter so far.
    pub fn tx_count(&self) -> usize {
        self.xfer.tx_cnt.get()
    }

    /// Number of bytes taken from the receiver so far.
    pub fn rx_count(&self) -> usize {
        self.xfer.rx_cnt.get()
    }

    fn begin_send(&self, src: *const u8, num: usize) -> Result<(), Error> {
        if src.is_null() || num == 0 {
            return Err(Error::InvalidParameter);
        }
        self.check_configured()?;
        if self.xfer.send_active.get() {
            return Err(Error::Busy);
        }
        self.xfer.send_active.set(true);
        self.set_tx_underflow(false);

        let mut src_increment = true;
        let mut paired_receive = false;
        if self.mode_is_synchronous() {
            match self.xfer.sync_mode.get() {
                SyncMode::Idle => {
                    // Pair a discarding dummy receive with the send.
                    self.xfer.sync_mode.set(SyncMode::TxOnly);
                    if let Err(e) = self.begin_receive(self.xfer.rx_dump.as_ptr(), num) {
                        self.xfer.send_active.set(false);
                        self.xfer.sync_mode.set(SyncMode::Idle);
                        return Err(e);
                    }
                    paired_receive = true;
                }
                SyncMode::RxOnly => src_increment = false,
                _ => {}
            }
        }

        self.xfer.tx_buf.set(src);
        self.xfer.tx_num.set(num);
        self.xfer.tx_cnt.set(0);

        let regs = self.regs();
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_tx, self.services().transfer_engine)
        {
            engine.select_peripheral(binding.peripheral, binding.peripheral_select);
            let request = TransferRequest {
                src,
                dst: regs.thr.as_ptr() as *mut u8,
                len: num,
                src_increment,
                dst_increment: false,
                direction: TransferDirection::MemoryToPeripheral,
                peripheral: binding.peripheral,
            };
            if engine.configure(binding.channel, &request).is_err() {
                self.xfer.send_active.set(false);
                if paired_receive {
                    // The dummy receive armed above must not outlive the
                    // refused send.
                    self.idle_rx_side();
                    self.xfer.sync_mode.set(SyncMode::Idle);
                }
                return Err(Error::Busy);
            }
        } else {
            // Prime the FIFO so the first THRE interrupt finds it draining.
            if regs.lsr.get() & lsr::TEMT != 0 {
                let mut room = 16;
                while room > 0 && self.xfer.tx_cnt.get() != self.xfer.tx_num.get() {
                    let byte = if self.mode_is_synchronous()
                        && self.xfer.sync_mode.get() == SyncMode::RxOnly
                    {
                        self.xfer.tx_fill.get()
                    } else {
                        // Safety: send/receive contract keeps src valid.
                        unsafe { *src.add(self.xfer.tx_cnt.get()) }
                    };
                    regs.thr.set(u32::from(byte));
                    self.xfer.tx_cnt.set(self.xfer.tx_cnt.get() + 1);
                    room -= 1;
                }
            }
            regs.ier.set(regs.ier.get() | ier::THREIE);
        }
        Ok(())
    }

    fn begin_receive(&self, dst: *mut u8, num: usize) -> Result<(), Error> {
        if dst.is_null() || num == 0 {
            return Err(Error::InvalidParameter);
        }
        self.check_configured()?;
        if self.xfer.rx_busy.get() {
            return Err(Error::Busy);
        }
        self.xfer.rx_busy.set(true);

        self.set_rx_overflow(false);
        self.set_rx_break(false);
        self.set_rx_framing_error(false);
        self.set_rx_parity_error(false);

        self.xfer.rx_buf.set(dst);
        self.xfer.rx_num.set(num);
        self.xfer.rx_cnt.set(0);

        let dst_increment =
            !(self.mode_is_synchronous() && self.xfer.sync_mode.get() == SyncMode::TxOnly);

        let regs = self.regs();
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_rx, self.services().transfer_engine)
        {
            engine.select_peripheral(binding.peripheral, binding.peripheral_select);
            let request = TransferRequest {
                src: regs.rbr.as_ptr() as *const u8,
                dst,
                len: num,
                src_increment: false,
                dst_increment,
                direction: TransferDirection::PeripheralToMemory,
                peripheral: binding.peripheral,
            };
            engine.configure(binding.channel, &request).map_err(|_| {
                self.xfer.rx_busy.set(false);
                Error::Busy
            })?;
        } else {
            regs.ier.set(regs.ier.get() | ier::RBRIE);
        }

        if self.mode_is_synchronous() && self.xfer.sync_mode.get() == SyncMode::Idle {
            // Pair a fill-value dummy send to pace the clock.
            self.xfer.sync_mode.set(SyncMode::RxOnly);
            if let Err(e) = self.begin_send(self.xfer.tx_fill.as_ptr() as *const u8, num) {
                // Disarm the receive side set up above, engine channel
                // included.
                self.idle_rx_side();
                self.xfer.sync_mode.set(SyncMode::Idle);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stops an outstanding send, resetting the transmit FIFO.
    ///
    /// When the send was the paired half of a synchronous operation the
    /// dummy receive is idled with it.
    pub fn abort_send(&self) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        regs.ier.set(regs.ier.get() & !ier::THREIE);
        regs.fcr.set(self.fcr_base() | fcr::TXFIFORES);
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_tx, self.services().transfer_engine)
        {
            if self.xfer.send_active.get() {
                engine.disable(binding.channel);
            }
        }
        self.xfer.send_active.set(false);

        if self.xfer.sync_mode.get() == SyncMode::TxOnly {
            self.idle_rx_side();
            self.xfer.sync_mode.set(SyncMode::Idle);
        }
        Ok(())
    }

    /// Stops an outstanding receive, resetting the receive FIFO.
    ///
    /// When the receive was the paired half of a synchronous operation the
    /// dummy send is idled with it.
    pub fn abort_receive(&self) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        regs.ier.set(regs.ier.get() & !ier::RBRIE);
        regs.fcr.set(self.fcr_base() | fcr::RXFIFORES);
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_rx, self.services().transfer_engine)
        {
            if self.xfer.rx_busy.get() {
                engine.disable(binding.channel);
            }
        }
        self.xfer.rx_busy.set(false);

        if self.xfer.sync_mode.get() == SyncMode::RxOnly {
            self.idle_tx_side();
            self.xfer.sync_mode.set(SyncMode::Idle);
        }
        Ok(())
    }

    /// Stops both directions and resets both FIFOs.
    pub fn abort_transfer(&self) -> Result<(), Error> {
        if self.state.get() < State::Powered {
            return Err(Error::NotPowered);
        }
        let regs = self.regs();
        regs.ier
            .set(regs.ier.get() & !(ier::THREIE | ier::RBRIE));
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_tx, self.services().transfer_engine)
        {
            if self.xfer.send_active.get() {
                engine.disable(binding.channel);
            }
        }
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_rx, self.services().transfer_engine)
        {
            if self.xfer.rx_busy.get() {
                engine.disable(binding.channel);
            }
        }
        regs.fcr
            .set(self.fcr_base() | fcr::TXFIFORES | fcr::RXFIFORES);
        self.xfer.send_active.set(false);
        self.xfer.rx_busy.set(false);
        self.xfer.sync_mode.set(SyncMode::Idle);
        Ok(())
    }

    fn idle_rx_side(&self) {
        let regs = self.regs();
        regs.ier.set(regs.ier.get() & !ier::RBRIE);
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_rx, self.services().transfer_engine)
        {
            if self.xfer.rx_busy.get() {
                engine.disable(binding.channel);
            }
        }
        self.xfer.rx_busy.set(false);
    }

    fn idle_tx_side(&self) {
        let regs = self.regs();
        regs.ier.set(regs.ier.get() & !ier::THREIE);
        if let (Some(binding), Some(engine)) =
            (self.resources().dma_tx, self.services().transfer_engine)
        {
            if self.xfer.send_active.get() {
                engine.disable(binding.channel);
            }
        }
        self.xfer.send_active.set(false);
    }
}
