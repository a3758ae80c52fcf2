//! Interrupt and transfer-engine completion decoding.

use crate::config::Mode;
use crate::event::Event;
use crate::platform::DmaEvent;
use crate::registers::{ier, iir, lsr, msr};

use super::transfer::SyncMode;
use super::Usart;

impl Usart<'_> {
    /// Services one activation of the instance's interrupt.
    ///
    /// Reads the interrupt identification once, runs the matching state
    /// machine step (FIFO refill, line-status capture, FIFO drain, modem
    /// delta decode) and dispatches the resulting [`Event`] mask. Call this
    /// from the vector the instance's
    /// [`InterruptVector`](crate::platform::InterruptVector) points at, or
    /// route it through the [`registry`](crate::registry).
    pub fn handle_interrupt(&self) {
        let id_word = self.regs().iir.get();
        if id_word & iir::NO_INTERRUPT_PENDING != 0 {
            return;
        }
        let id = id_word & iir::INT_ID_MASK;
        let mut event = Event::NONE;

        if id == iir::ID_THRE {
            event |= self.refill_tx_fifo();
        }

        if id == iir::ID_RX_LINE {
            event |= self.rx_line_events();
        }

        if id == iir::ID_RX_DATA || id == iir::ID_CHAR_TIMEOUT {
            event |= self.drain_rx_fifo();
        }

        if id == iir::ID_CHAR_TIMEOUT
            && !self.mode_is_synchronous()
            && self.xfer.rx_cnt.get() != self.xfer.rx_num.get()
        {
            event |= Event::RX_TIMEOUT;
        }

        if id == iir::ID_MODEM_STATUS && self.capabilities().has_modem_lines() {
            event |= self.modem_delta_events();
        }

        self.dispatch(event);
    }

    /// Tops the transmit FIFO up and reports send completion.
    fn refill_tx_fifo(&self) -> Event {
        let regs = self.regs();
        let mut room = 16;
        while room > 0 && self.xfer.tx_cnt.get() != self.xfer.tx_num.get() {
            let byte = if self.mode_is_synchronous()
                && self.xfer.sync_mode.get() == SyncMode::RxOnly
            {
                // Dummy send pacing a synchronous receive.
                self.xfer.tx_fill.get()
            } else {
                // Safety: the send contract keeps the buffer valid until
                // completion or abort.
                unsafe { *self.xfer.tx_buf.get().add(self.xfer.tx_cnt.get()) }
            };
            regs.thr.set(u32::from(byte));
            self.xfer.tx_cnt.set(self.xfer.tx_cnt.get() + 1);
            room -= 1;
        }

        if self.xfer.tx_cnt.get() != self.xfer.tx_num.get() {
            return Event::NONE;
        }
        regs.ier.set(regs.ier.get() & !ier::THREIE);
        self.xfer.send_active.set(false);

        if self.mode_is_synchronous() {
            // With the receiver running, completion is reported when the
            // paired receive finishes; a send-only operation with the
            // receiver disabled completes here.
            if self.xfer.sync_mode.get() == SyncMode::TxOnly && !self.rx_is_enabled() {
                Event::SEND_COMPLETE
            } else {
                Event::NONE
            }
        } else {
            Event::SEND_COMPLETE
        }
    }

    /// Moves pending characters out of the receive FIFO and reports
    /// completion once the requested count is reached.
    fn drain_rx_fifo(&self) -> Event {
        let regs = self.regs();
        let mut event = Event::NONE;

        // A dispatch with no receive outstanding must not touch rx_buf.
        if !self.xfer.rx_busy.get() {
            return event;
        }

        while regs.lsr.get() & lsr::RDR != 0 {
            event |= self.rx_line_events();

            let byte = regs.rbr.get() as u8;
            let discard = self.mode_is_synchronous()
                && self.xfer.sync_mode.get() == SyncMode::TxOnly;
            if !discard {
                // Safety: the receive contract keeps the buffer valid
                // until completion or abort.
                unsafe {
                    *self.xfer.rx_buf.get().add(self.xfer.rx_cnt.get()) = byte;
                }
            }
            self.xfer.rx_cnt.set(self.xfer.rx_cnt.get() + 1);

            if self.xfer.rx_cnt.get() == self.xfer.rx_num.get() {
                regs.ier.set(regs.ier.get() & !ier::RBRIE);
                self.xfer.rx_busy.set(false);
                if self.mode_is_synchronous() {
                    event |= self.consume_sync_tag();
                } else {
                    event |= Event::RECEIVE_COMPLETE;
                }
                break;
            }
        }
        event
    }

    /// Captures the receive line status into the sticky flags.
    fn rx_line_events(&self) -> Event {
        let status = self.regs().lsr.get() & lsr::LINE_INT;
        let mut event = Event::NONE;

        if status & lsr::OE != 0 {
            self.set_rx_overflow(true);
            event |= Event::RX_OVERFLOW;
            // A slave overrun during an active send means the master
            // clocked faster than data was supplied.
            if self.current_mode() == Some(Mode::SynchronousSlave)
                && self.xfer.send_active.get()
            {
                self.set_tx_underflow(true);
                event |= Event::TX_UNDERFLOW;
            }
        }
        if status & lsr::PE != 0 {
            self.set_rx_parity_error(true);
            event |= Event::RX_PARITY_ERROR;
        }
        // A break also raises the framing error flag; report the break.
        if status & lsr::BI != 0 {
            self.set_rx_break(true);
            event |= Event::RX_BREAK;
        } else if status & lsr::FE != 0 {
            self.set_rx_framing_error(true);
            event |= Event::RX_FRAMING_ERROR;
        }
        event
    }

    fn modem_delta_events(&self) -> Event {
        let caps = self.capabilities();
        let status = self.regs().msr.get();
        let mut event = Event::NONE;
        if caps.cts && status & msr::DCTS != 0 {
            event |= Event::CTS_CHANGED;
        }
        if caps.dsr && status & msr::DDSR != 0 {
            event |= Event::DSR_CHANGED;
        }
        if caps.ri && status & msr::TERI != 0 {
            event |= Event::RI_CHANGED;
        }
        if caps.dcd && status & msr::DDCD != 0 {
            event |= Event::DCD_CHANGED;
        }
        event
    }

    fn consume_sync_tag(&self) -> Event {
        let tag = self.xfer.sync_mode.get();
        self.xfer.sync_mode.set(SyncMode::Idle);
        match tag {
            SyncMode::Idle => Event::NONE,
            SyncMode::TxOnly => Event::SEND_COMPLETE,
            SyncMode::RxOnly => Event::RECEIVE_COMPLETE,
            SyncMode::TxAndRx => Event::TRANSFER_COMPLETE,
        }
    }

    /// Feeds a transmit-channel completion from the transfer engine.
    pub fn handle_dma_tx_event(&self, event: DmaEvent) {
        match event {
            DmaEvent::TerminalCount => {
                self.xfer.tx_cnt.set(self.xfer.tx_num.get());
                self.xfer.send_active.set(false);
                // Synchronous completion is reported by the receive side.
                if !self.mode_is_synchronous() {
                    self.dispatch(Event::SEND_COMPLETE);
                }
            }
            // Channel errors leave the transfer pending; the caller times
            // out and aborts.
            DmaEvent::Error => {}
        }
    }

    /// Feeds a receive-channel completion from the transfer engine.
    pub fn handle_dma_rx_event(&self, event: DmaEvent) {
        match event {
            DmaEvent::TerminalCount => {
                self.xfer.rx_cnt.set(self.xfer.rx_num.get());
                self.xfer.rx_busy.set(false);
                let evt = if self.mode_is_synchronous() {
                    self.consume_sync_tag()
                } else {
                    Event::RECEIVE_COMPLETE
                };
                self.dispatch(evt);
            }
            DmaEvent::Error => {}
        }
    }
}
