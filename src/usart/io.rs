//! Polled byte I/O and the `embedded-hal-nb`/`embedded-io` surfaces.
//!
//! These paths talk to the FIFOs directly and bypass the event machinery;
//! they are meant for simple consoles and boot-time logging. Do not mix
//! them with an outstanding non-blocking transfer on the same direction.

use embedded_hal_nb::serial;
use embedded_io::{Read, ReadReady, Write, WriteReady};

use crate::registers::lsr;

use super::Usart;

/// A line fault observed while reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// Receive data was lost to an overrun.
    Overrun,
    /// Parity check failed.
    Parity,
    /// Stop bit missing.
    Framing,
    /// Break condition on the line.
    Break,
}

impl LineError {
    fn from_lsr(status: u32) -> Option<LineError> {
        if status & lsr::OE != 0 {
            Some(LineError::Overrun)
        } else if status & lsr::PE != 0 {
            Some(LineError::Parity)
        } else if status & lsr::BI != 0 {
            Some(LineError::Break)
        } else if status & lsr::FE != 0 {
            Some(LineError::Framing)
        } else {
            None
        }
    }
}

impl serial::Error for LineError {
    fn kind(&self) -> serial::ErrorKind {
        match self {
            LineError::Overrun => serial::ErrorKind::Overrun,
            LineError::Parity => serial::ErrorKind::Parity,
            LineError::Framing => serial::ErrorKind::FrameFormat,
            LineError::Break => serial::ErrorKind::Other,
        }
    }
}

impl embedded_io::Error for LineError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl Usart<'_> {
    /// Whether the transmit holding register can take another byte.
    pub fn is_writable(&self) -> bool {
        self.regs().lsr.get() & lsr::THRE != 0
    }

    /// Whether a received byte is waiting in the FIFO.
    pub fn is_readable(&self) -> bool {
        self.regs().lsr.get() & lsr::RDR != 0
    }

    /// Writes `data` to the transmitter, spinning on the FIFO.
    pub fn write_full_blocking(&self, data: &[u8]) {
        for &byte in data {
            while !self.is_writable() {}
            self.regs().thr.set(u32::from(byte));
        }
    }

    /// Fills `buf` from the receiver, spinning on the FIFO.
    ///
    /// Stops at the first line fault.
    pub fn read_full_blocking(&self, buf: &mut [u8]) -> Result<(), LineError> {
        for slot in buf.iter_mut() {
            loop {
                let status = self.regs().lsr.get();
                if let Some(err) = LineError::from_lsr(status) {
                    return Err(err);
                }
                if status & lsr::RDR != 0 {
                    *slot = self.regs().rbr.get() as u8;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl serial::ErrorType for Usart<'_> {
    type Error = LineError;
}

impl serial::Read<u8> for Usart<'_> {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let status = self.regs().lsr.get();
        if let Some(err) = LineError::from_lsr(status) {
            return Err(nb::Error::Other(err));
        }
        if status & lsr::RDR == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.regs().rbr.get() as u8)
    }
}

impl serial::Write<u8> for Usart<'_> {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if !self.is_writable() {
            return Err(nb::Error::WouldBlock);
        }
        self.regs().thr.set(u32::from(word));
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.regs().lsr.get() & lsr::TEMT == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }
}

impl embedded_io::ErrorType for Usart<'_> {
    type Error = LineError;
}

impl Read for Usart<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let status = self.regs().lsr.get();
            if let Some(err) = LineError::from_lsr(status) {
                return Err(err);
            }
            if status & lsr::RDR != 0 {
                break;
            }
        }
        let mut count = 0;
        while count < buf.len() && self.is_readable() {
            buf[count] = self.regs().rbr.get() as u8;
            count += 1;
        }
        Ok(count)
    }
}

impl ReadReady for Usart<'_> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.is_readable())
    }
}

impl Write for Usart<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.is_writable() {}
        let mut count = 0;
        while count < buf.len() && self.is_writable() {
            self.regs().thr.set(u32::from(buf[count]));
            count += 1;
        }
        Ok(count)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        while self.regs().lsr.get() & lsr::TEMT == 0 {}
        Ok(())
    }
}

impl WriteReady for Usart<'_> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.is_writable())
    }
}
