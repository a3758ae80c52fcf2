//! Register file of an LPC18xx-class USART.
//!
//! The block is modeled as one field per architectural register rather than
//! reproducing the DLAB-banked overlay of the bus layout; the driver is the
//! only writer and always knows which register it means. A board crate maps
//! the real peripheral with [`RegisterBlock::at`]; tests build a block in
//! ordinary memory with [`RegisterBlock::new`].

use vcell::VolatileCell;

/// Control, status and data registers of one USART instance.
#[repr(C)]
pub struct RegisterBlock {
    /// Receiver buffer (read side of the data register).
    pub rbr: VolatileCell<u32>,
    /// Transmit holding register (write side of the data register).
    pub thr: VolatileCell<u32>,
    /// Divisor latch, low byte.
    pub dll: VolatileCell<u32>,
    /// Divisor latch, high byte.
    pub dlm: VolatileCell<u32>,
    /// Interrupt enable register.
    pub ier: VolatileCell<u32>,
    /// Interrupt identification register.
    pub iir: VolatileCell<u32>,
    /// FIFO control register.
    pub fcr: VolatileCell<u32>,
    /// Line control register.
    pub lcr: VolatileCell<u32>,
    /// Modem control register (instances with modem lines only).
    pub mcr: VolatileCell<u32>,
    /// Line status register.
    pub lsr: VolatileCell<u32>,
    /// Modem status register (instances with modem lines only).
    pub msr: VolatileCell<u32>,
    /// Fractional divider register.
    pub fdr: VolatileCell<u32>,
    /// Transmit enable register.
    pub ter: VolatileCell<u32>,
    /// Half-duplex enable register.
    pub hden: VolatileCell<u32>,
    /// Smart card interface control register.
    pub scictrl: VolatileCell<u32>,
    /// RS-485 control register (receiver disable lives here).
    pub rs485ctrl: VolatileCell<u32>,
    /// Synchronous mode control register.
    pub syncctrl: VolatileCell<u32>,
    /// IrDA control register.
    pub icr: VolatileCell<u32>,
}

impl RegisterBlock {
    /// Creates a block in ordinary memory, with `IIR`, `LSR` and `TER` at
    /// their documented reset values.
    ///
    /// Useful for host tests and simulation backends.
    pub const fn new() -> Self {
        RegisterBlock {
            rbr: VolatileCell::new(0),
            thr: VolatileCell::new(0),
            dll: VolatileCell::new(0),
            dlm: VolatileCell::new(0),
            ier: VolatileCell::new(0),
            iir: VolatileCell::new(iir::NO_INTERRUPT_PENDING),
            fcr: VolatileCell::new(0),
            lcr: VolatileCell::new(0),
            mcr: VolatileCell::new(0),
            lsr: VolatileCell::new(lsr::THRE | lsr::TEMT),
            msr: VolatileCell::new(0),
            fdr: VolatileCell::new(0x10),
            ter: VolatileCell::new(ter::TXEN),
            hden: VolatileCell::new(0),
            scictrl: VolatileCell::new(0),
            rs485ctrl: VolatileCell::new(0),
            syncctrl: VolatileCell::new(0),
            icr: VolatileCell::new(0),
        }
    }

    /// Maps the register block of a memory-mapped peripheral.
    ///
    /// # Safety
    ///
    /// `addr` must be the base address of a USART register file that stays
    /// mapped for the `'static` lifetime, and nothing else may access those
    /// registers while the returned reference is in use.
    pub unsafe fn at(addr: usize) -> &'static RegisterBlock {
        &*(addr as *const RegisterBlock)
    }
}

impl Default for RegisterBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt enable register bits.
pub mod ier {
    /// Receive data available interrupt enable.
    pub const RBRIE: u32 = 1 << 0;
    /// Transmit holding register empty interrupt enable.
    pub const THREIE: u32 = 1 << 1;
    /// Receive line status interrupt enable.
    pub const RXIE: u32 = 1 << 2;
    /// Modem status interrupt enable.
    pub const MSIE: u32 = 1 << 3;
}

/// Interrupt identification register fields.
pub mod iir {
    /// Set while no interrupt is pending.
    pub const NO_INTERRUPT_PENDING: u32 = 1 << 0;
    /// Mask over the interrupt identification field.
    pub const INT_ID_MASK: u32 = 0xE;
    /// Modem status changed.
    pub const ID_MODEM_STATUS: u32 = 0x0;
    /// Transmit holding register empty.
    pub const ID_THRE: u32 = 0x2;
    /// Receive data available.
    pub const ID_RX_DATA: u32 = 0x4;
    /// Receive line status (overrun, parity, framing, break).
    pub const ID_RX_LINE: u32 = 0x6;
    /// Character time-out indication.
    pub const ID_CHAR_TIMEOUT: u32 = 0xC;
}

/// FIFO control register bits.
pub mod fcr {
    /// FIFO enable.
    pub const FIFOEN: u32 = 1 << 0;
    /// Receive FIFO reset (self-clearing).
    pub const RXFIFORES: u32 = 1 << 1;
    /// Transmit FIFO reset (self-clearing).
    pub const TXFIFORES: u32 = 1 << 2;
    /// DMA mode select.
    pub const DMAMODE: u32 = 1 << 3;
    /// Mask over the receive trigger level field.
    pub const RXTRIGLVL_MASK: u32 = 0x3 << 6;
}

/// Line control register bits.
pub mod lcr {
    /// Position of the word length select field.
    pub const WLS_POS: u32 = 0;
    /// Stop bit select (set: 2 stop bits).
    pub const SBS: u32 = 1 << 2;
    /// Parity enable.
    pub const PE: u32 = 1 << 3;
    /// Position of the parity select field.
    pub const PS_POS: u32 = 4;
    /// Break control.
    pub const BC: u32 = 1 << 6;
    /// Divisor latch access bit.
    pub const DLAB: u32 = 1 << 7;
}

/// Modem control register bits.
pub mod mcr {
    /// DTR line control.
    pub const DTRCTRL: u32 = 1 << 0;
    /// RTS line control.
    pub const RTSCTRL: u32 = 1 << 1;
    /// Auto-RTS flow control enable.
    pub const RTSEN: u32 = 1 << 6;
    /// Auto-CTS flow control enable.
    pub const CTSEN: u32 = 1 << 7;
}

/// Line status register bits.
pub mod lsr {
    /// Receiver data ready.
    pub const RDR: u32 = 1 << 0;
    /// Overrun error.
    pub const OE: u32 = 1 << 1;
    /// Parity error.
    pub const PE: u32 = 1 << 2;
    /// Framing error.
    pub const FE: u32 = 1 << 3;
    /// Break interrupt.
    pub const BI: u32 = 1 << 4;
    /// Transmit holding register empty.
    pub const THRE: u32 = 1 << 5;
    /// Transmitter empty (holding register and shift register).
    pub const TEMT: u32 = 1 << 6;
    /// Mask over the receive line error sources.
    pub const LINE_INT: u32 = OE | PE | FE | BI;
}

/// Modem status register bits.
pub mod msr {
    /// Delta CTS.
    pub const DCTS: u32 = 1 << 0;
    /// Delta DSR.
    pub const DDSR: u32 = 1 << 1;
    /// Trailing edge of RI.
    pub const TERI: u32 = 1 << 2;
    /// Delta DCD.
    pub const DDCD: u32 = 1 << 3;
    /// CTS line state.
    pub const CTS: u32 = 1 << 4;
    /// DSR line state.
    pub const DSR: u32 = 1 << 5;
    /// RI line state.
    pub const RI: u32 = 1 << 6;
    /// DCD line state.
    pub const DCD: u32 = 1 << 7;
}

/// Fractional divider register fields.
pub mod fdr {
    /// Mask over the DIVADDVAL field.
    pub const DIVADDVAL_MASK: u32 = 0xF;
    /// Position of the MULVAL field.
    pub const MULVAL_POS: u32 = 4;
    /// Mask over the MULVAL field.
    pub const MULVAL_MASK: u32 = 0xF << MULVAL_POS;
}

/// Transmit enable register bits.
pub mod ter {
    /// Transmitter enable.
    pub const TXEN: u32 = 1 << 0;
}

/// Half-duplex enable register bits.
pub mod hden {
    /// Half-duplex (single-wire) mode enable.
    pub const HDEN: u32 = 1 << 0;
}

/// Smart card interface control register fields.
pub mod scictrl {
    /// Smart card interface enable.
    pub const SCIEN: u32 = 1 << 0;
    /// NACK response disable.
    pub const NACKDIS: u32 = 1 << 1;
    /// Position of the guard time field.
    pub const GUARDTIME_POS: u32 = 8;
    /// Mask over the guard time field.
    pub const GUARDTIME_MASK: u32 = 0xFF << GUARDTIME_POS;
}

/// RS-485 control register bits.
pub mod rs485ctrl {
    /// Receiver disable.
    pub const RXDIS: u32 = 1 << 1;
}

/// Synchronous mode control register bits.
pub mod syncctrl {
    /// Synchronous mode enable.
    pub const SYNC: u32 = 1 << 0;
    /// Clock source select (set: master, clock is an output).
    pub const CSRC: u32 = 1 << 1;
    /// Falling edge sampling.
    pub const FES: u32 = 1 << 2;
    /// Continuous clock disable on sample.
    pub const SSDIS: u32 = 1 << 5;
}

/// IrDA control register fields.
pub mod icr {
    /// IrDA mode enable.
    pub const IRDAEN: u32 = 1 << 0;
    /// Fixed pulse width enable.
    pub const FIXPULSEEN: u32 = 1 << 2;
    /// Position of the pulse divider field.
    pub const PULSEDIV_POS: u32 = 3;
    /// Mask over the pulse divider field.
    pub const PULSEDIV_MASK: u32 = 0x7 << PULSEDIV_POS;
}
