//! Line and mode configuration types.

use fugit::HertzU32;

/// Operating mode of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Plain UART operation.
    Asynchronous,
    /// Synchronous operation, clock generated by this instance.
    SynchronousMaster,
    /// Synchronous operation, clock received on the CLK pin.
    SynchronousSlave,
    /// Half-duplex operation on the TX pin.
    SingleWire,
    /// IrDA pulse coding on the serial lines.
    IrDA,
    /// ISO 7816 smart card interface.
    SmartCard,
}

impl Mode {
    /// Whether a shared clock paces both directions in this mode.
    pub fn is_synchronous(self) -> bool {
        matches!(self, Mode::SynchronousMaster | Mode::SynchronousSlave)
    }
}

/// Data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 5 bits
    Five,
    /// 6 bits
    Six,
    /// 7 bits
    Seven,
    /// 8 bits
    Eight,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 bit
    One,
    /// 2 bits
    Two,
}

/// Parity
///
/// The "none" state of parity is represented with the Option type (None).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Hardware flow control selection.
///
/// Only honored on instances whose capabilities expose the matching lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// RTS only.
    Rts,
    /// CTS only.
    Cts,
    /// RTS and CTS.
    RtsCts,
}

/// Clock polarity in the synchronous modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPolarity {
    /// Clock idles low.
    #[default]
    IdleLow,
    /// Clock idles high.
    IdleHigh,
}

/// Clock phase in the synchronous modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPhase {
    /// Data captured on the first clock transition.
    CaptureOnFirst,
    /// Data captured on the second clock transition.
    #[default]
    CaptureOnSecond,
}

/// A struct holding the configuration applied by
/// [`Usart::configure`](crate::Usart::configure).
///
/// The hardware supports only the [`ClockPolarity::IdleLow`] /
/// [`ClockPhase::CaptureOnSecond`] combination in the synchronous modes;
/// the defaults select exactly that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// The baudrate the instance will run at.
    pub baudrate: HertzU32,
    /// Operating mode to select.
    pub mode: Mode,
    /// The amount of data bits per character.
    pub data_bits: DataBits,
    /// The amount of stop bits per character.
    pub stop_bits: StopBits,
    /// The parity to generate and check.
    pub parity: Option<Parity>,
    /// Hardware flow control selection.
    pub flow_control: FlowControl,
    /// Clock polarity (synchronous modes only).
    pub clock_polarity: ClockPolarity,
    /// Clock phase (synchronous modes only).
    pub clock_phase: ClockPhase,
}

impl Config {
    /// Create a new asynchronous-mode configuration.
    pub const fn new(
        baudrate: HertzU32,
        data_bits: DataBits,
        parity: Option<Parity>,
        stop_bits: StopBits,
    ) -> Config {
        Config {
            baudrate,
            mode: Mode::Asynchronous,
            data_bits,
            stop_bits,
            parity,
            flow_control: FlowControl::None,
            clock_polarity: ClockPolarity::IdleLow,
            clock_phase: ClockPhase::CaptureOnSecond,
        }
    }

    /// Same configuration with a different mode.
    pub const fn mode(mut self, mode: Mode) -> Config {
        self.mode = mode;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        _115200_8_N_1
    }
}

/// 9600 baud, 8 data bits, no parity, 1 stop bit
pub const _9600_8_N_1: Config = Config::new(
    HertzU32::from_raw(9600),
    DataBits::Eight,
    None,
    StopBits::One,
);

/// 19200 baud, 8 data bits, no parity, 1 stop bit
pub const _19200_8_N_1: Config = Config::new(
    HertzU32::from_raw(19200),
    DataBits::Eight,
    None,
    StopBits::One,
);

/// 38400 baud, 8 data bits, no parity, 1 stop bit
pub const _38400_8_N_1: Config = Config::new(
    HertzU32::from_raw(38400),
    DataBits::Eight,
    None,
    StopBits::One,
);

/// 57600 baud, 8 data bits, no parity, 1 stop bit
pub const _57600_8_N_1: Config = Config::new(
    HertzU32::from_raw(57600),
    DataBits::Eight,
    None,
    StopBits::One,
);

/// 115200 baud, 8 data bits, no parity, 1 stop bit
pub const _115200_8_N_1: Config = Config::new(
    HertzU32::from_raw(115_200),
    DataBits::Eight,
    None,
    StopBits::One,
);
