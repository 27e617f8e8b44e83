//! Blocking UART on an eUSCI_A unit.
//!
//! Nothing here reports errors. A peripheral that never raises its ready flag
//! blocks the caller forever.

use core::convert::Infallible;

use crate::config::{BitOrder, ClockSource, FrameLength};
use crate::regs::{ctlw0, ifg, mctlw, statw, Port, Reg, Registers, UsciA};

/// Baud generator settings, written verbatim into UCAxBRW and UCAxMCTLW.
///
/// The four fields must come from the baud-rate table (or calculation) for
/// the chosen clock; no arithmetic happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaudConfig {
    /// Oversampling mode (UCOS16).
    pub ucos16: bool,
    /// Clock prescaler (UCBRx).
    pub ucbr: u16,
    /// First modulation stage (UCBRFx), 4 bits.
    pub ucbrf: u8,
    /// Second modulation stage (UCBRSx).
    pub ucbrs: u8,
}

impl BaudConfig {
    /// 9600 baud from a 1.048576 MHz SMCLK.
    pub const fn smclk_1mhz_9600() -> Self {
        Self {
            ucos16: true,
            ucbr: 6,
            ucbrf: 13,
            ucbrs: 0x22,
        }
    }

    /// 115200 baud from a 1.048576 MHz SMCLK.
    pub const fn smclk_1mhz_115200() -> Self {
        Self {
            ucos16: false,
            ucbr: 8,
            ucbrf: 0,
            ucbrs: 0xD6,
        }
    }

    /// 9600 baud from the 32.768 kHz ACLK.
    pub const fn aclk_32k_9600() -> Self {
        Self {
            ucos16: false,
            ucbr: 3,
            ucbrf: 0,
            ucbrs: 0x92,
        }
    }

    fn mctlw(&self) -> u16 {
        let mut value = ((self.ucbrs as u16) << mctlw::UCBRS_SHIFT)
            | (((self.ucbrf as u16) << mctlw::UCBRF_SHIFT) & mctlw::UCBRF_MASK);
        if self.ucos16 {
            value |= mctlw::UCOS16;
        }
        value
    }
}

impl Default for BaudConfig {
    fn default() -> Self {
        Self::smclk_1mhz_9600()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    Disabled,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// UART frame and clock configuration.
///
/// ```
/// use eusci_blocking::config::ClockSource;
/// use eusci_blocking::uart::{BaudConfig, Parity, StopBits, UartConfig};
///
/// let config = UartConfig::new(ClockSource::Smclk, BaudConfig::smclk_1mhz_9600(), Parity::Disabled)
///     .stop_bits(StopBits::Two);
/// assert_eq!(config.stop_bits, StopBits::Two);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    pub clock_source: ClockSource,
    pub baud: BaudConfig,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub bit_order: BitOrder,
    pub frame_length: FrameLength,
}

impl UartConfig {
    pub const fn new(clock_source: ClockSource, baud: BaudConfig, parity: Parity) -> Self {
        Self {
            clock_source,
            baud,
            parity,
            stop_bits: StopBits::One,
            bit_order: BitOrder::LsbFirst,
            frame_length: FrameLength::Eight,
        }
    }

    pub const fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub const fn bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub const fn frame_length(mut self, frame_length: FrameLength) -> Self {
        self.frame_length = frame_length;
        self
    }

    fn ctlw0(&self) -> u16 {
        let parity = match self.parity {
            Parity::Disabled => 0,
            Parity::Odd => ctlw0::UCPEN,
            Parity::Even => ctlw0::UCPEN | ctlw0::UCPAR,
        };
        let stop = match self.stop_bits {
            StopBits::One => 0,
            StopBits::Two => ctlw0::UCSPB,
        };
        parity
            | stop
            | self.bit_order.ctlw0_bits()
            | self.frame_length.ctlw0_bits()
            | self.clock_source.ctlw0_bits()
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::new(ClockSource::Smclk, BaudConfig::default(), Parity::Disabled)
    }
}

/// Byte-oriented blocking duplex channel.
pub struct UartTransport<R> {
    port: Port<R>,
}

impl<R> core::fmt::Debug for UartTransport<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UartTransport").finish()
    }
}

impl<R: Registers> UartTransport<R> {
    /// Bind a transport to `unit`. Call [`init`](Self::init) before use.
    pub fn new(unit: UsciA, regs: R) -> Self {
        Self {
            port: Port::new(unit.into(), regs),
        }
    }

    /// Configure the baud generator and frame format.
    pub fn init(&mut self, config: &UartConfig) {
        debug!("uart {}: init {}", self.port.unit(), config);
        self.port.reset_scope(|port| {
            port.write(Reg::Ctlw0, config.ctlw0() | ctlw0::UCSWRST);
            port.write(Reg::Brw, config.baud.ucbr);
            port.write(Reg::Mctlw, config.baud.mctlw());
            port.write(Reg::Ie, 0);
        });
    }

    /// `true` when no received byte is waiting.
    pub fn rx_buf_empty(&mut self) -> bool {
        !self.port.is_set(Reg::Ifg, ifg::UCRXIFG)
    }

    /// `true` while the transmit buffer still holds a byte.
    pub fn tx_buf_full(&mut self) -> bool {
        !self.port.is_set(Reg::Ifg, ifg::UCTXIFG)
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.port.wait_set(Reg::Ifg, ifg::UCTXIFG);
        self.port.write(Reg::Txbuf, byte as u16);
    }

    pub fn read_byte(&mut self) -> u8 {
        self.port.wait_set(Reg::Ifg, ifg::UCRXIFG);
        self.port.read(Reg::Rxbuf) as u8
    }

    pub fn write(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_byte(byte);
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.read_byte();
        }
    }

    /// Block until the last byte has left the shift register.
    pub fn flush(&mut self) {
        self.port.wait_clear(Reg::Statw, statw::UCBUSY);
    }

    /// Give back the register handle.
    pub fn release(self) -> R {
        self.port.release()
    }
}

impl<R: Registers> core::fmt::Write for UartTransport<R> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

impl<R> embedded_io::ErrorType for UartTransport<R> {
    type Error = Infallible;
}

impl<R: Registers> embedded_io::Read for UartTransport<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        UartTransport::read(self, buf);
        Ok(buf.len())
    }
}

impl<R: Registers> embedded_io::ReadReady for UartTransport<R> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx_buf_empty())
    }
}

impl<R: Registers> embedded_io::Write for UartTransport<R> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        UartTransport::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        UartTransport::flush(self);
        Ok(())
    }
}

impl<R: Registers> embedded_io::WriteReady for UartTransport<R> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.tx_buf_full())
    }
}
