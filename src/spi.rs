//! Blocking SPI master on an eUSCI unit.
//!
//! Two levels are offered. The byte primitives leave chip-select to the
//! caller, who must [`flush`](SpiTransport::flush) before deasserting it. The
//! buffer operations take the chip-select pin and scope it around the whole
//! transfer themselves.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0};

use crate::config::{BitOrder, ClockSource, FrameLength};
use crate::regs::{ctlw0, ifg, statw, Port, Reg, Registers, Unit};

/// SPI master configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    pub mode: Mode,
    pub clock_source: ClockSource,
    /// Bit clock prescaler (UCBRx).
    pub divider: u16,
    pub bit_order: BitOrder,
    pub frame_length: FrameLength,
}

impl SpiConfig {
    pub const fn new(mode: Mode, clock_source: ClockSource, divider: u16) -> Self {
        Self {
            mode,
            clock_source,
            divider,
            bit_order: BitOrder::MsbFirst,
            frame_length: FrameLength::Eight,
        }
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
        // UCCKPH is the inverse of CPHA: set means capture on the first edge.
        let phase = match self.mode.phase {
            Phase::CaptureOnFirstTransition => ctlw0::UCCKPH,
            Phase::CaptureOnSecondTransition => 0,
        };
        let polarity = match self.mode.polarity {
            Polarity::IdleLow => 0,
            Polarity::IdleHigh => ctlw0::UCCKPL,
        };
        phase
            | polarity
            | self.bit_order.ctlw0_bits()
            | self.frame_length.ctlw0_bits()
            | ctlw0::UCMST
            | ctlw0::UCSYNC
            | self.clock_source.ctlw0_bits()
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self::new(MODE_0, ClockSource::Smclk, 1)
    }
}

/// Byte-oriented blocking synchronous channel (3-pin master).
pub struct SpiTransport<R> {
    port: Port<R>,
}

impl<R> core::fmt::Debug for SpiTransport<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpiTransport").finish()
    }
}

impl<R: Registers> SpiTransport<R> {
    /// Bind a transport to `unit`. Call [`init`](Self::init) before use.
    pub fn new(unit: impl Into<Unit>, regs: R) -> Self {
        Self {
            port: Port::new(unit.into(), regs),
        }
    }

    pub fn init(&mut self, config: &SpiConfig) {
        debug!("spi {}: init {}", self.port.unit(), config);
        self.port.reset_scope(|port| {
            port.write(Reg::Ctlw0, config.ctlw0() | ctlw0::UCSWRST);
            port.write(Reg::Brw, config.divider);
            port.write(Reg::Ie, 0);
        });
    }

    /// Queue one byte for transmission, discarding whatever is clocked in.
    ///
    /// Returns as soon as the transmit buffer has accepted the byte, which may
    /// still be shifting out afterwards.
    pub fn write_byte(&mut self, byte: u8) {
        self.port.wait_set(Reg::Ifg, ifg::UCTXIFG);
        self.port.write(Reg::Txbuf, byte as u16);
    }

    /// Clock out a dummy byte and return what was received.
    pub fn read_byte(&mut self) -> u8 {
        self.transfer_byte(0x00)
    }

    /// Exchange one byte.
    pub fn transfer_byte(&mut self, byte: u8) -> u8 {
        // Bytes queued by `write_byte` must finish first, and their stale
        // receive data must not be mistaken for ours.
        self.flush();
        if self.port.is_set(Reg::Ifg, ifg::UCRXIFG) {
            self.port.read(Reg::Rxbuf);
        }
        self.port.wait_set(Reg::Ifg, ifg::UCTXIFG);
        self.port.write(Reg::Txbuf, byte as u16);
        self.port.wait_set(Reg::Ifg, ifg::UCRXIFG);
        self.port.read(Reg::Rxbuf) as u8
    }

    /// Block until the shift register has fully drained.
    pub fn flush(&mut self) {
        self.port.wait_clear(Reg::Statw, statw::UCBUSY);
    }

    /// Read `buf.len()` bytes with `cs` asserted.
    pub fn read<CS: OutputPin>(&mut self, buf: &mut [u8], cs: &mut CS) -> Result<(), CS::Error> {
        self.selected(cs, |spi| spi.read_words(buf))
    }

    /// Write `data` with `cs` asserted.
    pub fn write<CS: OutputPin>(&mut self, data: &[u8], cs: &mut CS) -> Result<(), CS::Error> {
        self.selected(cs, |spi| spi.write_words(data))
    }

    /// Full-duplex transfer with `cs` asserted.
    ///
    /// Clocks `max(send.len(), recv.len())` bytes: 0x00 is sent past the end
    /// of `send`, and bytes past the end of `recv` are dropped.
    pub fn transfer<CS: OutputPin>(
        &mut self,
        send: &[u8],
        recv: &mut [u8],
        cs: &mut CS,
    ) -> Result<(), CS::Error> {
        self.selected(cs, |spi| spi.transfer_words(recv, send))
    }

    /// Full-duplex transfer replacing each byte of `buf` with the byte
    /// received in its slot.
    pub fn transfer_in_place<CS: OutputPin>(
        &mut self,
        buf: &mut [u8],
        cs: &mut CS,
    ) -> Result<(), CS::Error> {
        self.selected(cs, |spi| spi.transfer_in_place_words(buf))
    }

    /// Give back the register handle.
    pub fn release(self) -> R {
        self.port.release()
    }

    fn selected<CS: OutputPin>(
        &mut self,
        cs: &mut CS,
        f: impl FnOnce(&mut Self),
    ) -> Result<(), CS::Error> {
        cs.set_low()?;
        f(self);
        self.flush();
        cs.set_high()
    }

    fn read_words(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.read_byte();
        }
    }

    fn write_words(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_byte(byte);
        }
    }

    fn transfer_words(&mut self, recv: &mut [u8], send: &[u8]) {
        let len = recv.len().max(send.len());
        for i in 0..len {
            let received = self.transfer_byte(send.get(i).copied().unwrap_or(0x00));
            if let Some(slot) = recv.get_mut(i) {
                *slot = received;
            }
        }
    }

    fn transfer_in_place_words(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.transfer_byte(*byte);
        }
    }
}

impl<R> embedded_hal::spi::ErrorType for SpiTransport<R> {
    type Error = Infallible;
}

impl<R: Registers> embedded_hal::spi::SpiBus<u8> for SpiTransport<R> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.read_words(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.write_words(words);
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.transfer_words(read, write);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_in_place_words(words);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        SpiTransport::flush(self);
        Ok(())
    }
}
