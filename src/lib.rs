//! Blocking drivers for the eUSCI serial blocks of MSP430FR2x5x parts, and a
//! NOR flash driver layered on top of the SPI master.
//!
//! Transports are explicit handles bound to one hardware unit at
//! construction. They reach the hardware only through [`regs::Registers`],
//! which is [`regs::Mmio`] on target and a simulated peripheral in tests.
//!
//! ```no_run
//! use eusci_blocking::flash::{Density, FlashDevice};
//! use eusci_blocking::regs::{Mmio, UsciB};
//! use eusci_blocking::spi::{SpiConfig, SpiTransport};
//!
//! fn bring_up<CS: embedded_hal::digital::OutputPin>(cs: CS) {
//!     // SAFETY: the only handle to the eUSCI register blocks.
//!     let regs = unsafe { Mmio::new() };
//!     let mut spi = SpiTransport::new(UsciB::B1, regs);
//!     spi.init(&SpiConfig::default());
//!
//!     let mut flash = FlashDevice::new(spi, cs, Density::Mbit16);
//!     let mut id_block = [0u8; 16];
//!     if flash.init().is_ok() {
//!         flash.read_bytes(0, &mut id_block).ok();
//!     }
//! }
//! ```
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the macros are visible to the other modules.
#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod flash;
pub mod i2c;
pub mod regs;
pub mod spi;
pub mod uart;

pub use config::{BitOrder, ClockSource, FrameLength};
pub use error::Error;
pub use flash::{Density, FlashDevice, Opcode, Status};
pub use i2c::{GlitchFilter, I2cConfig, I2cOperation, I2cTransport, Nack};
pub use regs::{Mmio, Registers, Unit, UsciA, UsciB};
pub use spi::{SpiConfig, SpiTransport};
pub use uart::{BaudConfig, Parity, StopBits, UartConfig, UartTransport};
