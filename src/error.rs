use core::fmt::{self, Debug};
use embedded_hal::digital;
use embedded_hal::spi;

/// The error type used by the flash driver.
///
/// The first three variants are rejections: they are raised before anything
/// is sent, so the device is left untouched. The last two carry errors from
/// the underlying SPI bus or chip-select pin.
pub enum Error<SPI: spi::ErrorType, CS: digital::ErrorType> {
    /// The access runs past the end of the device.
    OutOfBounds,
    /// An erase address is not a multiple of its granularity, or a page
    /// program crosses a page boundary.
    NotAligned,
    /// A program or erase is still in progress.
    Busy,
    /// An SPI transfer failed.
    Spi(SPI::Error),
    /// Driving chip-select failed.
    ChipSelect(CS::Error),
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> Error<SPI, CS> {
    /// `true` for the variants raised before any bus activity.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::OutOfBounds | Error::NotAligned | Error::Busy)
    }
}

#[cfg(feature = "defmt")]
impl<SPI: spi::ErrorType, CS: digital::ErrorType> defmt::Format for Error<SPI, CS> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::OutOfBounds => defmt::write!(fmt, "Error::OutOfBounds"),
            Error::NotAligned => defmt::write!(fmt, "Error::NotAligned"),
            Error::Busy => defmt::write!(fmt, "Error::Busy"),
            Error::Spi(_spi) => defmt::write!(fmt, "Error::Spi"),
            Error::ChipSelect(_pin) => defmt::write!(fmt, "Error::ChipSelect"),
        }
    }
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> Debug for Error<SPI, CS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds => write!(f, "Error::OutOfBounds"),
            Error::NotAligned => write!(f, "Error::NotAligned"),
            Error::Busy => write!(f, "Error::Busy"),
            Error::Spi(spi) => write!(f, "Error::Spi({:?})", spi),
            Error::ChipSelect(pin) => write!(f, "Error::ChipSelect({:?})", pin),
        }
    }
}

impl<SPI: spi::ErrorType, CS: digital::ErrorType> PartialEq for Error<SPI, CS>
where
    SPI::Error: PartialEq,
    CS::Error: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::OutOfBounds, Error::OutOfBounds)
            | (Error::NotAligned, Error::NotAligned)
            | (Error::Busy, Error::Busy) => true,
            (Error::Spi(a), Error::Spi(b)) => a == b,
            (Error::ChipSelect(a), Error::ChipSelect(b)) => a == b,
            _ => false,
        }
    }
}
