//! Frame and clock settings shared by every eUSCI mode.

use crate::regs::ctlw0;

/// Clock feeding the baud-rate generator (UCSSEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// External UCLK pin (UCxCLK in I2C mode).
    Uclk,
    /// Auxiliary clock, typically 32.768 kHz.
    Aclk,
    /// Sub-main clock, ~1 MHz out of reset.
    #[default]
    Smclk,
}

impl ClockSource {
    pub(crate) const fn ctlw0_bits(self) -> u16 {
        match self {
            ClockSource::Uclk => ctlw0::UCSSEL_UCLK,
            ClockSource::Aclk => ctlw0::UCSSEL_ACLK,
            ClockSource::Smclk => ctlw0::UCSSEL_SMCLK,
        }
    }
}

/// Order in which the bits of a character are shifted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    LsbFirst,
    MsbFirst,
}

impl BitOrder {
    pub(crate) const fn ctlw0_bits(self) -> u16 {
        match self {
            BitOrder::LsbFirst => 0,
            BitOrder::MsbFirst => ctlw0::UCMSB,
        }
    }
}

/// Character length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameLength {
    Seven,
    #[default]
    Eight,
}

impl FrameLength {
    pub(crate) const fn ctlw0_bits(self) -> u16 {
        match self {
            FrameLength::Seven => ctlw0::UC7BIT,
            FrameLength::Eight => 0,
        }
    }
}
