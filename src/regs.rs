//! eUSCI register map and the access seam every transport goes through.
//!
//! Register layout and bit positions follow the MSP430FR4xx/FR2xx family
//! user's guide (SLAU445), chapters 22 (eUSCI_A UART), 23 (eUSCI SPI) and
//! 24 (eUSCI_B I2C). Base addresses are those of the MSP430FR2355.

/// Hardware unit a transport is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    A0,
    A1,
    B0,
    B1,
}

/// The two eUSCI flavours. A units do UART and SPI, B units do SPI and I2C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    A,
    B,
}

impl Unit {
    pub const fn base(self) -> usize {
        match self {
            Unit::A0 => 0x0500,
            Unit::A1 => 0x0580,
            Unit::B0 => 0x0540,
            Unit::B1 => 0x05C0,
        }
    }

    pub const fn kind(self) -> Kind {
        match self {
            Unit::A0 | Unit::A1 => Kind::A,
            Unit::B0 | Unit::B1 => Kind::B,
        }
    }
}

/// An eUSCI_A unit (UART capable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsciA {
    A0,
    A1,
}

impl From<UsciA> for Unit {
    fn from(unit: UsciA) -> Self {
        match unit {
            UsciA::A0 => Unit::A0,
            UsciA::A1 => Unit::A1,
        }
    }
}

/// An eUSCI_B unit (I2C capable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsciB {
    B0,
    B1,
}

impl From<UsciB> for Unit {
    fn from(unit: UsciB) -> Self {
        match unit {
            UsciB::B0 => Unit::B0,
            UsciB::B1 => Unit::B1,
        }
    }
}

/// Registers used by the drivers.
///
/// `Mctlw` only exists on A units and `I2csa` only on B units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    Ctlw0,
    Ctlw1,
    Brw,
    Mctlw,
    Statw,
    Rxbuf,
    Txbuf,
    I2csa,
    /// Interrupt enables. The transports poll, so init clears it.
    Ie,
    Ifg,
}

impl Reg {
    pub const fn offset(self, kind: Kind) -> usize {
        match (self, kind) {
            (Reg::Ctlw0, _) => 0x00,
            (Reg::Ctlw1, _) => 0x02,
            (Reg::Brw, _) => 0x06,
            (Reg::Mctlw, _) => 0x08,
            (Reg::Statw, Kind::A) => 0x0A,
            (Reg::Statw, Kind::B) => 0x08,
            (Reg::Rxbuf, _) => 0x0C,
            (Reg::Txbuf, _) => 0x0E,
            (Reg::I2csa, _) => 0x20,
            (Reg::Ie, Kind::A) => 0x1A,
            (Reg::Ie, Kind::B) => 0x2A,
            (Reg::Ifg, Kind::A) => 0x1C,
            (Reg::Ifg, Kind::B) => 0x2C,
        }
    }
}

/// UCxCTLW0 bits. Several positions are shared between modes with different
/// meanings, hence the per-mode aliases.
pub mod ctlw0 {
    pub const UCSWRST: u16 = 1 << 0;
    pub const UCSSEL_UCLK: u16 = 0b00 << 6;
    pub const UCSSEL_ACLK: u16 = 0b01 << 6;
    pub const UCSSEL_SMCLK: u16 = 0b10 << 6;
    pub const UCSYNC: u16 = 1 << 8;
    pub const UCMODE_I2C: u16 = 0b11 << 9;
    pub const UCMST: u16 = 1 << 11;
    pub const UC7BIT: u16 = 1 << 12;
    pub const UCMSB: u16 = 1 << 13;

    // UART
    pub const UCSPB: u16 = 1 << 11;
    pub const UCPAR: u16 = 1 << 14;
    pub const UCPEN: u16 = 1 << 15;

    // SPI
    pub const UCCKPL: u16 = 1 << 14;
    pub const UCCKPH: u16 = 1 << 15;

    // I2C
    pub const UCTXSTT: u16 = 1 << 1;
    pub const UCTXSTP: u16 = 1 << 2;
    pub const UCTXNACK: u16 = 1 << 3;
    pub const UCTR: u16 = 1 << 4;
}

/// UCBxCTLW1 bits (I2C).
pub mod ctlw1 {
    /// Deglitch time field, bits 1..0.
    pub const UCGLIT_MASK: u16 = 0b11;
    /// Automatic stop generation field, bits 3..2. Left at 0 (manual stop).
    pub const UCASTP_MASK: u16 = 0b11 << 2;
}

/// UCAxMCTLW fields (UART modulation).
pub mod mctlw {
    pub const UCOS16: u16 = 1 << 0;
    pub const UCBRF_SHIFT: u16 = 4;
    pub const UCBRF_MASK: u16 = 0xF << UCBRF_SHIFT;
    pub const UCBRS_SHIFT: u16 = 8;
}

/// UCxSTATW bits.
pub mod statw {
    pub const UCBUSY: u16 = 1 << 0;
    /// Bus busy (I2C, B units only).
    pub const UCBBUSY: u16 = 1 << 4;
}

/// UCxIFG bits.
pub mod ifg {
    pub const UCRXIFG: u16 = 1 << 0;
    pub const UCTXIFG: u16 = 1 << 1;

    // I2C (B units)
    pub const UCRXIFG0: u16 = 1 << 0;
    pub const UCTXIFG0: u16 = 1 << 1;
    pub const UCSTPIFG: u16 = 1 << 3;
    pub const UCNACKIFG: u16 = 1 << 5;
}

/// Raw 16-bit register access at absolute addresses.
///
/// `read` takes `&mut self` because reading some registers (RXBUF) has side
/// effects on the peripheral.
pub trait Registers {
    fn read(&mut self, addr: usize) -> u16;
    fn write(&mut self, addr: usize, value: u16);
}

/// Volatile memory-mapped register access.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

#[allow(unsafe_code)]
impl Mmio {
    /// # Safety
    ///
    /// The eUSCI register blocks must exist at the addresses returned by
    /// [`Unit::base`], and the caller must not hand out a second handle for
    /// a unit already owned by a transport.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[allow(unsafe_code)]
impl Registers for Mmio {
    fn read(&mut self, addr: usize) -> u16 {
        // SAFETY: address validity is the contract of `Mmio::new`.
        unsafe { core::ptr::read_volatile(addr as *const u16) }
    }

    fn write(&mut self, addr: usize, value: u16) {
        // SAFETY: address validity is the contract of `Mmio::new`.
        unsafe { core::ptr::write_volatile(addr as *mut u16, value) }
    }
}

/// One eUSCI unit together with the means to reach its registers.
#[derive(Debug)]
pub(crate) struct Port<R> {
    unit: Unit,
    regs: R,
}

impl<R: Registers> Port<R> {
    pub(crate) const fn new(unit: Unit, regs: R) -> Self {
        Self { unit, regs }
    }

    pub(crate) const fn unit(&self) -> Unit {
        self.unit
    }

    pub(crate) fn release(self) -> R {
        self.regs
    }

    fn addr(&self, reg: Reg) -> usize {
        self.unit.base() + reg.offset(self.unit.kind())
    }

    pub(crate) fn read(&mut self, reg: Reg) -> u16 {
        let addr = self.addr(reg);
        self.regs.read(addr)
    }

    pub(crate) fn write(&mut self, reg: Reg, value: u16) {
        let addr = self.addr(reg);
        self.regs.write(addr, value);
    }

    pub(crate) fn modify(&mut self, reg: Reg, f: impl FnOnce(u16) -> u16) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    pub(crate) fn set_bits(&mut self, reg: Reg, mask: u16) {
        self.modify(reg, |v| v | mask);
    }

    pub(crate) fn clear_bits(&mut self, reg: Reg, mask: u16) {
        self.modify(reg, |v| v & !mask);
    }

    pub(crate) fn is_set(&mut self, reg: Reg, mask: u16) -> bool {
        self.read(reg) & mask != 0
    }

    /// Spin until any bit of `mask` reads as set.
    pub(crate) fn wait_set(&mut self, reg: Reg, mask: u16) {
        while !self.is_set(reg, mask) {}
    }

    /// Spin until every bit of `mask` reads as clear.
    pub(crate) fn wait_clear(&mut self, reg: Reg, mask: u16) {
        while self.is_set(reg, mask) {}
    }

    /// Hold the unit in software reset while `f` rewrites its configuration.
    pub(crate) fn reset_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.set_bits(Reg::Ctlw0, ctlw0::UCSWRST);
        f(self);
        self.clear_bits(Reg::Ctlw0, ctlw0::UCSWRST);
    }
}
