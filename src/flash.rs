//! Blocking driver for 25-series SPI NOR flash.
//!
//! Command set and timing rules follow the common 25-series datasheets
//! (W25X/W25Q, AT25SF): every program, erase or status write must be preceded
//! by Write Enable (06h), the device ignores commands while a program or erase
//! is in progress, and a page program never wraps past a 256-byte page.
//!
//! The driver owns an [`SpiBus`] and the chip-select pin and frames every
//! command itself, so it runs on [`SpiTransport`](crate::spi::SpiTransport)
//! or any other embedded-hal bus.

use bitflags::bitflags;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use hardware_traits::HardwareFlashDevice;

use crate::error::Error;

/// Program unit of the device.
pub const PAGE_SIZE: u32 = 256;
/// Smallest erase unit.
pub const SECTOR_SIZE: u32 = 4096;
pub const BLOCK_32K: u32 = 32 * 1024;
pub const BLOCK_64K: u32 = 64 * 1024;

/// Instruction opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    Read = 0x03,
    ProgramPage = 0x02,
    /// 4 KiB sector erase.
    SectorErase = 0x20,
    BlockErase32 = 0x52,
    BlockErase64 = 0xD8,
    ChipErase = 0x60,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    WriteDisable = 0x04,
    /// Read the 8-bit status register.
    ReadStatus = 0x05,
    WriteStatus = 0x01,
    ResetEnable = 0x66,
    Reset = 0x99,
}

bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The 3 protection region bits.
        const PROT = 0b0001_1100;
        /// **S**tatus **R**egister **W**rite **D**isable bit.
        const SRWD = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Status({=u8:#04x})", self.bits())
    }
}

/// Device size, as the part number's density code gives it.
///
/// Addresses are always sent as 24 bits; the device only decodes as many as
/// it needs, so anything past [`max_address`](Density::max_address) would
/// wrap around. The driver rejects such accesses instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Density {
    /// 512 Kbit, 64 KiB.
    Kbit512,
    /// 1 Mbit, 128 KiB.
    Mbit1,
    /// 2 Mbit, 256 KiB.
    Mbit2,
    /// 4 Mbit, 512 KiB.
    Mbit4,
    /// 8 Mbit, 1 MiB.
    Mbit8,
    /// 16 Mbit, 2 MiB.
    Mbit16,
}

impl Density {
    /// Highest valid byte address.
    pub const fn max_address(self) -> u32 {
        match self {
            Density::Kbit512 => 0x00_FFFF,
            Density::Mbit1 => 0x01_FFFF,
            Density::Mbit2 => 0x03_FFFF,
            Density::Mbit4 => 0x07_FFFF,
            Density::Mbit8 => 0x0F_FFFF,
            Density::Mbit16 => 0x1F_FFFF,
        }
    }

    /// Size in bytes.
    pub const fn capacity(self) -> u32 {
        self.max_address() + 1
    }
}

/// A NOR flash chip on an SPI bus.
pub struct FlashDevice<SPI, CS> {
    spi: SPI,
    cs: CS,
    density: Density,
}

impl<SPI, CS> core::fmt::Debug for FlashDevice<SPI, CS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FlashDevice({:?})", self.density)
    }
}

fn header(opcode: Opcode, addr: u32) -> [u8; 4] {
    [opcode as u8, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

impl<SPI, CS> FlashDevice<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Takes ownership of the bus and chip-select pin. No bus activity.
    pub fn new(spi: SPI, cs: CS, density: Density) -> Self {
        Self { spi, cs, density }
    }

    /// Brings the device into a known state: waits out any operation left
    /// running from before, issues a software reset and waits for it to
    /// complete. Returns the status register afterwards.
    pub fn init(&mut self) -> Result<Status, Error<SPI, CS>> {
        self.wait_until_ready()?;
        self.reset()?;
        self.wait_until_ready()?;
        let status = self.read_status()?;
        debug!("Initial status: {:?}", status);
        Ok(status)
    }

    /// The density this driver was constructed for. Nothing is read from
    /// the device.
    pub fn density(&self) -> Density {
        self.density
    }

    /// Size in bytes; every access must end at or before this address.
    pub fn capacity(&self) -> u32 {
        self.density.capacity()
    }

    /// Hands back the bus and pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Reads the status register.
    pub fn read_status(&mut self) -> Result<Status, Error<SPI, CS>> {
        let mut buf = [Opcode::ReadStatus as u8, 0];
        self.frame(|spi| spi.transfer_in_place(&mut buf))?;
        Ok(Status::from_bits_retain(buf[1]))
    }

    /// Writes the status register (01h). Protection bits are the caller's
    /// concern.
    pub fn write_status(&mut self, value: u8) -> Result<(), Error<SPI, CS>> {
        self.ensure_idle()?;
        self.raw_command(Opcode::WriteEnable)?;
        let cmd = [Opcode::WriteStatus as u8, value];
        self.frame(|spi| spi.write(&cmd))
    }

    /// Status register bit 0 (BUSY). Set while a Page Program, Erase or
    /// Write Status Register cycle runs; the device then accepts only Read
    /// Status Register (05h).
    pub fn is_busy(&mut self) -> Result<bool, Error<SPI, CS>> {
        Ok(self.read_status()?.contains(Status::BUSY))
    }

    /// Status register bit 1 (WEL). Set by Write Enable (06h) and cleared by
    /// Write Disable (04h), power-up and the completion of every program,
    /// erase or status write.
    pub fn is_write_enabled(&mut self) -> Result<bool, Error<SPI, CS>> {
        Ok(self.read_status()?.contains(Status::WEL))
    }

    /// Block until the status of the device is not busy.
    pub fn wait_until_ready(&mut self) -> Result<(), Error<SPI, CS>> {
        while self.is_busy()? {}
        Ok(())
    }

    /// Sends a single-byte instruction.
    ///
    /// The device ignores instructions while a program or erase runs, so the
    /// busy bit is checked first and the command is rejected with
    /// [`Error::Busy`] rather than sent into the void.
    pub fn send_command(&mut self, opcode: Opcode) -> Result<(), Error<SPI, CS>> {
        self.ensure_idle()?;
        self.raw_command(opcode)
    }

    /// Write Enable (06h): sets WEL. The write-type operations of this driver
    /// issue it themselves.
    pub fn write_enable(&mut self) -> Result<(), Error<SPI, CS>> {
        self.send_command(Opcode::WriteEnable)
    }

    /// Write Disable (04h): clears WEL.
    pub fn write_disable(&mut self) -> Result<(), Error<SPI, CS>> {
        self.send_command(Opcode::WriteDisable)
    }

    /// Software reset: Enable Reset (66h) then Reset (99h), as two separate
    /// instructions. The device takes roughly 30 µs to come back.
    pub fn reset(&mut self) -> Result<(), Error<SPI, CS>> {
        self.send_command(Opcode::ResetEnable)?;
        self.send_command(Opcode::Reset)
    }

    /// Read Data (03h) into `out`, starting at `start`.
    pub fn read_bytes(&mut self, start: u32, out: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        if out.is_empty() {
            return Ok(());
        }
        self.check_range(start, out.len())?;
        self.ensure_idle()?;
        let cmd = header(Opcode::Read, start);
        self.frame(|spi| {
            spi.write(&cmd)?;
            spi.read(out)
        })
    }

    /// Programs `data` at `start`, split into page programs so no single
    /// program wraps inside a page. Blocks until the last page has been
    /// written.
    pub fn write_bytes(&mut self, start: u32, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(start, data.len())?;
        self.ensure_idle()?;

        let first = ((PAGE_SIZE - start % PAGE_SIZE) as usize).min(data.len());
        let (head, rest) = data.split_at(first);
        self.program_page(start, head)?;
        self.wait_until_ready()?;

        let mut addr = start + first as u32;
        for chunk in rest.chunks(PAGE_SIZE as usize) {
            trace!("page program at {=u32:#x}, {=usize} bytes", addr, chunk.len());
            self.program_page(addr, chunk)?;
            self.wait_until_ready()?;
            addr += chunk.len() as u32;
        }
        Ok(())
    }

    /// Page Program (02h): one to 256 bytes inside a single page.
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(addr, data.len())?;
        if (addr % PAGE_SIZE) as usize + data.len() > PAGE_SIZE as usize {
            warn!("page program at {=u32:#x} crosses a page", addr);
            return Err(Error::NotAligned);
        }
        self.ensure_idle()?;
        self.program_page(addr, data)
    }

    /// Sector erase (20h). `start` must be 4 KiB aligned.
    pub fn erase_4k(&mut self, start: u32) -> Result<(), Error<SPI, CS>> {
        self.erase_unit(Opcode::SectorErase, SECTOR_SIZE, start)
    }

    /// Block erase (52h). `start` must be 32 KiB aligned.
    pub fn erase_32k(&mut self, start: u32) -> Result<(), Error<SPI, CS>> {
        self.erase_unit(Opcode::BlockErase32, BLOCK_32K, start)
    }

    /// Block erase (D8h). `start` must be 64 KiB aligned.
    pub fn erase_64k(&mut self, start: u32) -> Result<(), Error<SPI, CS>> {
        self.erase_unit(Opcode::BlockErase64, BLOCK_64K, start)
    }

    /// Erases `[start, end)` with the largest erase units that fit.
    ///
    /// Both bounds must be sector aligned. Waits for each unit to finish
    /// before issuing the next one; returns as soon as the last one has been
    /// started.
    pub fn erase(&mut self, start: u32, end: u32) -> Result<(), Error<SPI, CS>> {
        if start % SECTOR_SIZE != 0 || end % SECTOR_SIZE != 0 {
            warn!("erase range {=u32:#x}..{=u32:#x} not sector aligned", start, end);
            return Err(Error::NotAligned);
        }
        if start > end || end > self.capacity() {
            warn!("erase range {=u32:#x}..{=u32:#x} out of bounds", start, end);
            return Err(Error::OutOfBounds);
        }
        if start == end {
            return Ok(());
        }
        self.ensure_idle()?;

        let mut addr = start;
        while addr < end {
            if addr != start {
                self.wait_until_ready()?;
            }
            let remaining = end - addr;
            let (opcode, size) = if addr % BLOCK_64K == 0 && remaining >= BLOCK_64K {
                (Opcode::BlockErase64, BLOCK_64K)
            } else if addr % BLOCK_32K == 0 && remaining >= BLOCK_32K {
                (Opcode::BlockErase32, BLOCK_32K)
            } else {
                (Opcode::SectorErase, SECTOR_SIZE)
            };
            self.raw_command(Opcode::WriteEnable)?;
            let cmd = header(opcode, addr);
            self.frame(|spi| spi.write(&cmd))?;
            addr += size;
        }
        Ok(())
    }

    /// Chip erase (60h).
    pub fn erase_all(&mut self) -> Result<(), Error<SPI, CS>> {
        self.ensure_idle()?;
        self.raw_command(Opcode::WriteEnable)?;
        self.raw_command(Opcode::ChipErase)
    }

    fn erase_unit(&mut self, opcode: Opcode, size: u32, start: u32) -> Result<(), Error<SPI, CS>> {
        if start >= self.capacity() {
            warn!("erase at {=u32:#x} out of bounds", start);
            return Err(Error::OutOfBounds);
        }
        if start % size != 0 {
            warn!("erase at {=u32:#x} not aligned to {=u32}", start, size);
            return Err(Error::NotAligned);
        }
        self.ensure_idle()?;
        self.raw_command(Opcode::WriteEnable)?;
        let cmd = header(opcode, start);
        self.frame(|spi| spi.write(&cmd))
    }

    /// Write Enable then Page Program. Range and page checks are the caller's.
    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        self.raw_command(Opcode::WriteEnable)?;
        let cmd = header(Opcode::ProgramPage, addr);
        self.frame(|spi| {
            spi.write(&cmd)?;
            spi.write(data)
        })
    }

    fn check_range(&self, start: u32, len: usize) -> Result<(), Error<SPI, CS>> {
        let end = u32::try_from(len).ok().and_then(|len| start.checked_add(len));
        match end {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => {
                warn!("access at {=u32:#x}, {=usize} bytes out of bounds", start, len);
                Err(Error::OutOfBounds)
            }
        }
    }

    fn ensure_idle(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.is_busy()? {
            warn!("flash busy, command rejected");
            return Err(Error::Busy);
        }
        Ok(())
    }

    fn raw_command(&mut self, opcode: Opcode) -> Result<(), Error<SPI, CS>> {
        let cmd = [opcode as u8];
        self.frame(|spi| spi.write(&cmd))
    }

    /// One chip-select frame. The bus is drained before chip-select goes
    /// high, and chip-select goes high even if the bus failed.
    fn frame(
        &mut self,
        f: impl FnOnce(&mut SPI) -> Result<(), SPI::Error>,
    ) -> Result<(), Error<SPI, CS>> {
        self.cs.set_low().map_err(Error::ChipSelect)?;
        let result = f(&mut self.spi).and_then(|()| self.spi.flush());
        let deselect = self.cs.set_high().map_err(Error::ChipSelect);
        result.map_err(Error::Spi)?;
        deselect
    }
}

/// Blocking flavour of the shared flash interface: each call waits for the
/// device to become ready instead of rejecting it as busy.
impl<SPI, CS> HardwareFlashDevice for FlashDevice<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = Error<SPI, CS>;

    fn read(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Self::Error> {
        self.wait_until_ready()?;
        self.read_bytes(addr, data)
    }

    fn sector_erase(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.wait_until_ready()?;
        self.erase_4k(addr)
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.wait_until_ready()?;
        self.write_page(addr, data)
    }

    fn chip_erase(&mut self) -> Result<(), Self::Error> {
        self.wait_until_ready()?;
        self.erase_all()
    }
}
