//! Blocking I2C master on an eUSCI_B unit.
//!
//! Every transaction is framed as
//!
//! ```text
//! START, ADDR+R/W, data… [REPEATED START, ADDR+R/W, data…]* STOP
//! ```
//!
//! Failures are reported by position: [`Nack::index`] counts every byte on
//! the wire from zero, address bytes included, so index 0 is the first
//! address byte and 1 the first data byte after it. STOP is always sent, on
//! failure too, so the bus is never left held.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::config::ClockSource;
use crate::regs::{ctlw0, ctlw1, ifg, Port, Reg, Registers, UsciB};

/// Deglitch time applied to SDA and SCL (UCGLITx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GlitchFilter {
    #[default]
    Ns50,
    Ns25,
    Ns12_5,
    Ns6_25,
}

impl GlitchFilter {
    const fn ctlw1_bits(self) -> u16 {
        let bits = match self {
            GlitchFilter::Ns50 => 0b00,
            GlitchFilter::Ns25 => 0b01,
            GlitchFilter::Ns12_5 => 0b10,
            GlitchFilter::Ns6_25 => 0b11,
        };
        bits & ctlw1::UCGLIT_MASK
    }
}

/// I2C master configuration.
///
/// SCL runs at the clock source frequency divided by `divider`, so SMCLK at
/// ~1 MHz with a divider of 10 gives ~100 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    pub clock_source: ClockSource,
    pub divider: u16,
    pub glitch_filter: GlitchFilter,
}

impl I2cConfig {
    pub const fn new(clock_source: ClockSource, divider: u16) -> Self {
        Self {
            clock_source,
            divider,
            glitch_filter: GlitchFilter::Ns50,
        }
    }

    pub const fn glitch_filter(mut self, glitch_filter: GlitchFilter) -> Self {
        self.glitch_filter = glitch_filter;
        self
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::new(ClockSource::Smclk, 10)
    }
}

/// Data direction of an address phase, sent as the R/W bit after the 7-bit
/// address (UCTR set for transmit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master writes, R/W = 0.
    Transmit,
    /// Master reads, R/W = 1.
    Receive,
}

/// One addressed phase of a [`I2cTransport::transaction`].
#[derive(Debug, PartialEq, Eq)]
pub enum I2cOperation<'a> {
    Transmit(&'a [u8]),
    Receive(&'a mut [u8]),
}

impl I2cOperation<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            I2cOperation::Transmit(_) => Direction::Transmit,
            I2cOperation::Receive(_) => Direction::Receive,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            I2cOperation::Transmit(data) => data.len(),
            I2cOperation::Receive(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The target did not acknowledge the byte at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Nack {
    /// Position of the rejected byte in the whole transaction.
    pub index: usize,
    /// Whether that byte was an address byte or a data byte.
    pub source: NoAcknowledgeSource,
}

impl Nack {
    /// No device answered the first address byte.
    pub fn is_absent(&self) -> bool {
        self.index == 0
    }
}

impl embedded_hal::i2c::Error for Nack {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(self.source)
    }
}

/// When a new address phase is started between two operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepeatedStart {
    /// Before every operation after the first.
    Always,
    /// Only where the direction changes; same-direction neighbours are merged.
    OnDirectionChange,
}

/// Which byte a NACK seen during a (repeated) start belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartFault {
    /// The transmitted byte that was still waiting for its ACK slot.
    PreviousByte,
    Address,
}

enum Data<'b> {
    Tx(&'b [u8]),
    Rx(&'b mut [u8]),
}

/// Anything that can be driven as one phase of a transaction.
trait Segment {
    fn direction(&self) -> Direction;
    fn data(&mut self) -> Data<'_>;
}

impl Segment for I2cOperation<'_> {
    fn direction(&self) -> Direction {
        I2cOperation::direction(self)
    }

    fn data(&mut self) -> Data<'_> {
        match self {
            I2cOperation::Transmit(data) => Data::Tx(*data),
            I2cOperation::Receive(buf) => Data::Rx(&mut **buf),
        }
    }
}

impl Segment for Operation<'_> {
    fn direction(&self) -> Direction {
        match self {
            Operation::Write(_) => Direction::Transmit,
            Operation::Read(_) => Direction::Receive,
        }
    }

    fn data(&mut self) -> Data<'_> {
        match self {
            Operation::Write(data) => Data::Tx(*data),
            Operation::Read(buf) => Data::Rx(&mut **buf),
        }
    }
}

/// Addressed, multi-operation blocking bus master (7-bit addressing).
pub struct I2cTransport<R> {
    port: Port<R>,
}

impl<R> core::fmt::Debug for I2cTransport<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2cTransport").finish()
    }
}

impl<R: Registers> I2cTransport<R> {
    /// Bind a transport to `unit`. Call [`init`](Self::init) before use.
    pub fn new(unit: UsciB, regs: R) -> Self {
        Self {
            port: Port::new(unit.into(), regs),
        }
    }

    /// Configure single-master I2C mode with manual stop generation and
    /// interrupts disabled.
    pub fn init(&mut self, config: &I2cConfig) {
        debug!("i2c {}: init {}", self.port.unit(), config);
        self.port.reset_scope(|port| {
            port.write(
                Reg::Ctlw0,
                ctlw0::UCMST
                    | ctlw0::UCMODE_I2C
                    | ctlw0::UCSYNC
                    | config.clock_source.ctlw0_bits()
                    | ctlw0::UCSWRST,
            );
            // UCASTP = 00: STOP only when asked for.
            port.modify(Reg::Ctlw1, |v| {
                let fields = ctlw1::UCGLIT_MASK | ctlw1::UCASTP_MASK;
                (v & !fields) | config.glitch_filter.ctlw1_bits()
            });
            port.write(Reg::Brw, config.divider);
            port.write(Reg::Ie, 0);
        });
    }

    /// `START, ADDR+W, data…, STOP`.
    pub fn write(&mut self, address: SevenBitAddress, data: &[u8]) -> Result<(), Nack> {
        self.run(
            address,
            &mut [I2cOperation::Transmit(data)],
            RepeatedStart::Always,
        )
    }

    /// `START, ADDR+R, data…, STOP`. The last byte is NACKed by the host.
    pub fn read(&mut self, address: SevenBitAddress, buf: &mut [u8]) -> Result<(), Nack> {
        self.run(
            address,
            &mut [I2cOperation::Receive(buf)],
            RepeatedStart::Always,
        )
    }

    /// `START, ADDR+W, send…, REPEATED START, ADDR+R, recv…, STOP` as one
    /// atomic transaction, typically a register select followed by a read.
    pub fn write_read(
        &mut self,
        address: SevenBitAddress,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(), Nack> {
        self.run(
            address,
            &mut [I2cOperation::Transmit(send), I2cOperation::Receive(recv)],
            RepeatedStart::Always,
        )
    }

    /// Run `operations` as one transaction.
    ///
    /// A repeated start precedes every operation after the first, even when
    /// two neighbours share a direction.
    pub fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [I2cOperation<'_>],
    ) -> Result<(), Nack> {
        self.run(address, operations, RepeatedStart::Always)
    }

    /// Give back the register handle.
    pub fn release(self) -> R {
        self.port.release()
    }

    fn run<S: Segment>(
        &mut self,
        address: SevenBitAddress,
        segments: &mut [S],
        policy: RepeatedStart,
    ) -> Result<(), Nack> {
        if segments.is_empty() {
            return Ok(());
        }
        self.port.write(Reg::I2csa, address as u16);
        self.port.clear_bits(Reg::Ifg, ifg::UCNACKIFG | ifg::UCSTPIFG);

        let phases = self.phases(segments, policy);
        let nacked_at_stop = self.stop();

        // The last transmitted byte gets its ACK slot only once STOP is
        // requested.
        let result = match phases {
            Ok(Some(last)) if nacked_at_stop => Err(Nack {
                index: last,
                source: NoAcknowledgeSource::Data,
            }),
            Ok(_) => Ok(()),
            Err(nack) => Err(nack),
        };

        if let Err(nack) = result {
            warn!("i2c {}: {:#x} NACKed byte {}", self.port.unit(), address, nack.index);
            self.port.clear_bits(Reg::Ifg, ifg::UCNACKIFG);
        }
        result
    }

    /// Drives every segment up to, but not including, STOP.
    ///
    /// UCTXIFG0 only says TXBUF moved into the shift register, so the ACK of a
    /// transmitted byte is known once the next byte is taken, the next START
    /// has gone out, or STOP has completed. On success returns the index of a
    /// trailing transmitted byte whose ACK is still outstanding.
    fn phases<S: Segment>(
        &mut self,
        segments: &mut [S],
        policy: RepeatedStart,
    ) -> Result<Option<usize>, Nack> {
        let mut index = 0;
        let mut unconfirmed: Option<usize> = None;
        let mut previous = None;
        for i in 0..segments.len() {
            let direction = segments[i].direction();
            if policy == RepeatedStart::Always || previous != Some(direction) {
                if let Err(fault) = self.start(direction) {
                    return Err(match (fault, unconfirmed) {
                        (StartFault::PreviousByte, Some(last)) => Nack {
                            index: last,
                            source: NoAcknowledgeSource::Data,
                        },
                        _ => Nack {
                            index,
                            source: NoAcknowledgeSource::Address,
                        },
                    });
                }
                unconfirmed = None;
                index += 1;
            }
            // The final byte of a read is NACKed unless the next operation
            // keeps reading in the same phase.
            let continues = segments.get(i + 1).is_some_and(|next| {
                policy == RepeatedStart::OnDirectionChange && next.direction() == direction
            });

            match segments[i].data() {
                Data::Tx(data) => {
                    for &byte in data {
                        if !self.transmit(byte) {
                            // Charged to whatever was in the shift register.
                            return Err(match unconfirmed {
                                Some(last) => Nack {
                                    index: last,
                                    source: NoAcknowledgeSource::Data,
                                },
                                None => Nack {
                                    index: index - 1,
                                    source: NoAcknowledgeSource::Address,
                                },
                            });
                        }
                        unconfirmed = Some(index);
                        index += 1;
                    }
                }
                Data::Rx(buf) => {
                    let last = buf.len().saturating_sub(1);
                    for (j, slot) in buf.iter_mut().enumerate() {
                        if j == last && !continues {
                            self.port.set_bits(Reg::Ctlw0, ctlw0::UCTXNACK);
                        }
                        *slot = self.receive();
                        index += 1;
                    }
                }
            }
            previous = Some(direction);
        }
        Ok(unconfirmed)
    }

    /// Generate a (repeated) start and send the address byte.
    ///
    /// A byte still in the shift register gets its ACK slot before the start
    /// goes out, so a NACK seen while UCTXSTT is still set belongs to that
    /// byte. IFG is read before CTLW0 on every poll and read once more after
    /// UCTXSTT clears.
    fn start(&mut self, direction: Direction) -> Result<(), StartFault> {
        self.port.modify(Reg::Ctlw0, |v| match direction {
            Direction::Transmit => v | ctlw0::UCTR | ctlw0::UCTXSTT,
            Direction::Receive => (v & !ctlw0::UCTR) | ctlw0::UCTXSTT,
        });
        let mut previous_nacked = false;
        loop {
            let nacked = self.port.is_set(Reg::Ifg, ifg::UCNACKIFG);
            if !self.port.is_set(Reg::Ctlw0, ctlw0::UCTXSTT) {
                break;
            }
            previous_nacked |= nacked;
        }
        if previous_nacked {
            Err(StartFault::PreviousByte)
        } else if self.port.is_set(Reg::Ifg, ifg::UCNACKIFG) {
            Err(StartFault::Address)
        } else {
            Ok(())
        }
    }

    /// Hand one data byte to the transmitter. Returns `false` if a NACK for
    /// the byte ahead of it turned up before the transmitter took it.
    fn transmit(&mut self, byte: u8) -> bool {
        self.port.write(Reg::Txbuf, byte as u16);
        loop {
            let flags = self.port.read(Reg::Ifg);
            if flags & ifg::UCNACKIFG != 0 {
                return false;
            }
            if flags & ifg::UCTXIFG0 != 0 {
                return true;
            }
        }
    }

    fn receive(&mut self) -> u8 {
        self.port.wait_set(Reg::Ifg, ifg::UCRXIFG0);
        self.port.read(Reg::Rxbuf) as u8
    }

    /// Generate STOP and wait for it. Returns whether a NACK is pending.
    fn stop(&mut self) -> bool {
        self.port.set_bits(Reg::Ctlw0, ctlw0::UCTXSTP);
        self.port.wait_clear(Reg::Ctlw0, ctlw0::UCTXSTP);
        self.port.is_set(Reg::Ifg, ifg::UCNACKIFG)
    }
}

impl<R> embedded_hal::i2c::ErrorType for I2cTransport<R> {
    type Error = Nack;
}

/// Follows the embedded-hal contract: adjacent operations of the same kind
/// share one address phase. Use the inherent
/// [`transaction`](I2cTransport::transaction) for a repeated start between
/// every operation.
impl<R: Registers> embedded_hal::i2c::I2c<SevenBitAddress> for I2cTransport<R> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(address, operations, RepeatedStart::OnDirectionChange)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::statw;
    use embedded_hal::i2c::{Error as _, I2c};
    use std::collections::VecDeque;

    const B0_CTLW0: usize = 0x0540;
    const B0_CTLW1: usize = 0x0542;
    const B0_BRW: usize = 0x0546;
    const B0_STATW: usize = 0x0548;
    const B0_RXBUF: usize = 0x054C;
    const B0_TXBUF: usize = 0x054E;
    const B0_I2CSA: usize = 0x0560;
    const B0_IE: usize = 0x056A;
    const B0_IFG: usize = 0x056C;

    /// Register polls a byte spends in the shift register before its ACK slot.
    const SHIFT_POLLS: u32 = 2;
    /// Register polls between an ACK slot and the START or STOP that follows.
    const SETTLE_POLLS: u32 = 2;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start,
        RepeatedStart,
        Address { address: u8, read: bool, acked: bool },
        Tx { byte: u8, acked: bool },
        Rx { byte: u8, acked: bool },
        Stop,
    }

    /// eUSCI_B0 in I2C master mode wired to one target.
    ///
    /// The transmitter is double-buffered: TXBUF moves into the shift register
    /// (raising UCTXIFG0) before the target has answered the byte ahead of it,
    /// and a byte's ACK slot only completes once the master queues another
    /// byte or asks for START or STOP. Bus time advances one step per register
    /// read.
    ///
    /// The target ACKs every byte except the one at wire position `nack_at`
    /// (counting address, transmitted and received bytes) and answers reads
    /// from `replies`. Every bus condition lands in `events`, transmitted
    /// bytes at the moment their ACK slot completes.
    #[derive(Default)]
    struct SimI2c {
        ctlw0: u16,
        ctlw1: u16,
        brw: u16,
        i2csa: u16,
        ie: u16,
        ifg: u16,
        held: bool,
        receiving: bool,
        tx_buf: Option<u8>,
        shifting: Option<u8>,
        shift_polls: u32,
        settle_polls: u32,
        position: usize,
        nack_at: Option<usize>,
        replies: VecDeque<u8>,
        events: Vec<Event>,
    }

    impl SimI2c {
        fn nacking_at(position: usize) -> Self {
            Self {
                nack_at: Some(position),
                ..Default::default()
            }
        }

        fn replying(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn acknowledge(&mut self) -> bool {
            let acked = self.nack_at != Some(self.position);
            self.position += 1;
            acked
        }

        fn tick(&mut self) {
            if let Some(byte) = self.shifting {
                if self.shift_polls > 0 {
                    self.shift_polls -= 1;
                    return;
                }
                // Nothing queued: SCL is held low in the ACK cycle.
                let requested = self.ctlw0 & (ctlw0::UCTXSTT | ctlw0::UCTXSTP) != 0;
                if self.tx_buf.is_none() && !requested {
                    return;
                }
                self.shifting = None;
                let acked = self.acknowledge();
                self.events.push(Event::Tx { byte, acked });
                self.settle_polls = SETTLE_POLLS;
                if !acked {
                    self.ifg |= ifg::UCNACKIFG;
                } else if let Some(next) = self.tx_buf.take() {
                    self.load(next);
                }
                return;
            }
            if self.settle_polls > 0 {
                self.settle_polls -= 1;
                return;
            }
            if self.ctlw0 & ctlw0::UCTXSTT != 0 {
                self.start_condition();
            } else if self.ctlw0 & ctlw0::UCTXSTP != 0 {
                self.stop_condition();
            }
        }

        fn load(&mut self, byte: u8) {
            self.shifting = Some(byte);
            self.shift_polls = SHIFT_POLLS;
            self.ifg |= ifg::UCTXIFG0;
        }

        fn start_condition(&mut self) {
            self.events.push(if self.held {
                Event::RepeatedStart
            } else {
                Event::Start
            });
            self.held = true;
            self.tx_buf = None;
            let read = self.ctlw0 & ctlw0::UCTR == 0;
            let acked = self.acknowledge();
            self.events.push(Event::Address {
                address: self.i2csa as u8,
                read,
                acked,
            });
            self.ctlw0 &= !ctlw0::UCTXSTT;
            self.ifg &= !(ifg::UCTXIFG0 | ifg::UCRXIFG0);
            self.receiving = false;
            if !acked {
                self.ifg |= ifg::UCNACKIFG;
            } else if read {
                self.receiving = true;
                self.ifg |= ifg::UCRXIFG0;
            } else {
                self.ifg |= ifg::UCTXIFG0;
            }
        }

        fn stop_condition(&mut self) {
            assert!(self.held, "STOP without START");
            self.events.push(Event::Stop);
            self.held = false;
            self.receiving = false;
            self.tx_buf = None;
            self.ctlw0 &= !ctlw0::UCTXSTP;
            self.ifg |= ifg::UCSTPIFG;
        }

        fn count(&self, wanted: &Event) -> usize {
            self.events.iter().filter(|e| *e == wanted).count()
        }

        fn data_bytes(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, Event::Tx { .. } | Event::Rx { .. }))
                .count()
        }
    }

    impl Registers for SimI2c {
        fn read(&mut self, addr: usize) -> u16 {
            self.tick();
            match addr {
                B0_CTLW0 => self.ctlw0,
                B0_CTLW1 => self.ctlw1,
                B0_BRW => self.brw,
                B0_STATW => {
                    if self.held {
                        statw::UCBBUSY
                    } else {
                        0
                    }
                }
                B0_I2CSA => self.i2csa,
                B0_IE => self.ie,
                B0_IFG => self.ifg,
                B0_RXBUF => {
                    assert!(self.receiving && self.held, "RXBUF read outside a read phase");
                    let byte = self.replies.pop_front().unwrap_or(0xFF);
                    let acked = self.ctlw0 & ctlw0::UCTXNACK == 0;
                    self.position += 1;
                    self.events.push(Event::Rx { byte, acked });
                    self.ifg &= !ifg::UCRXIFG0;
                    if acked {
                        self.ifg |= ifg::UCRXIFG0;
                    } else {
                        self.ctlw0 &= !ctlw0::UCTXNACK;
                    }
                    byte as u16
                }
                _ => 0,
            }
        }

        fn write(&mut self, addr: usize, value: u16) {
            match addr {
                B0_CTLW0 => self.ctlw0 = value,
                B0_CTLW1 => self.ctlw1 = value,
                B0_BRW => self.brw = value,
                B0_I2CSA => self.i2csa = value,
                B0_IE => self.ie = value,
                B0_IFG => self.ifg = value,
                B0_TXBUF => {
                    assert!(self.held && !self.receiving, "TXBUF written outside a write phase");
                    assert!(self.tx_buf.is_none(), "TXBUF overwritten before it was taken");
                    self.ifg &= !ifg::UCTXIFG0;
                    if self.shifting.is_none() {
                        self.load(value as u8);
                    } else {
                        self.tx_buf = Some(value as u8);
                    }
                }
                _ => {}
            }
        }
    }

    fn i2c(sim: SimI2c) -> I2cTransport<SimI2c> {
        let mut i2c = I2cTransport::new(UsciB::B0, sim);
        i2c.init(&I2cConfig::new(ClockSource::Smclk, 10));
        i2c
    }

    fn addr(read: bool, acked: bool) -> Event {
        Event::Address {
            address: 0x3F,
            read,
            acked,
        }
    }

    fn tx(byte: u8) -> Event {
        Event::Tx { byte, acked: true }
    }

    fn rx(byte: u8, acked: bool) -> Event {
        Event::Rx { byte, acked }
    }

    #[test]
    fn init_selects_master_i2c_mode() {
        let mut i2c = I2cTransport::new(
            UsciB::B0,
            SimI2c {
                ctlw1: 0b1100,
                ie: 0x00FF,
                ..Default::default()
            },
        );
        i2c.init(&I2cConfig::new(ClockSource::Aclk, 40).glitch_filter(GlitchFilter::Ns12_5));
        let sim = i2c.release();
        assert_eq!(sim.ctlw0, 0x0800 | 0x0600 | 0x0100 | 0x0040);
        assert_eq!(sim.ctlw1, 0b10);
        assert_eq!(sim.brw, 40);
        assert_eq!(sim.ie, 0);
        assert!(sim.events.is_empty());
    }

    #[test]
    fn write_all_acked() {
        let mut i2c = i2c(SimI2c::default());
        assert_eq!(i2c.write(0x3F, &[1, 2, 3, 4]), Ok(()));
        let sim = i2c.release();
        assert_eq!(
            sim.events,
            vec![
                Event::Start,
                addr(false, true),
                tx(1),
                tx(2),
                tx(3),
                tx(4),
                Event::Stop
            ]
        );
    }

    #[test]
    fn write_reports_nacked_data_byte_and_still_stops() {
        for k in 0..4 {
            let mut i2c = i2c(SimI2c::nacking_at(k + 1));
            let result = i2c.write(0x3F, &[10, 11, 12, 13]);
            assert_eq!(
                result,
                Err(Nack {
                    index: k + 1,
                    source: NoAcknowledgeSource::Data
                })
            );
            let sim = i2c.release();
            assert_eq!(sim.events.last(), Some(&Event::Stop));
            assert_eq!(sim.data_bytes(), k + 1, "bytes after the NACK were sent");
            assert!(!sim.held);
        }
    }

    #[test]
    fn nack_on_final_data_byte_is_reported() {
        let mut i2c = i2c(SimI2c::nacking_at(3));
        assert_eq!(
            i2c.write(0x3F, &[1, 2, 3]),
            Err(Nack {
                index: 3,
                source: NoAcknowledgeSource::Data
            })
        );
        assert_eq!(
            i2c.release().events,
            vec![
                Event::Start,
                addr(false, true),
                tx(1),
                tx(2),
                Event::Tx {
                    byte: 3,
                    acked: false
                },
                Event::Stop
            ]
        );
    }

    #[test]
    fn absent_device_is_index_zero() {
        let mut i2c = i2c(SimI2c::nacking_at(0));
        let err = i2c.write(0x3F, &[1, 2]).unwrap_err();
        assert!(err.is_absent());
        assert_eq!(err.source, NoAcknowledgeSource::Address);
        let sim = i2c.release();
        assert_eq!(
            sim.events,
            vec![Event::Start, addr(false, false), Event::Stop]
        );
    }

    #[test]
    fn empty_write_addresses_the_device() {
        let mut i2c = i2c(SimI2c::default());
        assert_eq!(i2c.write(0x3F, &[]), Ok(()));
        assert_eq!(
            i2c.release().events,
            vec![Event::Start, addr(false, true), Event::Stop]
        );
    }

    #[test]
    fn read_nacks_only_the_last_byte() {
        let mut i2c = i2c(SimI2c::replying(&[0xA0, 0xA1, 0xA2]));
        let mut buf = [0u8; 3];
        assert_eq!(i2c.read(0x3F, &mut buf), Ok(()));
        assert_eq!(buf, [0xA0, 0xA1, 0xA2]);
        assert_eq!(
            i2c.release().events,
            vec![
                Event::Start,
                addr(true, true),
                rx(0xA0, true),
                rx(0xA1, true),
                rx(0xA2, false),
                Event::Stop
            ]
        );
    }

    #[test]
    fn write_read_uses_repeated_start() {
        let mut i2c = i2c(SimI2c::replying(&[7, 8, 9]));
        let mut recv = [0u8; 3];
        assert_eq!(i2c.write_read(0x3F, &[0x01], &mut recv), Ok(()));
        assert_eq!(recv, [7, 8, 9]);
        assert_eq!(
            i2c.release().events,
            vec![
                Event::Start,
                addr(false, true),
                tx(0x01),
                Event::RepeatedStart,
                addr(true, true),
                rx(7, true),
                rx(8, true),
                rx(9, false),
                Event::Stop
            ]
        );
    }

    #[test]
    fn write_read_second_address_nack_is_flattened() {
        // address, two data bytes, then the read address at position 3
        let mut i2c = i2c(SimI2c::nacking_at(3));
        let mut recv = [0u8; 2];
        assert_eq!(
            i2c.write_read(0x3F, &[0x10, 0x11], &mut recv),
            Err(Nack {
                index: 3,
                source: NoAcknowledgeSource::Address
            })
        );
        let sim = i2c.release();
        assert_eq!(sim.count(&Event::Stop), 1);
        assert_eq!(sim.events.last(), Some(&Event::Stop));
        assert!(!sim.events.iter().any(|e| matches!(e, Event::Rx { .. })));
    }

    #[test]
    fn write_read_nack_on_last_sent_byte() {
        let mut i2c = i2c(SimI2c::nacking_at(2));
        let mut recv = [0u8; 2];
        assert_eq!(
            i2c.write_read(0x3F, &[0x10, 0x11], &mut recv),
            Err(Nack {
                index: 2,
                source: NoAcknowledgeSource::Data
            })
        );
        let sim = i2c.release();
        assert!(sim.events.contains(&Event::Tx {
            byte: 0x11,
            acked: false
        }));
        assert_eq!(sim.count(&Event::Stop), 1);
        assert_eq!(sim.events.last(), Some(&Event::Stop));
        assert!(!sim.events.iter().any(|e| matches!(e, Event::Rx { .. })));
        assert!(!sim.held);
    }

    #[test]
    fn transaction_framing() {
        let mut i2c = i2c(SimI2c::replying(&[0xB0, 0xB1, 0xB2]));
        let bytes = [1, 2, 3, 4];
        let mut recv = [0u8; 3];
        let send = [5];
        let mut ops = [
            I2cOperation::Transmit(&bytes),
            I2cOperation::Receive(&mut recv),
            I2cOperation::Transmit(&send),
        ];
        assert_eq!(i2c.transaction(0x3F, &mut ops), Ok(()));
        assert_eq!(recv, [0xB0, 0xB1, 0xB2]);

        let sim = i2c.release();
        assert_eq!(sim.count(&Event::Start), 1);
        assert_eq!(sim.count(&Event::RepeatedStart), 2);
        assert_eq!(sim.count(&Event::Stop), 1);
        assert_eq!(sim.data_bytes(), 8);
        assert_eq!(
            sim.events,
            vec![
                Event::Start,
                addr(false, true),
                tx(1),
                tx(2),
                tx(3),
                tx(4),
                Event::RepeatedStart,
                addr(true, true),
                rx(0xB0, true),
                rx(0xB1, true),
                rx(0xB2, false),
                Event::RepeatedStart,
                addr(false, true),
                tx(5),
                Event::Stop
            ]
        );
    }

    #[test]
    fn transaction_repeats_start_between_same_direction_operations() {
        let mut i2c = i2c(SimI2c::default());
        let mut ops = [I2cOperation::Transmit(&[1]), I2cOperation::Transmit(&[2])];
        assert_eq!(i2c.transaction(0x3F, &mut ops), Ok(()));
        assert_eq!(
            i2c.release().events,
            vec![
                Event::Start,
                addr(false, true),
                tx(1),
                Event::RepeatedStart,
                addr(false, true),
                tx(2),
                Event::Stop
            ]
        );
    }

    #[test]
    fn transaction_nack_before_repeated_start_same_direction() {
        // The first operation's only byte is NACKed in the slot that precedes
        // the repeated start.
        let mut i2c = i2c(SimI2c::nacking_at(1));
        let mut ops = [I2cOperation::Transmit(&[1]), I2cOperation::Transmit(&[2])];
        assert_eq!(
            i2c.transaction(0x3F, &mut ops),
            Err(Nack {
                index: 1,
                source: NoAcknowledgeSource::Data
            })
        );
        let sim = i2c.release();
        assert_eq!(sim.events.last(), Some(&Event::Stop));
        assert!(!sim.events.contains(&tx(2)));
    }

    #[test]
    fn transaction_nack_in_last_operation() {
        // 1 + 4 + 1 + 3 = 9: the third operation's address byte
        let mut i2c = i2c(SimI2c::nacking_at(9));
        let mut recv = [0u8; 3];
        let mut ops = [
            I2cOperation::Transmit(&[1, 2, 3, 4]),
            I2cOperation::Receive(&mut recv),
            I2cOperation::Transmit(&[5]),
        ];
        let err = i2c.transaction(0x3F, &mut ops).unwrap_err();
        assert_eq!(err.index, 9);
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        let sim = i2c.release();
        assert_eq!(sim.events.last(), Some(&Event::Stop));
        assert!(!sim.held);
    }

    #[test]
    fn empty_transaction_touches_nothing() {
        let mut i2c = i2c(SimI2c::default());
        assert_eq!(i2c.transaction(0x3F, &mut []), Ok(()));
        assert!(i2c.release().events.is_empty());
    }

    #[test]
    fn next_transaction_starts_clean_after_nack() {
        let mut i2c = i2c(SimI2c::nacking_at(0));
        assert!(i2c.write(0x3F, &[1]).is_err());
        assert_eq!(i2c.write(0x3F, &[1]), Ok(()));
        let sim = i2c.release();
        assert_eq!(sim.count(&Event::Start), 2);
        assert_eq!(sim.count(&Event::Stop), 2);
    }

    #[test]
    fn embedded_hal_transaction_merges_neighbours() {
        let mut i2c = i2c(SimI2c::replying(&[0xC0, 0xC1]));
        let mut first = [0u8; 1];
        let mut second = [0u8; 1];
        let mut ops = [
            Operation::Write(&[1]),
            Operation::Write(&[2]),
            Operation::Read(&mut first),
            Operation::Read(&mut second),
        ];
        assert_eq!(I2c::transaction(&mut i2c, 0x3F, &mut ops), Ok(()));
        assert_eq!((first, second), ([0xC0], [0xC1]));
        assert_eq!(
            i2c.release().events,
            vec![
                Event::Start,
                addr(false, true),
                tx(1),
                tx(2),
                Event::RepeatedStart,
                addr(true, true),
                rx(0xC0, true),
                rx(0xC1, false),
                Event::Stop
            ]
        );
    }

    #[test]
    fn embedded_hal_errors_map_to_no_acknowledge() {
        let mut bus = i2c(SimI2c::nacking_at(2));
        let err = I2c::write(&mut bus, 0x3F, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        assert_eq!(err.index, 2);

        let mut bus = i2c(SimI2c::nacking_at(3));
        let err = I2c::write_read(&mut bus, 0x3F, &[1, 2], &mut [0; 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        assert_eq!(err.index, 3);

        let mut bus = i2c(SimI2c::nacking_at(3));
        let err = I2c::write(&mut bus, 0x3F, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.index, 3);
    }
}
