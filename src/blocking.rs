use core::{fmt::Debug, ops::RangeBounds};

use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{Operation, SpiBus},
};
use embedded_storage::{
    nor_flash::{
        check_erase, check_read, check_write, ErrorType, MultiwriteNorFlash, NorFlash,
        ReadNorFlash,
    },
    ReadStorage, Storage,
};

use crate::{
    address::{normalize_range, Geometry},
    block::{block_addr, block_count, BlockDevice},
    check_length,
    command::Command,
    config::Config,
    error::Error,
    register::{ElectronicSignature, StatusRegister},
    ReadyPoll, CHIP_SIZE_25XX1024,
};

/// Type alias for an array of `N` 25xx1024
pub type Eeprom25xx1024<SPI, CS, D, const N: usize> =
    EepromArray<CHIP_SIZE_25XX1024, SPI, CS, D, N>;

/// `N` EEPROMs of `CHIP_SIZE` bytes on one SPI bus, seen as a single array of bytes.
///
/// Chip `i` is selected by `cs[i]` and holds the addresses `i * CHIP_SIZE..(i + 1) * CHIP_SIZE`.
pub struct EepromArray<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> {
    spi: SPI,
    cs: [CS; N],
    delay: D,
    config: Config,
    geometry: Geometry,
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
{
    /// Create the array and check that every chip select has a chip behind it
    pub fn new(spi: SPI, cs: [CS; N], delay: D, config: Config) -> Result<Self, Error<SE, PE>> {
        let geometry = Geometry::new(CHIP_SIZE, N).ok_or(Error::Value)?;
        let mut array = Self {
            spi,
            cs,
            delay,
            config,
            geometry,
        };
        for cs in array.cs.iter_mut() {
            cs.set_high().map_err(Error::Pin)?;
        }
        array.scan()?;
        Ok(array)
    }

    /// Give back the bus, the chip selects and the delay
    pub fn release(self) -> (SPI, [CS; N], D) {
        (self.spi, self.cs, self.delay)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Size of the whole array in bytes
    pub fn capacity(&self) -> u32 {
        self.geometry().capacity()
    }

    pub fn chip_count(&self) -> usize {
        N
    }

    pub fn chip_size(&self) -> u32 {
        CHIP_SIZE
    }

    /// Check that every chip answers with the configured signature
    pub fn scan(&mut self) -> Result<(), Error<SE, PE>> {
        for chip in 0..N {
            let signature = self.read_signature(chip)?;
            if signature.0 != self.config.signature {
                #[cfg(feature = "defmt")]
                defmt::error!("EEPROM not found at cs[{=usize}]: {:?}", chip, signature);
                return Err(Error::ChipNotFound(chip));
            }
        }
        #[cfg(feature = "defmt")]
        defmt::info!(
            "{=usize} chips detected. Total EEPROM size {=u32} bytes.",
            N,
            self.capacity()
        );
        Ok(())
    }

    fn transaction(
        &mut self,
        chip: usize,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Error<SE, PE>> {
        let cs = self.cs.get_mut(chip).ok_or(Error::OutOfBounds)?;
        cs.set_low().map_err(Error::Pin)?;
        let res = run(&mut self.spi, &mut self.delay, operations);
        let deselect = cs.set_high();
        res.map_err(Error::Spi)?;
        deselect.map_err(Error::Pin)
    }

    fn verify_offset(offset: u32, len: usize) -> Result<(), Error<SE, PE>> {
        match offset.checked_add(len as u32) {
            Some(end) if len as u64 <= CHIP_SIZE as u64 && end <= CHIP_SIZE => Ok(()),
            _ => Err(Error::OutOfBounds),
        }
    }

    /// Read the electronic signature of a chip, this also wakes it from deep power-down
    pub fn read_signature(&mut self, chip: usize) -> Result<ElectronicSignature, Error<SE, PE>> {
        let dummy = Command::Dummy as u8;
        let mut command = [Command::ReleasePowerDown as u8, dummy, dummy, dummy, 0];
        self.transaction(chip, &mut [Operation::TransferInPlace(&mut command)])?;
        Ok(ElectronicSignature(command[4]))
    }

    /// Read the status register of a chip
    pub fn read_status(&mut self, chip: usize) -> Result<StatusRegister, Error<SE, PE>> {
        let mut command = [Command::ReadStatus as u8, 0];
        self.transaction(chip, &mut [Operation::TransferInPlace(&mut command)])?;
        Ok(command[1].into())
    }

    /// Wait until the chip is done with its write or erase.
    ///
    /// Fails with [`Error::Timeout`] after [`Config::ready_timeout_ms`] and with [`Error::Protected`]
    /// as soon as a block protect bit is seen.
    pub fn wait_ready(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        let mut poll = ReadyPoll::new(&self.config);
        while !poll.check(self.read_status(chip)?)? {
            self.delay.delay_ms(poll.interval_ms());
        }
        Ok(())
    }

    /// Enable write operation, the chip clears it after every write or erase
    fn write_enable(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        self.transaction(chip, &mut [Operation::Write(&[Command::WriteEnable as u8])])
    }

    /// Disable write
    pub fn write_disable(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        self.transaction(chip, &mut [Operation::Write(&[Command::WriteDisable as u8])])
    }

    fn read_burst(&mut self, chip: usize, offset: u32, buff: &mut [u8]) -> Result<(), Error<SE, PE>> {
        Self::verify_offset(offset, buff.len())?;
        let command = Command::Read.with_addr(offset);
        self.transaction(chip, &mut [Operation::Write(&command), Operation::Read(buff)])
    }

    /// Write at most a page and wait for the write to complete
    fn write_burst(&mut self, chip: usize, offset: u32, buff: &[u8]) -> Result<(), Error<SE, PE>> {
        Self::verify_offset(offset, buff.len())?;
        let command = Command::Write.with_addr(offset);
        self.write_enable(chip)?;
        self.transaction(chip, &mut [Operation::Write(&command), Operation::Write(buff)])?;
        self.wait_ready(chip)
    }

    /// Erase a whole chip, every byte reads back as `0xFF`
    pub fn erase_chip(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        #[cfg(feature = "defmt")]
        defmt::warn!("Erase chip {=usize}", chip);
        self.write_enable(chip)?;
        self.transaction(chip, &mut [Operation::Write(&[Command::ChipErase as u8])])?;
        self.wait_ready(chip)
    }

    /// Erase every chip of the array, one after the other
    pub fn erase_all(&mut self) -> Result<(), Error<SE, PE>> {
        for chip in 0..N {
            self.erase_chip(chip)?;
        }
        Ok(())
    }

    /// Read `buff.len()` bytes from `addr`
    pub fn read(&mut self, addr: u32, buff: &mut [u8]) -> Result<(), Error<SE, PE>> {
        let segments = self
            .geometry()
            .segments(addr, buff.len())
            .ok_or(Error::OutOfBounds)?;
        let mut cursor = 0;
        for segment in segments {
            #[cfg(feature = "defmt")]
            defmt::trace!(
                "Read {=usize} bytes from chip {=usize} at {=u32}",
                segment.len,
                segment.chip,
                segment.offset
            );
            let chunk = &mut buff[cursor..cursor + segment.len];
            self.read_burst(segment.chip, segment.offset, chunk)?;
            cursor += segment.len;
        }
        Ok(())
    }

    /// Write `buff` at `addr`, one page burst at a time.
    ///
    /// The whole range is checked before anything is sent, but a bus error halfway leaves the
    /// bytes already written in place.
    pub fn write(&mut self, addr: u32, buff: &[u8]) -> Result<(), Error<SE, PE>> {
        let segments = self
            .geometry()
            .segments(addr, buff.len())
            .ok_or(Error::OutOfBounds)?;
        let mut cursor = 0;
        for segment in segments {
            #[cfg(feature = "defmt")]
            defmt::trace!(
                "Write {=usize} bytes to chip {=usize} at {=u32}",
                segment.len,
                segment.chip,
                segment.offset
            );
            let chunk = &buff[cursor..cursor + segment.len];
            self.write_burst(segment.chip, segment.offset, chunk)?;
            cursor += segment.len;
        }
        Ok(())
    }

    /// Read the byte at `addr`
    pub fn get_byte(&mut self, addr: u32) -> Result<u8, Error<SE, PE>> {
        let segment = self.geometry().translate(addr, 1).ok_or(Error::OutOfBounds)?;
        let [cmd, a2, a1, a0] = Command::Read.with_addr(segment.offset);
        let mut command = [cmd, a2, a1, a0, 0];
        self.transaction(segment.chip, &mut [Operation::TransferInPlace(&mut command)])?;
        Ok(command[4])
    }

    /// Write `value` at `addr` and wait for the write to complete
    pub fn set_byte(&mut self, addr: u32, value: u8) -> Result<(), Error<SE, PE>> {
        let segment = self.geometry().translate(addr, 1).ok_or(Error::OutOfBounds)?;
        let [cmd, a2, a1, a0] = Command::Write.with_addr(segment.offset);
        self.write_enable(segment.chip)?;
        self.transaction(segment.chip, &mut [Operation::Write(&[cmd, a2, a1, a0, value])])?;
        self.wait_ready(segment.chip)
    }

    /// Read a range of the array, negative bounds count from the end.
    /// `buff` must be exactly as long as the range.
    pub fn get_range<R: RangeBounds<i64>>(
        &mut self,
        range: R,
        buff: &mut [u8],
    ) -> Result<(), Error<SE, PE>> {
        let range = normalize_range(range, self.capacity()).ok_or(Error::OutOfBounds)?;
        check_length(&range, buff.len())?;
        self.read(range.start, buff)
    }

    /// Write a range of the array, negative bounds count from the end.
    /// `buff` must be exactly as long as the range.
    pub fn set_range<R: RangeBounds<i64>>(
        &mut self,
        range: R,
        buff: &[u8],
    ) -> Result<(), Error<SE, PE>> {
        let range = normalize_range(range, self.capacity()).ok_or(Error::OutOfBounds)?;
        check_length(&range, buff.len())?;
        self.write(range.start, buff)
    }
}

fn run<SPI: SpiBus, D: DelayNs>(
    spi: &mut SPI,
    delay: &mut D,
    operations: &mut [Operation<'_, u8>],
) -> Result<(), SPI::Error> {
    for operation in operations {
        match operation {
            Operation::Read(buff) => spi.read(buff)?,
            Operation::Write(buff) => spi.write(buff)?,
            Operation::Transfer(read, write) => spi.transfer(read, write)?,
            Operation::TransferInPlace(buff) => spi.transfer_in_place(buff)?,
            Operation::DelayNs(ns) => {
                spi.flush()?;
                delay.delay_ns(*ns);
            }
        }
    }
    spi.flush()
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> BlockDevice
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
{
    type Error = Error<SE, PE>;

    fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), Error<SE, PE>> {
        let addr = block_addr(block, buf.len())?;
        EepromArray::read(self, addr, buf)
    }

    fn write_blocks(&mut self, block: u32, buf: &[u8]) -> Result<(), Error<SE, PE>> {
        let addr = block_addr(block, buf.len())?;
        EepromArray::write(self, addr, buf)
    }

    fn block_count(&self) -> u32 {
        block_count(EepromArray::capacity(self))
    }
}

/// Implementation of the byte addressable `Storage` traits of the `embedded_storage` crate
impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> ReadStorage
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
{
    type Error = Error<SE, PE>;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error<SE, PE>> {
        EepromArray::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        EepromArray::capacity(self) as usize
    }
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> Storage
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
{
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error<SE, PE>> {
        EepromArray::write(self, offset, bytes)
    }
}

/// Implementation of the `NorFlash` traits of the `embedded_storage` crate. An EEPROM does not need an
/// erase before a write, the only erase available is the erase of a whole chip.
impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> ErrorType
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
    SE: Debug,
    PE: Debug,
{
    type Error = Error<SE, PE>;
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> ReadNorFlash
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
    SE: Debug,
    PE: Debug,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error<SE, PE>> {
        check_read(self, offset, bytes.len())?;
        EepromArray::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        EepromArray::capacity(self) as usize
    }
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> NorFlash
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
    SE: Debug,
    PE: Debug,
{
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = CHIP_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Error<SE, PE>> {
        check_erase(self, from, to)?;
        for chip in (from / CHIP_SIZE) as usize..(to / CHIP_SIZE) as usize {
            self.erase_chip(chip)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error<SE, PE>> {
        check_write(self, offset, bytes.len())?;
        EepromArray::write(self, offset, bytes)
    }
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize> MultiwriteNorFlash
    for EepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
    SE: Debug,
    PE: Debug,
{
}
