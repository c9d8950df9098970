use core::ops::RangeBounds;

use embedded_hal::{digital::OutputPin, spi::Operation};
use embedded_hal_async::{delay::DelayNs, spi::SpiBus};
use embedded_storage_async::nor_flash::{MultiwriteNorFlash, NorFlash, ReadNorFlash};

use crate::{
    address::{normalize_range, Geometry},
    block::{self, block_addr},
    check_length,
    command::Command,
    config::Config,
    error::Error,
    register::{ElectronicSignature, StatusRegister},
    ReadyPoll, CHIP_SIZE_25XX1024,
};

/// Type alias for an async array of `N` 25xx1024
pub type AsyncEeprom25xx1024<SPI, CS, D, const N: usize> =
    AsyncEepromArray<CHIP_SIZE_25XX1024, SPI, CS, D, N>;

/// The async version of [`crate::blocking::EepromArray`]
pub struct AsyncEepromArray<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> {
    spi: SPI,
    cs: [CS; N],
    delay: D,
    config: Config,
    geometry: Geometry,
}

impl<const CHIP_SIZE: u32, SPI, CS, D, SE, PE, const N: usize>
    AsyncEepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus<Error = SE>,
    CS: OutputPin<Error = PE>,
    D: DelayNs,
{
    /// Create the array and check that every chip select has a chip behind it
    pub async fn new(
        spi: SPI,
        cs: [CS; N],
        delay: D,
        config: Config,
    ) -> Result<Self, Error<SE, PE>> {
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
        array.scan().await?;
        Ok(array)
    }

    pub fn release(self) -> (SPI, [CS; N], D) {
        (self.spi, self.cs, self.delay)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

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
    pub async fn scan(&mut self) -> Result<(), Error<SE, PE>> {
        for chip in 0..N {
            let signature = self.read_signature(chip).await?;
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

    async fn transaction(
        &mut self,
        chip: usize,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Error<SE, PE>> {
        let cs = self.cs.get_mut(chip).ok_or(Error::OutOfBounds)?;
        cs.set_low().map_err(Error::Pin)?;
        let res = run(&mut self.spi, &mut self.delay, operations).await;
        let deselect = cs.set_high();
        res.map_err(Error::Spi)?;
        deselect.map_err(Error::Pin)
    }

    /// Read the electronic signature of a chip, this also wakes it from deep power-down
    pub async fn read_signature(
        &mut self,
        chip: usize,
    ) -> Result<ElectronicSignature, Error<SE, PE>> {
        let dummy = Command::Dummy as u8;
        let mut command = [Command::ReleasePowerDown as u8, dummy, dummy, dummy, 0];
        self.transaction(chip, &mut [Operation::TransferInPlace(&mut command)])
            .await?;
        Ok(ElectronicSignature(command[4]))
    }

    /// Read the status register of a chip
    pub async fn read_status(&mut self, chip: usize) -> Result<StatusRegister, Error<SE, PE>> {
        let mut command = [Command::ReadStatus as u8, 0];
        self.transaction(chip, &mut [Operation::TransferInPlace(&mut command)])
            .await?;
        Ok(command[1].into())
    }

    /// Wait until the chip is done with its write or erase, see [`crate::blocking::EepromArray::wait_ready`]
    pub async fn wait_ready(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        let mut poll = ReadyPoll::new(&self.config);
        while !poll.check(self.read_status(chip).await?)? {
            self.delay.delay_ms(poll.interval_ms()).await;
        }
        Ok(())
    }

    async fn write_enable(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        self.transaction(chip, &mut [Operation::Write(&[Command::WriteEnable as u8])])
            .await
    }

    /// Disable write
    pub async fn write_disable(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        self.transaction(chip, &mut [Operation::Write(&[Command::WriteDisable as u8])])
            .await
    }

    /// Erase a whole chip. Write enable is sent internally
    pub async fn erase_chip(&mut self, chip: usize) -> Result<(), Error<SE, PE>> {
        #[cfg(feature = "defmt")]
        defmt::warn!("Erase chip {=usize}", chip);
        self.write_enable(chip).await?;
        self.transaction(chip, &mut [Operation::Write(&[Command::ChipErase as u8])])
            .await?;
        self.wait_ready(chip).await
    }

    /// Erase every chip of the array, one after the other
    pub async fn erase_all(&mut self) -> Result<(), Error<SE, PE>> {
        for chip in 0..N {
            self.erase_chip(chip).await?;
        }
        Ok(())
    }

    /// Read `buff.len()` bytes from `addr`
    pub async fn read(&mut self, addr: u32, buff: &mut [u8]) -> Result<(), Error<SE, PE>> {
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
            let command = Command::Read.with_addr(segment.offset);
            let chunk = &mut buff[cursor..cursor + segment.len];
            self.transaction(
                segment.chip,
                &mut [Operation::Write(&command), Operation::Read(chunk)],
            )
            .await?;
            cursor += segment.len;
        }
        Ok(())
    }

    /// Write `buff` at `addr`, one page burst at a time, waiting for each burst to complete
    pub async fn write(&mut self, addr: u32, buff: &[u8]) -> Result<(), Error<SE, PE>> {
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
            let command = Command::Write.with_addr(segment.offset);
            let chunk = &buff[cursor..cursor + segment.len];
            self.write_enable(segment.chip).await?;
            self.transaction(
                segment.chip,
                &mut [Operation::Write(&command), Operation::Write(chunk)],
            )
            .await?;
            self.wait_ready(segment.chip).await?;
            cursor += segment.len;
        }
        Ok(())
    }

    /// Read the byte at `addr`
    pub async fn get_byte(&mut self, addr: u32) -> Result<u8, Error<SE, PE>> {
        let mut buff = [0];
        self.read(addr, &mut buff).await?;
        Ok(buff[0])
    }

    /// Write `value` at `addr` and wait for the write to complete
    pub async fn set_byte(&mut self, addr: u32, value: u8) -> Result<(), Error<SE, PE>> {
        self.write(addr, &[value]).await
    }

    /// Read a range of the array, negative bounds count from the end
    pub async fn get_range<R: RangeBounds<i64>>(
        &mut self,
        range: R,
        buff: &mut [u8],
    ) -> Result<(), Error<SE, PE>> {
        let range = normalize_range(range, Self::capacity(self)).ok_or(Error::OutOfBounds)?;
        check_length(&range, buff.len())?;
        self.read(range.start, buff).await
    }

    /// Write a range of the array, negative bounds count from the end
    pub async fn set_range<R: RangeBounds<i64>>(
        &mut self,
        range: R,
        buff: &[u8],
    ) -> Result<(), Error<SE, PE>> {
        let range = normalize_range(range, Self::capacity(self)).ok_or(Error::OutOfBounds)?;
        check_length(&range, buff.len())?;
        self.write(range.start, buff).await
    }

    /// Read whole 512 bytes sectors starting at `block`
    pub async fn read_blocks(&mut self, block: u32, buff: &mut [u8]) -> Result<(), Error<SE, PE>> {
        let addr = block_addr(block, buff.len())?;
        self.read(addr, buff).await
    }

    /// Write whole 512 bytes sectors starting at `block`
    pub async fn write_blocks(&mut self, block: u32, buff: &[u8]) -> Result<(), Error<SE, PE>> {
        let addr = block_addr(block, buff.len())?;
        self.write(addr, buff).await
    }

    pub fn block_count(&self) -> u32 {
        block::block_count(self.capacity())
    }

    /// Capability query, see [`crate::block::BlockDevice::ioctl`]
    pub fn ioctl(&self, op: u8) -> Option<u32> {
        block::ioctl(op, self.block_count())
    }
}

async fn run<SPI: SpiBus, D: DelayNs>(
    spi: &mut SPI,
    delay: &mut D,
    operations: &mut [Operation<'_, u8>],
) -> Result<(), SPI::Error> {
    for operation in operations {
        match operation {
            Operation::Read(buff) => spi.read(buff).await?,
            Operation::Write(buff) => spi.write(buff).await?,
            Operation::Transfer(read, write) => spi.transfer(read, write).await?,
            Operation::TransferInPlace(buff) => spi.transfer_in_place(buff).await?,
            Operation::DelayNs(ns) => {
                spi.flush().await?;
                delay.delay_ns(*ns).await;
            }
        }
    }
    spi.flush().await
}

impl<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> embedded_storage_async::nor_flash::ErrorType
    for AsyncEepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    type Error = Error<SPI::Error, CS::Error>;
}

impl<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> ReadNorFlash
    for AsyncEepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        AsyncEepromArray::read(self, offset, bytes).await
    }

    fn capacity(&self) -> usize {
        AsyncEepromArray::capacity(self) as usize
    }
}

impl<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> NorFlash
    for AsyncEepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = CHIP_SIZE as usize;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to || to > AsyncEepromArray::capacity(self) {
            return Err(Error::OutOfBounds);
        }
        if from % CHIP_SIZE != 0 || to % CHIP_SIZE != 0 {
            return Err(Error::NotAligned);
        }
        for chip in (from / CHIP_SIZE) as usize..(to / CHIP_SIZE) as usize {
            self.erase_chip(chip).await?;
        }
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        AsyncEepromArray::write(self, offset, bytes).await
    }
}

impl<const CHIP_SIZE: u32, SPI, CS, D, const N: usize> MultiwriteNorFlash
    for AsyncEepromArray<CHIP_SIZE, SPI, CS, D, N>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
}
