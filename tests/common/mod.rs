//! A simulated bus of 25xx1024 like EEPROMs, each behind its own chip select.
#![allow(dead_code)]

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use embedded_hal::{
    digital::{ErrorType as PinErrorType, OutputPin},
    spi::{self, ErrorKind, ErrorType},
};

pub const READ: u8 = 0x03;
pub const WRITE: u8 = 0x02;
pub const WREN: u8 = 0x06;
pub const WRDI: u8 = 0x04;
pub const RDSR: u8 = 0x05;
pub const RDID: u8 = 0xAB;
pub const CE: u8 = 0xC7;

pub const SIGNATURE: u8 = 0x29;
const PAGE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl spi::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct Chip {
    pub memory: Vec<u8>,
    pub signature: u8,
    pub write_enable_latch: bool,
    pub protected_block: u8,
    /// Status reads still answering busy
    pub busy: u32,
    /// Status reads answering busy after each write or erase
    pub write_cycle: u32,
}

impl Chip {
    fn status(&self) -> u8 {
        let mut status = self.protected_block << 2;
        if self.write_enable_latch {
            status |= 0b10;
        }
        if self.busy > 0 {
            status |= 0b01;
        }
        status
    }
}

/// A complete chip select low..high frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub chip: usize,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn addr(&self) -> usize {
        ((self.bytes[1] as usize) << 16) | ((self.bytes[2] as usize) << 8) | self.bytes[3] as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[4..]
    }
}

pub struct Sim {
    pub chips: Vec<Chip>,
    pub selected: Option<usize>,
    current: Vec<u8>,
    pub frames: Vec<Frame>,
    /// Bytes clocked while no chip was selected
    pub stray_bytes: usize,
    pub fail_next_transfer: bool,
}

impl Sim {
    fn clock(&mut self, mosi: u8) -> u8 {
        let Some(chip) = self.selected else {
            self.stray_bytes += 1;
            return 0xFF;
        };
        let idx = self.current.len();
        self.current.push(mosi);
        let chip = &mut self.chips[chip];
        match self.current[0] {
            READ if idx >= 4 => {
                let addr = ((self.current[1] as usize) << 16)
                    | ((self.current[2] as usize) << 8)
                    | self.current[3] as usize;
                let size = chip.memory.len();
                chip.memory[(addr + idx - 4) % size]
            }
            RDSR if idx >= 1 => {
                let status = chip.status();
                chip.busy = chip.busy.saturating_sub(1);
                status
            }
            RDID if idx >= 4 => chip.signature,
            _ => 0,
        }
    }

    fn select(&mut self, chip: usize) {
        assert!(
            self.selected.is_none(),
            "chip {chip} selected while chip {:?} is active",
            self.selected
        );
        self.selected = Some(chip);
        self.current.clear();
    }

    fn deselect(&mut self, index: usize) {
        if self.selected != Some(index) {
            return;
        }
        self.selected = None;
        let bytes = core::mem::take(&mut self.current);
        if bytes.is_empty() {
            return;
        }
        let chip = &mut self.chips[index];
        match bytes[0] {
            WREN => chip.write_enable_latch = true,
            WRDI => chip.write_enable_latch = false,
            WRITE if chip.write_enable_latch && bytes.len() > 4 => {
                let addr = ((bytes[1] as usize) << 16) | ((bytes[2] as usize) << 8) | bytes[3] as usize;
                // The address counter wraps inside the page
                let page_start = addr & !(PAGE - 1);
                for (i, byte) in bytes[4..].iter().enumerate() {
                    let offset = (addr - page_start + i) % PAGE;
                    chip.memory[page_start + offset] = *byte;
                }
                chip.write_enable_latch = false;
                chip.busy = chip.write_cycle;
            }
            CE if chip.write_enable_latch => {
                chip.memory.fill(0xFF);
                chip.write_enable_latch = false;
                chip.busy = chip.write_cycle;
            }
            _ => {}
        }
        self.frames.push(Frame { chip: index, bytes });
    }

    fn check_failure(&mut self) -> Result<(), SimError> {
        if core::mem::take(&mut self.fail_next_transfer) {
            return Err(SimError);
        }
        Ok(())
    }

    pub fn frames_with(&self, opcode: u8) -> Vec<&Frame> {
        self.frames.iter().filter(|f| f.opcode() == opcode).collect()
    }
}

pub type Shared = Rc<RefCell<Sim>>;

pub fn sim(chips: usize, chip_size: usize) -> Shared {
    let chips = (0..chips)
        .map(|_| Chip {
            memory: vec![0; chip_size],
            signature: SIGNATURE,
            write_enable_latch: false,
            protected_block: 0,
            busy: 0,
            write_cycle: 2,
        })
        .collect();
    Rc::new(RefCell::new(Sim {
        chips,
        selected: None,
        current: Vec::new(),
        frames: Vec::new(),
        stray_bytes: 0,
        fail_next_transfer: false,
    }))
}

pub struct SimBus(pub Shared);

impl ErrorType for SimBus {
    type Error = SimError;
}

impl SimBus {
    fn do_read(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.check_failure()?;
        for word in words {
            *word = sim.clock(0);
        }
        Ok(())
    }

    fn do_write(&mut self, words: &[u8]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.check_failure()?;
        for word in words {
            sim.clock(*word);
        }
        Ok(())
    }

    fn do_transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.check_failure()?;
        for i in 0..read.len().max(write.len()) {
            let miso = sim.clock(write.get(i).copied().unwrap_or(0));
            if let Some(word) = read.get_mut(i) {
                *word = miso;
            }
        }
        Ok(())
    }

    fn do_transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        sim.check_failure()?;
        for word in words {
            *word = sim.clock(*word);
        }
        Ok(())
    }
}

impl spi::SpiBus for SimBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        self.do_read(words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), SimError> {
        self.do_write(words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), SimError> {
        self.do_transfer(read, write)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        self.do_transfer_in_place(words)
    }

    fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

impl embedded_hal_async::spi::SpiBus for SimBus {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        self.do_read(words)
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), SimError> {
        self.do_write(words)
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), SimError> {
        self.do_transfer(read, write)
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        self.do_transfer_in_place(words)
    }

    async fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

pub struct SimPin {
    pub index: usize,
    pub sim: Shared,
    pub selects: usize,
}

impl PinErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.selects += 1;
        self.sim.borrow_mut().select(self.index);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.sim.borrow_mut().deselect(self.index);
        Ok(())
    }
}

/// Records the requested delays instead of sleeping
#[derive(Default)]
pub struct SimDelay {
    pub total_ns: u64,
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

pub fn parts<const N: usize>(sim: &Shared) -> (SimBus, [SimPin; N], SimDelay) {
    let pins = core::array::from_fn(|index| SimPin {
        index,
        sim: sim.clone(),
        selects: 0,
    });
    (SimBus(sim.clone()), pins, SimDelay::default())
}

/// Every write or erase frame directly follows a write enable on the same chip
pub fn assert_write_enabled(sim: &Sim) {
    for (i, frame) in sim.frames.iter().enumerate() {
        if frame.opcode() == WRITE || frame.opcode() == CE {
            assert!(i > 0, "{frame:?} is the first frame");
            let previous = &sim.frames[i - 1];
            assert_eq!(previous.opcode(), WREN, "{frame:?} not preceded by WREN");
            assert_eq!(previous.chip, frame.chip);
        }
    }
}
