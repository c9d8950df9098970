use bit::BitIndex;

/// Electronic signature returned by the release from deep power-down instruction
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectronicSignature(pub u8);

/// Status register of a 25xx1024
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister {
    pub write_protect_enable: bool,
    pub protected_block: u8,
    pub write_enable_latch: bool,
    pub wip_bit: bool,
}

impl StatusRegister {
    /// Any of the block protect bits is set
    pub fn is_protected(&self) -> bool {
        self.protected_block != 0
    }
}

impl From<u8> for StatusRegister {
    fn from(val: u8) -> StatusRegister {
        StatusRegister {
            write_protect_enable: val.bit(7),
            protected_block: val.bit_range(2..4),
            write_enable_latch: val.bit(1),
            wip_bit: val.bit(0),
        }
    }
}
