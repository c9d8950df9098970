/// Instruction set of the 25xx1024 family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    #[allow(dead_code)]
    WriteStatus = 0x01,
    Write = 0x02,
    Read = 0x03,
    WriteDisable = 0x04,
    ReadStatus = 0x05,
    WriteEnable = 0x06,
    ReleasePowerDown = 0xAB,
    ChipErase = 0xC7,
    Dummy = 0x00,
}

impl Command {
    /// Opcode followed by the 24 bit big endian address
    pub(crate) fn with_addr(self, offset: u32) -> [u8; 4] {
        [
            self as u8,
            (offset >> 16) as u8,
            (offset >> 8) as u8,
            offset as u8,
        ]
    }
}
