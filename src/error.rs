use crate::register::StatusRegister;

/// All possible errors emitted by the driver
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SpiError, PinError> {
    /// Internal Spi error
    Spi(SpiError),

    /// A chip select line could not be driven
    Pin(PinError),

    /// The chip behind this chip select did not answer with the expected signature
    ChipNotFound(usize),

    /// Address out of bound
    OutOfBounds,

    /// The buffer length does not match the requested range
    LengthMismatch,

    /// Invalid value passed
    Value,

    /// Address or length not aligned
    NotAligned,

    /// Block protect bits are set, which the driver does not support
    Protected(StatusRegister),

    /// The chip did not report ready in time
    Timeout,
}

mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

    impl<SpiError, PinError> From<NorFlashErrorKind> for Error<SpiError, PinError> {
        fn from(e: NorFlashErrorKind) -> Self {
            match e {
                NorFlashErrorKind::NotAligned => Error::NotAligned,
                NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
                _ => Error::Value,
            }
        }
    }

    impl<SpiError, PinError> NorFlashError for Error<SpiError, PinError>
    where
        SpiError: Debug,
        PinError: Debug,
    {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
                Error::NotAligned => NorFlashErrorKind::NotAligned,
                _ => NorFlashErrorKind::Other,
            }
        }
    }

}
