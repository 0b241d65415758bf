use std::error;
use std::fmt;

/// The typed failures surfaced to the hosting application through the public
/// API methods.
///
/// Only ROM loading and snapshot decoding can fail from the host's point of
/// view.  Every other abnormal condition the interpreter can run into
/// (unknown opcodes, addresses past the end of RAM, call stack faults) is
/// soft-handled inside the core so that ill-behaved ROMs keep running; such
/// events are reported through the `log` facade instead of as errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The supplied ROM image is empty, or does not fit between the program
    /// start address and the end of RAM
    RomLoad { rom_size: usize, capacity: usize },
    /// A snapshot buffer is too small, carries the wrong magic bytes, or was
    /// produced by an incompatible format version
    SnapshotInvalid { reason: &'static str },
    /// A key ordinal was referenced that is outside the valid keypad range
    /// (0x0 to 0xF)
    InvalidKey { key: u8 },
}

impl error::Error for Error {}

impl fmt::Display for Error {
    /// Returns a textual description of each enum variant for display purposes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RomLoad { rom_size, capacity } => {
                write!(
                    f,
                    "cannot load a {} byte ROM into {} bytes of program space",
                    rom_size, capacity
                )
            }
            Error::SnapshotInvalid { reason } => {
                write!(f, "snapshot buffer rejected: {}", reason)
            }
            Error::InvalidKey { key } => {
                write!(f, "invalid key {:#X} was specified", key)
            }
        }
    }
}
