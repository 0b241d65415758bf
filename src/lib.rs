//! An emulator core for the CHIP-8 virtual machine and its extended
//! dialects (SUPER-CHIP 1.1 and XO-CHIP).
//!
//! The crate owns the decode/execute pipeline, the two-plane sprite engine
//! with its compatibility quirks, the instruction/timer/audio scheduler and
//! a packed snapshot format.  Everything a front-end needs — windowing,
//! audio output, ROM file I/O, input mapping — stays on the host side of
//! the [Machine] facade.

mod audio;
mod display;
mod error;
mod font;
mod instruction;
mod keypad;
mod machine;
mod memory;
mod options;
mod quirks;
mod snapshot;

// Re-exports
pub use crate::display::{
    Display, Plane, DISPLAY_HEIGHT, DISPLAY_WIDTH, LORES_HEIGHT, LORES_WIDTH, NUM_PLANES,
};
pub use crate::error::Error;
pub use crate::keypad::{KeyState, Keypad, NUM_KEYS};
pub use crate::machine::{Machine, NUM_USER_FLAGS};
pub use crate::memory::{
    Ram, AUDIO_BUF_ADDR, AUDIO_BUF_SIZE, BIG_FONT_START_ADDR, FONT_START_ADDR, MAX_RAM,
    SP_START_ADDR,
};
pub use crate::options::{
    Options, CPU_FREQ_DEFAULT, PC_START_ADDR_DEFAULT, REFRESH_FREQ_DEFAULT, TIMER_FREQ_DEFAULT,
};
pub use crate::quirks::{Quirks, NUM_QUIRKS};
pub use crate::snapshot::SNAPSHOT_SIZE;
