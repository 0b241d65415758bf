use crate::quirks::Quirks;
use serde_derive::{Deserialize, Serialize};

/// The default CPU frequency in instructions per second.
pub const CPU_FREQ_DEFAULT: u32 = 1000;
/// The default delay/sound timer frequency in hertz.
pub const TIMER_FREQ_DEFAULT: u32 = 60;
/// The default host refresh frequency in frames per second.
pub const REFRESH_FREQ_DEFAULT: u32 = 60;
/// The default program start address within memory.
pub const PC_START_ADDR_DEFAULT: u16 = 0x200;
/// The default host audio output rate in samples per second.
const AUDIO_SAMPLE_RATE_DEFAULT: u32 = 44100;

/// A struct to allow specification of emulator start-up parameters.
///
/// The core provides many configurable options: the scheduling frequencies,
/// the program start address, the ten compatibility [Quirks], and toggles for
/// the handful of behaviours that remain genuinely ambiguous across dialects.
/// An instance of this struct is passed to
/// [Machine::new()](crate::Machine::new) when instantiating
/// [Machine](crate::Machine).
///
/// Options round-trip through JSON so hosts can persist per-ROM profiles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Instructions executed per second
    pub cpu_freq: u32,
    /// Delay and sound timer decrement rate in hertz
    pub timer_freq: u32,
    /// Host frame rate assumed by [run_frame](crate::Machine::run_frame)
    pub refresh_freq: u32,
    /// Address at which the ROM is loaded and execution begins
    pub pc_start_addr: u16,
    /// The ten compatibility toggles
    pub quirks: Quirks,
    /// Seed for the deterministic random number generator (`Cxkk`, RAM noise)
    pub seed: u64,
    /// Host audio output rate the pattern sampler resamples to
    pub audio_sample_rate: u32,
    /// Apply scroll opcodes as `n / 2` pixels in lo-res, matching legacy
    /// SUPER-CHIP where `n` counts physical hi-res pixels
    pub halve_lores_scroll: bool,
    /// `Fx30` falls back to the small font for digits `0xA..=0xF`; disabled
    /// indexes the big font unconditionally, matching SUPER-CHIP 1.1
    pub big_font_small_fallback: bool,
}

impl Default for Options {
    /// Constructor that returns an [Options] instance using typical default
    /// settings.
    fn default() -> Self {
        Options {
            cpu_freq: CPU_FREQ_DEFAULT,
            timer_freq: TIMER_FREQ_DEFAULT,
            refresh_freq: REFRESH_FREQ_DEFAULT,
            pc_start_addr: PC_START_ADDR_DEFAULT,
            quirks: Quirks::default(),
            seed: 0,
            audio_sample_rate: AUDIO_SAMPLE_RATE_DEFAULT,
            halve_lores_scroll: false,
            big_font_small_fallback: false,
        }
    }
}

impl Options {
    /// Deserialises an [Options] instance from a JSON string.  Fields missing
    /// from the document keep their default values, so stored profiles stay
    /// loadable when new options are introduced.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialises this [Options] instance to a JSON string for persistence.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
