use crate::audio::AudioState;
use crate::display::Display;
use crate::error::Error;
use crate::font;
use crate::keypad::{KeyState, Keypad};
use crate::memory::{Ram, BIG_FONT_START_ADDR, FONT_START_ADDR, MAX_RAM, SP_START_ADDR};
use crate::options::Options;
use crate::quirks::Quirks;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod execute;

/// The number of general purpose registers.
pub(crate) const NUM_REGISTERS: usize = 16;
/// The number of persistent user flag registers (`Fx75`/`Fx85`).
pub const NUM_USER_FLAGS: usize = 16;
/// The reset value of the XO-CHIP pitch register, corresponding to a
/// 4000 Hz pattern playback rate.
pub(crate) const DEFAULT_PITCH: u8 = 64;
/// One second in nanoseconds; the unit of the scheduler accumulators.
pub(crate) const ONE_SEC_NANOS: u64 = 1_000_000_000;

/// An abstraction of a CHIP-8 family machine, and the core public interface
/// to the crate.
///
/// All state lives on the value: RAM, registers, both display planes, the
/// keypad, the timers and every scheduler accumulator.  A host may own any
/// number of instances, clone one to implement rewind, and drive each with
/// the per-frame protocol: poll input, call [run_frame](Machine::run_frame),
/// then read the display and drain the audio samples.
///
/// Given the same [Options] (including the RNG seed) and the same input
/// trace, execution is fully deterministic.
#[derive(Clone, Debug)]
pub struct Machine {
    // GUEST-VISIBLE STATE
    pub(crate) ram: Ram,            // The 64 KB memory space
    pub(crate) v: [u8; NUM_REGISTERS], // General purpose registers; V[F] is the flag register
    pub(crate) i: u16,              // The index register (used to point to memory addresses)
    pub(crate) pc: u16,             // The program counter
    pub(crate) sp: u16,             // The stack pointer; grows upward through RAM in 2-byte frames
    pub(crate) dt: u8,              // Delay timer, decrements at the timer frequency when non-zero
    pub(crate) st: u8,              // Sound timer, decrements at the timer frequency when non-zero
    pub(crate) display: Display,    // The two-plane frame buffer
    pub(crate) keypad: Keypad,      // The state of each key on the 16-key keypad
    pub(crate) user_flags: [u8; NUM_USER_FLAGS], // Persistent flag storage, host-durable
    pub(crate) beep: bool,          // Whether the host should be producing sound
    pub(crate) exit: bool,          // Set by the exit opcode; the machine halts afterwards
    pub(crate) plane_mask: u8,      // Which display planes sprite and scroll opcodes affect
    pub(crate) pitch: u8,           // The XO-CHIP audio pitch register
    pub(crate) display_updated: bool, // Whether a display-mutating opcode ran this frame
    // CONFIG AND SETUP FIELDS
    pub(crate) cpu_freq: u32,
    pub(crate) timer_freq: u32,
    pub(crate) refresh_freq: u32,
    pub(crate) pc_start_addr: u16,
    pub(crate) quirks: Quirks,
    pub(crate) seed: u64,
    pub(crate) audio_sample_rate: u32,
    pub(crate) halve_lores_scroll: bool,
    pub(crate) big_font_small_fallback: bool,
    // SCHEDULER ACCUMULATORS
    pub(crate) cpu_debt: u32,       // Fractional instructions carried between frames
    pub(crate) timer_accum: u64,    // Nanoseconds accumulated toward the next timer tick
    pub(crate) audio: AudioState,   // Pattern sampler cursor and resampling accumulators
    // TRANSIENT
    pub(crate) audio_out: Vec<i16>, // Samples produced this frame, drained by the host
    pub(crate) rng: StdRng,         // Seeded generator backing Cxkk and RAM noise
}

impl Machine {
    /// Constructor that returns a freshly-initialised [Machine] with fonts
    /// loaded, ready for [load_rom](Machine::load_rom).
    ///
    /// # Arguments
    ///
    /// * `options` - an [Options] instance holding start-up configuration
    pub fn new(options: Options) -> Self {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut ram = Ram::new();
        if !options.quirks.ram_init {
            ram.randomize(&mut rng);
        }
        let mut machine = Machine {
            ram,
            v: [0x0; NUM_REGISTERS],
            i: 0x0,
            pc: options.pc_start_addr,
            sp: SP_START_ADDR,
            dt: 0x0,
            st: 0x0,
            display: Display::new(),
            keypad: Keypad::new(),
            user_flags: [0x0; NUM_USER_FLAGS],
            beep: false,
            exit: false,
            plane_mask: 0x1,
            pitch: DEFAULT_PITCH,
            display_updated: false,
            // A zero frequency would stall the scheduler's division; clamp.
            cpu_freq: options.cpu_freq.max(1),
            timer_freq: options.timer_freq.max(1),
            refresh_freq: options.refresh_freq.max(1),
            pc_start_addr: options.pc_start_addr,
            quirks: options.quirks,
            seed: options.seed,
            audio_sample_rate: options.audio_sample_rate.max(1),
            halve_lores_scroll: options.halve_lores_scroll,
            big_font_small_fallback: options.big_font_small_fallback,
            cpu_debt: 0,
            timer_accum: 0,
            audio: AudioState::default(),
            audio_out: Vec::new(),
            rng,
        };
        machine.load_font();
        machine
    }

    /// Writes the small and big font tables to their fixed addresses.
    /// Idempotent; called during construction and hard reset.
    pub fn load_font(&mut self) {
        self.ram.write_slice(FONT_START_ADDR, &font::FONT_DATA);
        self.ram.write_slice(BIG_FONT_START_ADDR, &font::BIG_FONT_DATA);
    }

    /// Copies the ROM image into memory starting at the program start
    /// address.  An empty image, or one that does not fit below the top of
    /// RAM, fails with [Error::RomLoad] and leaves memory untouched.
    ///
    /// # Arguments
    ///
    /// * `rom` - the raw ROM bytes, headerless
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Error> {
        let capacity = MAX_RAM - self.pc_start_addr as usize;
        if rom.is_empty() || rom.len() > capacity {
            return Err(Error::RomLoad {
                rom_size: rom.len(),
                capacity,
            });
        }
        self.ram.write_slice(self.pc_start_addr, rom);
        Ok(())
    }

    /// Restores every non-RAM field to its initial value and blanks the
    /// display, leaving the loaded font and ROM in place.  User flags
    /// survive, as they model storage that outlives a session.
    pub fn soft_reset(&mut self) {
        self.v = [0x0; NUM_REGISTERS];
        self.i = 0x0;
        self.pc = self.pc_start_addr;
        self.sp = SP_START_ADDR;
        self.dt = 0x0;
        self.st = 0x0;
        self.display = Display::new();
        self.keypad.reset();
        self.beep = false;
        self.exit = false;
        self.plane_mask = 0x1;
        self.pitch = DEFAULT_PITCH;
        self.display_updated = true;
        self.cpu_debt = 0;
        self.timer_accum = 0;
        self.audio = AudioState::default();
        self.audio_out.clear();
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Reinitialises RAM (honouring the RAM-init quirk), reloads the fonts
    /// and the supplied ROM, and performs a soft reset.
    ///
    /// # Arguments
    ///
    /// * `rom` - the raw ROM bytes to reload
    pub fn hard_reset(&mut self, rom: &[u8]) -> Result<(), Error> {
        self.soft_reset();
        self.ram = Ram::new();
        if !self.quirks.ram_init {
            self.ram.randomize(&mut self.rng);
        }
        self.load_font();
        self.load_rom(rom)
    }

    /// Sets the current CPU frequency in instructions per second.  Zero is
    /// ignored.
    pub fn set_cpu_freq(&mut self, hz: u32) {
        if hz > 0 {
            self.cpu_freq = hz;
        }
    }

    /// Returns the current CPU frequency in instructions per second.
    pub fn cpu_freq(&self) -> u32 {
        self.cpu_freq
    }

    /// Runs one host frame: executes `(cpu_freq + debt) / refresh_freq`
    /// instructions, carries the fractional remainder into the next frame,
    /// keeps the 60 Hz timers on schedule, and produces this frame's audio
    /// samples (drain them with
    /// [take_audio_samples](Machine::take_audio_samples)).
    ///
    /// The display-updated flag reflects whether any instruction in the
    /// frame touched the frame buffer.  Once [exit](Machine::exit) is set the
    /// frame ends early after the current instruction.
    pub fn run_frame(&mut self) {
        self.display_updated = false;
        self.audio_out.clear();
        let steps = (self.cpu_freq + self.cpu_debt) / self.refresh_freq;
        let cycle_step = ONE_SEC_NANOS / self.cpu_freq as u64;
        for _ in 0..steps {
            if self.exit {
                break;
            }
            self.execute();
            if self.timer_freq != self.refresh_freq {
                self.accumulate_timer_time(cycle_step);
            }
            self.pump_audio(cycle_step);
        }
        self.cpu_debt = (self.cpu_freq + self.cpu_debt) % self.refresh_freq;
        if self.timer_freq == self.refresh_freq {
            self.handle_timers();
        }
    }

    /// Executes one instruction and advances the timer accumulators by one
    /// instruction's worth of time.  A convenience for hosts that pace the
    /// interpreter themselves instead of frame-batching.
    pub fn cycle(&mut self) -> bool {
        let fired = self.execute();
        self.accumulate_timer_time(ONE_SEC_NANOS / self.cpu_freq as u64);
        fired
    }

    /// Applies one timer tick: decrements the delay and sound timers if
    /// running and rederives the beep line.
    pub fn handle_timers(&mut self) {
        if self.dt > 0 {
            self.dt -= 1;
        }
        if self.st > 0 {
            self.st -= 1;
            self.beep = self.st > 0;
        }
    }

    /// Converts elapsed emulated time into timer ticks.
    fn accumulate_timer_time(&mut self, elapsed_nanos: u64) {
        let timer_step = ONE_SEC_NANOS / self.timer_freq as u64;
        self.timer_accum += elapsed_nanos;
        while self.timer_accum >= timer_step {
            self.timer_accum -= timer_step;
            self.handle_timers();
        }
    }

    /// Records one frame's physical state for a key, deriving the
    /// pressed/released edges the interpreter consumes.  See
    /// [Keypad::poll](crate::Keypad::poll).
    pub fn poll_key(&mut self, key: u8, is_down: bool) -> Result<(), Error> {
        self.keypad.poll(key, is_down)
    }

    /// Sets the state of one key directly.
    pub fn set_key(&mut self, key: u8, state: KeyState) -> Result<(), Error> {
        self.keypad.set_state(key, state)
    }

    /// Returns a by-value copy of the whole machine, suitable for a host
    /// rewind ring.  Restoring a snapshot taken this way resumes the exact
    /// RNG stream.
    pub fn snapshot(&self) -> Machine {
        self.clone()
    }

    /// Replaces the current state with a previously taken snapshot.
    pub fn restore(&mut self, snapshot: Machine) {
        *self = snapshot;
    }

    /// Returns the persistent user flag registers.
    pub fn user_flags(&self) -> &[u8; NUM_USER_FLAGS] {
        &self.user_flags
    }

    /// Replaces the persistent user flag registers, typically with a blob
    /// the host read back from durable storage.
    pub fn set_user_flags(&mut self, flags: [u8; NUM_USER_FLAGS]) {
        self.user_flags = flags;
    }

    /// Returns a read-only view of the frame buffer.
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Returns a read-only view of the keypad state.
    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }

    /// Returns a read-only view of memory (the audio pattern, loaded ROM and
    /// font tables are all visible here).
    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    /// Returns true while the sound timer is running, i.e. while the host
    /// should be producing sound.
    pub fn beep(&self) -> bool {
        self.beep
    }

    /// Returns true once the guest has executed the exit opcode.
    pub fn exit(&self) -> bool {
        self.exit
    }

    /// Returns true when the display is in high-resolution mode.
    pub fn hires(&self) -> bool {
        self.display.hires()
    }

    /// Returns whether the frame buffer changed during the last frame.
    pub fn display_updated(&self) -> bool {
        self.display_updated
    }
}
