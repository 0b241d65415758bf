use crate::audio::AudioState;
use crate::display::{Display, DISPLAY_HEIGHT, DISPLAY_WIDTH, NUM_PLANES};
use crate::error::Error;
use crate::keypad::{Keypad, NUM_KEYS};
use crate::machine::{Machine, NUM_REGISTERS, NUM_USER_FLAGS};
use crate::memory::{Ram, MAX_RAM};
use crate::quirks::{Quirks, NUM_QUIRKS};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// The magic bytes at the start of every packed snapshot.
const MAGIC: [u8; 4] = *b"CH8S";
/// The packed snapshot format version.  Bumped whenever the layout below
/// changes; old buffers then fail with [Error::SnapshotInvalid] instead of
/// decoding garbage.
const VERSION: u16 = 1;
/// One display plane, bit-packed.
const PLANE_BYTES: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT / 8;

/// The exact size in bytes of a packed snapshot.
///
/// The layout is a flat, little-endian record of every field in the machine
/// state plus the scheduler accumulators; the constant is the term-by-term
/// sum of the layout, in write order.
pub const SNAPSHOT_SIZE: usize = MAGIC.len()
    + 2 // version
    + MAX_RAM
    + NUM_REGISTERS
    + 2 // i
    + 2 // pc
    + 2 // sp
    + 1 // dt
    + 1 // st
    + NUM_USER_FLAGS
    + NUM_KEYS
    + 1 // beep
    + 1 // exit
    + 1 // hires
    + 1 // plane_mask
    + 1 // pitch
    + 1 // display_updated
    + 4 // cpu_freq
    + 4 // timer_freq
    + 4 // refresh_freq
    + 2 // pc_start_addr
    + NUM_QUIRKS
    + 8 // seed
    + 4 // audio_sample_rate
    + 1 // halve_lores_scroll
    + 1 // big_font_small_fallback
    + 4 // cpu_debt
    + 8 // timer_accum
    + 4 // audio playback_freq
    + 8 // audio pattern_counter
    + 8 // audio resample_counter
    + 2 // audio pattern_cursor
    + NUM_PLANES * PLANE_BYTES;

/// A bounds-unchecked forward cursor over the output buffer; the caller
/// validates the total length once up front.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    fn put_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.put(&value.to_le_bytes());
    }
}

/// The matching forward cursor over an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        let bytes = &buf[self.pos..self.pos + len];
        self.pos += len;
        bytes
    }

    fn take_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn take_bool(&mut self) -> bool {
        self.take_u8() != 0
    }

    fn take_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take(2).try_into().unwrap())
    }

    fn take_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take(4).try_into().unwrap())
    }

    fn take_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take(8).try_into().unwrap())
    }
}

impl Machine {
    /// Packs the whole machine state into `buf`, which must hold at least
    /// [SNAPSHOT_SIZE] bytes.  The format is version-tagged; restoring is
    /// byte-exact except for the RNG, which restarts from the recorded seed
    /// (value snapshots via [snapshot](Machine::snapshot) preserve the exact
    /// stream).
    pub fn serialize(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < SNAPSHOT_SIZE {
            return Err(Error::SnapshotInvalid {
                reason: "buffer too small",
            });
        }
        let mut writer = Writer { buf, pos: 0 };
        writer.put(&MAGIC);
        writer.put_u16(VERSION);
        writer.put(self.ram.as_bytes());
        writer.put(&self.v);
        writer.put_u16(self.i);
        writer.put_u16(self.pc);
        writer.put_u16(self.sp);
        writer.put_u8(self.dt);
        writer.put_u8(self.st);
        writer.put(&self.user_flags);
        writer.put(&self.keypad.to_bytes());
        writer.put_bool(self.beep);
        writer.put_bool(self.exit);
        writer.put_bool(self.display.hires());
        writer.put_u8(self.plane_mask);
        writer.put_u8(self.pitch);
        writer.put_bool(self.display_updated);
        writer.put_u32(self.cpu_freq);
        writer.put_u32(self.timer_freq);
        writer.put_u32(self.refresh_freq);
        writer.put_u16(self.pc_start_addr);
        for quirk in self.quirks.to_array() {
            writer.put_bool(quirk);
        }
        writer.put_u64(self.seed);
        writer.put_u32(self.audio_sample_rate);
        writer.put_bool(self.halve_lores_scroll);
        writer.put_bool(self.big_font_small_fallback);
        writer.put_u32(self.cpu_debt);
        writer.put_u64(self.timer_accum);
        writer.put_u32(self.audio.playback_freq);
        writer.put_u64(self.audio.pattern_counter);
        writer.put_u64(self.audio.resample_counter);
        writer.put_u16(self.audio.pattern_cursor);
        for plane in 0..NUM_PLANES {
            write_plane(&mut writer, self.display.plane(plane));
        }
        Ok(())
    }

    /// Rebuilds a machine from a buffer produced by
    /// [serialize](Machine::serialize).  Fails with [Error::SnapshotInvalid]
    /// on a short buffer, wrong magic or incompatible version.
    pub fn deserialize(buf: &[u8]) -> Result<Machine, Error> {
        if buf.len() < SNAPSHOT_SIZE {
            return Err(Error::SnapshotInvalid {
                reason: "buffer too small",
            });
        }
        let mut reader = Reader { buf, pos: 0 };
        if reader.take(MAGIC.len()) != MAGIC.as_slice() {
            return Err(Error::SnapshotInvalid {
                reason: "bad magic bytes",
            });
        }
        if reader.take_u16() != VERSION {
            return Err(Error::SnapshotInvalid {
                reason: "unsupported format version",
            });
        }
        let mut ram = Ram::new();
        ram.write_slice(0, reader.take(MAX_RAM));
        let mut v = [0u8; NUM_REGISTERS];
        v.copy_from_slice(reader.take(NUM_REGISTERS));
        let i = reader.take_u16();
        let pc = reader.take_u16();
        let sp = reader.take_u16();
        let dt = reader.take_u8();
        let st = reader.take_u8();
        let mut user_flags = [0u8; NUM_USER_FLAGS];
        user_flags.copy_from_slice(reader.take(NUM_USER_FLAGS));
        let mut keypad_bytes = [0u8; NUM_KEYS];
        keypad_bytes.copy_from_slice(reader.take(NUM_KEYS));
        let keypad = Keypad::from_bytes(&keypad_bytes);
        let beep = reader.take_bool();
        let exit = reader.take_bool();
        let hires = reader.take_bool();
        let plane_mask = reader.take_u8();
        let pitch = reader.take_u8();
        let display_updated = reader.take_bool();
        let cpu_freq = reader.take_u32();
        let timer_freq = reader.take_u32();
        let refresh_freq = reader.take_u32();
        let pc_start_addr = reader.take_u16();
        let mut quirk_flags = [false; NUM_QUIRKS];
        for flag in quirk_flags.iter_mut() {
            *flag = reader.take_bool();
        }
        let seed = reader.take_u64();
        let audio_sample_rate = reader.take_u32();
        let halve_lores_scroll = reader.take_bool();
        let big_font_small_fallback = reader.take_bool();
        let cpu_debt = reader.take_u32();
        let timer_accum = reader.take_u64();
        let audio = AudioState {
            playback_freq: reader.take_u32(),
            pattern_counter: reader.take_u64(),
            resample_counter: reader.take_u64(),
            pattern_cursor: reader.take_u16(),
        };
        let mut display = Display::new();
        display.set_hires(hires, false);
        for plane in 0..NUM_PLANES {
            read_plane(&mut reader, display.plane_mut(plane));
        }
        Ok(Machine {
            ram,
            v,
            i,
            pc,
            sp,
            dt,
            st,
            display,
            keypad,
            user_flags,
            beep,
            exit,
            plane_mask,
            pitch,
            display_updated,
            cpu_freq: cpu_freq.max(1),
            timer_freq: timer_freq.max(1),
            refresh_freq: refresh_freq.max(1),
            pc_start_addr,
            quirks: Quirks::from(quirk_flags),
            seed,
            audio_sample_rate: audio_sample_rate.max(1),
            halve_lores_scroll,
            big_font_small_fallback,
            cpu_debt,
            timer_accum,
            audio,
            audio_out: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

/// Bit-packs one plane, row-major, most significant bit leftmost.
fn write_plane(writer: &mut Writer<'_>, plane: &crate::display::Plane) {
    for row in plane.iter() {
        for chunk in row.chunks(8) {
            let mut byte = 0u8;
            for (bit, pixel) in chunk.iter().enumerate() {
                if *pixel {
                    byte |= 0x80 >> bit;
                }
            }
            writer.put_u8(byte);
        }
    }
}

/// Unpacks one bit-packed plane written by [write_plane].
fn read_plane(reader: &mut Reader<'_>, plane: &mut crate::display::Plane) {
    for row in plane.iter_mut() {
        for chunk in row.chunks_mut(8) {
            let byte = reader.take_u8();
            for (bit, pixel) in chunk.iter_mut().enumerate() {
                *pixel = byte & (0x80 >> bit) != 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::KeyState;
    use crate::options::Options;

    fn setup_exercised_machine() -> Machine {
        let mut machine = Machine::new(Options::default());
        machine
            .load_rom(&[0x60, 0x69, 0xA3, 0x00, 0xD0, 0x15, 0x00, 0xFF])
            .unwrap();
        for _ in 0..4 {
            machine.execute();
        }
        machine.dt = 7;
        machine.st = 3;
        machine.beep = true;
        machine.set_key(0x4, KeyState::Down).unwrap();
        machine.user_flags[2] = 0xAB;
        machine.cpu_debt = 13;
        machine.timer_accum = 5_000;
        machine.audio.pattern_cursor = 17;
        machine
    }

    #[test]
    fn test_round_trip_is_identity_on_visible_state() {
        let machine = setup_exercised_machine();
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        machine.serialize(&mut buf).unwrap();
        let restored = Machine::deserialize(&buf).unwrap();
        assert_eq!(restored.ram, machine.ram);
        assert_eq!(restored.v, machine.v);
        assert_eq!(restored.i, machine.i);
        assert_eq!(restored.pc, machine.pc);
        assert_eq!(restored.sp, machine.sp);
        assert_eq!((restored.dt, restored.st), (machine.dt, machine.st));
        assert_eq!(restored.display, machine.display);
        assert_eq!(restored.keypad, machine.keypad);
        assert_eq!(restored.user_flags, machine.user_flags);
        assert_eq!(restored.beep, machine.beep);
        assert_eq!(restored.hires(), machine.hires());
        assert_eq!(restored.quirks, machine.quirks);
        assert_eq!(restored.cpu_debt, machine.cpu_debt);
        assert_eq!(restored.timer_accum, machine.timer_accum);
        assert_eq!(restored.audio, machine.audio);
    }

    #[test]
    fn test_serialize_round_trips_twice() {
        // Serialization must not disturb the source machine.
        let machine = setup_exercised_machine();
        let mut first = vec![0u8; SNAPSHOT_SIZE];
        let mut second = vec![0u8; SNAPSHOT_SIZE];
        machine.serialize(&mut first).unwrap();
        machine.serialize(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_buffer_too_small_error() {
        let machine = Machine::new(Options::default());
        let mut buf = vec![0u8; SNAPSHOT_SIZE - 1];
        assert_eq!(
            machine.serialize(&mut buf).unwrap_err(),
            Error::SnapshotInvalid {
                reason: "buffer too small"
            }
        );
        assert_eq!(
            Machine::deserialize(&buf).unwrap_err(),
            Error::SnapshotInvalid {
                reason: "buffer too small"
            }
        );
    }

    #[test]
    fn test_bad_magic_error() {
        let machine = Machine::new(Options::default());
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        machine.serialize(&mut buf).unwrap();
        buf[0] = b'X';
        assert_eq!(
            Machine::deserialize(&buf).unwrap_err(),
            Error::SnapshotInvalid {
                reason: "bad magic bytes"
            }
        );
    }

    #[test]
    fn test_version_mismatch_error() {
        let machine = Machine::new(Options::default());
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        machine.serialize(&mut buf).unwrap();
        buf[4] = VERSION as u8 + 1;
        assert_eq!(
            Machine::deserialize(&buf).unwrap_err(),
            Error::SnapshotInvalid {
                reason: "unsupported format version"
            }
        );
    }

    #[test]
    fn test_restored_machine_resumes_execution() {
        let mut machine = Machine::new(Options::default());
        machine.load_rom(&[0x60, 0x11, 0x61, 0x22]).unwrap();
        machine.execute();
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        machine.serialize(&mut buf).unwrap();
        let mut restored = Machine::deserialize(&buf).unwrap();
        restored.execute();
        assert_eq!(restored.v[0x0], 0x11);
        assert_eq!(restored.v[0x1], 0x22);
        assert_eq!(restored.pc, 0x204);
    }
}
