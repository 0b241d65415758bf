use crate::machine::{Machine, ONE_SEC_NANOS};
use crate::memory::{AUDIO_BUF_ADDR, AUDIO_BUF_SIZE};

/// The amplitude emitted for a set pattern bit.
const SAMPLE_HIGH: i16 = i16::MAX;

/// The audio sampler's cursor and accumulators.
///
/// The XO-CHIP pattern buffer is a 128-bit loop played back at a frequency
/// derived from the pitch register.  Two nanosecond accumulators translate
/// emulated CPU time first into pattern bits and then into host-rate
/// samples, so audio stays in lockstep with execution and with snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct AudioState {
    /// Pattern playback rate in bits per second; 0 means it needs
    /// recomputing from the pitch register at the next beeping instruction
    pub(crate) playback_freq: u32,
    /// Nanoseconds accumulated toward the next pattern bit
    pub(crate) pattern_counter: u64,
    /// Nanoseconds accumulated toward the next host-rate sample
    pub(crate) resample_counter: u64,
    /// Bit cursor into the 128-bit pattern
    pub(crate) pattern_cursor: u16,
}

impl Machine {
    /// Computes the current pattern playback rate in hertz from the pitch
    /// register, per the XO-CHIP convention: `4000 * 2^((pitch - 64) / 48)`.
    pub fn get_sound_freq(&self) -> f64 {
        4000.0 * f64::powf(2.0, (self.pitch as f64 - 64.0) / 48.0)
    }

    /// Drains the PCM samples produced by the most recent
    /// [run_frame](Machine::run_frame) call; an undrained batch is replaced
    /// by the next frame's.  A frame yields roughly
    /// `audio_sample_rate / refresh_freq` samples; silence is emitted while
    /// the beep line is low so the stream stays continuous.
    pub fn take_audio_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.audio_out)
    }

    /// Advances the sampler by one instruction's worth of emulated time.
    ///
    /// While beeping, pattern bits are consumed at the pitch-derived rate
    /// and each bit is resampled to the host rate; full scale for a set bit,
    /// silence otherwise.  When the beep line is low the cursor and the
    /// cached frequency reset, so the next tone starts from the head of the
    /// pattern.
    pub(crate) fn pump_audio(&mut self, elapsed_nanos: u64) {
        if !self.beep {
            self.audio.playback_freq = 0;
            self.audio.pattern_counter = 0;
            self.audio.pattern_cursor = 0;
            self.audio.resample_counter += elapsed_nanos;
            self.emit_resampled(0);
            return;
        }
        if self.audio.playback_freq == 0 {
            self.audio.playback_freq = self.get_sound_freq() as u32;
            self.audio.pattern_cursor = 0;
        }
        let bit_step = ONE_SEC_NANOS / self.audio.playback_freq as u64;
        self.audio.pattern_counter += elapsed_nanos;
        while self.audio.pattern_counter > bit_step {
            self.audio.pattern_counter -= bit_step;
            let sample = self.next_pattern_sample();
            self.audio.resample_counter += bit_step;
            self.emit_resampled(sample);
        }
    }

    /// Reads the pattern bit under the cursor, advances the cursor modulo
    /// 128, and converts the bit to a PCM level.
    fn next_pattern_sample(&mut self) -> i16 {
        let cursor = self.audio.pattern_cursor;
        let byte = self.ram.read_byte(AUDIO_BUF_ADDR + cursor / 8);
        let bit = (byte << (cursor % 8)) & 0x80;
        self.audio.pattern_cursor = (cursor + 1) % (AUDIO_BUF_SIZE as u16 * 8);
        if bit != 0 {
            SAMPLE_HIGH
        } else {
            0
        }
    }

    /// Converts accumulated pattern time into host-rate samples of the given
    /// level.
    fn emit_resampled(&mut self, sample: i16) {
        let host_step = ONE_SEC_NANOS / self.audio_sample_rate as u64;
        while self.audio.resample_counter >= host_step {
            self.audio.resample_counter -= host_step;
            self.audio_out.push(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::options::Options;
    use crate::Machine;

    #[test]
    fn test_sound_freq_default_pitch() {
        let machine = Machine::new(Options::default());
        // Pitch 64 is the XO-CHIP reference point: exactly 4000 Hz.
        assert!((machine.get_sound_freq() - 4000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sound_freq_octave_step() {
        let mut machine = Machine::new(Options::default());
        machine.pitch = 64 + 48;
        assert!((machine.get_sound_freq() - 8000.0).abs() < 1e-9);
        machine.pitch = 64 - 48;
        assert!((machine.get_sound_freq() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_silence_while_beep_low() {
        let mut machine = Machine::new(Options::default());
        machine.run_frame();
        let samples = machine.take_audio_samples();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|sample| *sample == 0));
        // The first frame runs 16 instructions at 1000 Hz; the sampler
        // converts exactly that much emulated time to host samples.
        let cycle_step = 1_000_000_000u64 / machine.cpu_freq as u64;
        let host_step = 1_000_000_000u64 / machine.audio_sample_rate as u64;
        assert_eq!(samples.len(), (16 * cycle_step / host_step) as usize);
    }

    #[test]
    fn test_tone_follows_pattern_bits() {
        let mut machine = Machine::new(Options::default());
        // All-ones pattern, sound timer running.
        for offset in 0..16 {
            machine.ram.write_byte(crate::memory::AUDIO_BUF_ADDR + offset, 0xFF);
        }
        machine.st = 60;
        machine.beep = true;
        machine.run_frame();
        let samples = machine.take_audio_samples();
        assert!(samples.iter().any(|sample| *sample != 0));
    }

    #[test]
    fn test_cursor_resets_when_beep_clears() {
        let mut machine = Machine::new(Options::default());
        machine.st = 1;
        machine.beep = true;
        machine.run_frame(); // timer expires at the frame boundary
        machine.run_frame();
        assert!(!machine.beep);
        assert_eq!(machine.audio.pattern_cursor, 0);
        assert_eq!(machine.audio.playback_freq, 0);
    }
}
