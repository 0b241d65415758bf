use crate::error::Error;

/// The number of keys on the hexadecimal keypad.
pub const NUM_KEYS: usize = 16;

/// The state of a single key as observed by the interpreter.
///
/// `Released` is an edge, not a level: it marks the frame on which a key went
/// from held to not held.  The wait-for-key opcode (`Fx0A`) completes on that
/// edge and consumes it; a `Released` state that nothing consumed decays back
/// to `Up` on the next host poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    /// The key is not held
    Up,
    /// The key is held down
    Down,
    /// The key was let go since the previous poll, and the edge has not yet
    /// been consumed
    Released,
}

/// An abstraction of the state of each key on the 16-key keypad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keypad {
    keys: [KeyState; NUM_KEYS],
}

impl Keypad {
    /// Constructor that returns a [Keypad] instance with no keys held.
    pub(crate) fn new() -> Self {
        Keypad {
            keys: [KeyState::Up; NUM_KEYS],
        }
    }

    /// Sets the state of the specified key directly; returns an
    /// [Error::InvalidKey] if the key ordinal is out of range.
    ///
    /// # Arguments
    ///
    /// * `key` - the hex ordinal of the key (valid range 0x0 to 0xF inclusive)
    /// * `state` - the state to record for the key
    pub fn set_state(&mut self, key: u8, state: KeyState) -> Result<(), Error> {
        match key {
            k if (k as usize) < NUM_KEYS => {
                self.keys[k as usize] = state;
                Ok(())
            }
            _ => Err(Error::InvalidKey { key }),
        }
    }

    /// Records one frame's worth of physical key state, deriving the edge
    /// transitions the interpreter consumes.  A held key reads `Down`; a key
    /// that was `Down` last poll and is no longer held reads `Released` for
    /// exactly one frame; everything else reads `Up` (which also decays an
    /// unconsumed `Released`).
    ///
    /// # Arguments
    ///
    /// * `key` - the hex ordinal of the key (valid range 0x0 to 0xF inclusive)
    /// * `is_down` - whether the physical key is currently held
    pub fn poll(&mut self, key: u8, is_down: bool) -> Result<(), Error> {
        if key as usize >= NUM_KEYS {
            return Err(Error::InvalidKey { key });
        }
        let current = self.keys[key as usize];
        self.keys[key as usize] = if is_down {
            KeyState::Down
        } else if current == KeyState::Down {
            KeyState::Released
        } else {
            KeyState::Up
        };
        Ok(())
    }

    /// Returns the recorded state of the specified key; returns an
    /// [Error::InvalidKey] if the key ordinal is out of range.
    pub fn state(&self, key: u8) -> Result<KeyState, Error> {
        match key {
            k if (k as usize) < NUM_KEYS => Ok(self.keys[k as usize]),
            _ => Err(Error::InvalidKey { key }),
        }
    }

    /// Returns true if the key named by the low nibble of `key` is held.
    /// Guest registers can hold any byte, so the ordinal is masked the way
    /// the interpreter masks it.
    pub(crate) fn is_down(&self, key: u8) -> bool {
        self.keys[(key & 0xF) as usize] == KeyState::Down
    }

    /// Consumes and returns the lowest-numbered key currently in the
    /// `Released` state, resetting it to `Up`.  Returns `None` when no
    /// release edge is pending.
    pub(crate) fn take_released(&mut self) -> Option<u8> {
        for key in 0..NUM_KEYS {
            if self.keys[key] == KeyState::Released {
                self.keys[key] = KeyState::Up;
                return Some(key as u8);
            }
        }
        None
    }

    /// Resets every key to `Up`.
    pub(crate) fn reset(&mut self) {
        self.keys = [KeyState::Up; NUM_KEYS];
    }

    /// Encodes the keypad as one byte per key for the packed snapshot.
    pub(crate) fn to_bytes(&self) -> [u8; NUM_KEYS] {
        let mut bytes = [0u8; NUM_KEYS];
        for (byte, state) in bytes.iter_mut().zip(self.keys.iter()) {
            *byte = match state {
                KeyState::Up => 0,
                KeyState::Down => 1,
                KeyState::Released => 2,
            };
        }
        bytes
    }

    /// Rebuilds a keypad from its packed snapshot form.  Unknown encodings
    /// decode as `Up`; a corrupted byte should not wedge a restored machine.
    pub(crate) fn from_bytes(bytes: &[u8; NUM_KEYS]) -> Self {
        let mut keypad = Keypad::new();
        for (key, byte) in keypad.keys.iter_mut().zip(bytes.iter()) {
            *key = match byte {
                1 => KeyState::Down,
                2 => KeyState::Released,
                _ => KeyState::Up,
            };
        }
        keypad
    }
}
