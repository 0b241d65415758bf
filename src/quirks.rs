use serde_derive::{Deserialize, Serialize};

/// The number of compatibility toggles understood by the core.
pub const NUM_QUIRKS: usize = 10;

/// Compatibility toggles selecting between historically incompatible
/// behaviours of individual opcodes.
///
/// Decades of reimplementation left the CHIP-8 family with several opcodes
/// whose exact semantics differ between the COSMAC VIP interpreter, the HP48
/// SUPER-CHIP interpreters and the modern XO-CHIP tooling.  Rather than
/// hard-coding one lineage, each ambiguous behaviour is an independent
/// boolean chosen at start-up, so hosts can match the interpreter a given
/// ROM was written against.
///
/// All quirks default to enabled, the configuration most of the modern ROM
/// set is written against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quirks {
    /// Zero RAM at start-up; disabled leaves it filled with seeded noise
    pub ram_init: bool,
    /// `8xy6`/`8xyE` take their source operand from `Vy`; disabled shifts
    /// `Vx` in place
    pub shift_source_vy: bool,
    /// `Fx55`/`Fx65` leave `I` untouched; disabled sets `I = I + x + 1`
    pub index_unchanged: bool,
    /// `Bnnn` offsets by `V[x]` where `x` is the high nibble of `nnn`;
    /// disabled offsets by `V0`
    pub jump_vx: bool,
    /// `Dxy0` draws a 16x16 sprite even in lo-res; disabled draws 8x16 there
    pub big_sprite_lores: bool,
    /// `00FE`/`00FF` clear the display when switching resolution
    pub res_switch_clears: bool,
    /// Sprite pixels wrap across the screen edges; disabled clips them
    pub sprite_wrapping: bool,
    /// `VF` counts colliding rows after a hi-res draw; disabled reports 0/1
    pub collision_enumeration: bool,
    /// Rows clipped off the bottom of the screen still count as collisions
    pub collision_bottom: bool,
    /// `8xy1`/`8xy2`/`8xy3` preserve `VF`; disabled zeroes it afterwards
    pub vf_logic_preserved: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Quirks {
            ram_init: true,
            shift_source_vy: true,
            index_unchanged: true,
            jump_vx: true,
            big_sprite_lores: true,
            res_switch_clears: true,
            sprite_wrapping: true,
            collision_enumeration: true,
            collision_bottom: true,
            vf_logic_preserved: true,
        }
    }
}

impl Quirks {
    /// Returns the toggles as a fixed-order array, index-compatible with the
    /// numbering used by [`From<[bool; NUM_QUIRKS]>`](Quirks::from).
    pub fn to_array(self) -> [bool; NUM_QUIRKS] {
        [
            self.ram_init,
            self.shift_source_vy,
            self.index_unchanged,
            self.jump_vx,
            self.big_sprite_lores,
            self.res_switch_clears,
            self.sprite_wrapping,
            self.collision_enumeration,
            self.collision_bottom,
            self.vf_logic_preserved,
        ]
    }
}

impl From<[bool; NUM_QUIRKS]> for Quirks {
    /// Builds the toggle set from the flat 10-entry form used by front-ends
    /// that expose quirks as numbered switches.
    fn from(q: [bool; NUM_QUIRKS]) -> Self {
        Quirks {
            ram_init: q[0],
            shift_source_vy: q[1],
            index_unchanged: q[2],
            jump_vx: q[3],
            big_sprite_lores: q[4],
            res_switch_clears: q[5],
            sprite_wrapping: q[6],
            collision_enumeration: q[7],
            collision_bottom: q[8],
            vf_logic_preserved: q[9],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_round_trip() {
        let mut flags = [true; NUM_QUIRKS];
        flags[2] = false;
        flags[7] = false;
        let quirks = Quirks::from(flags);
        assert!(!quirks.index_unchanged);
        assert!(!quirks.collision_enumeration);
        assert_eq!(quirks.to_array(), flags);
    }

    #[test]
    fn test_default_all_enabled() {
        assert_eq!(Quirks::default().to_array(), [true; NUM_QUIRKS]);
    }
}
