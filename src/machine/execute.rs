use super::*;
use crate::display::{NUM_PLANES, SCROLL_STEP};
use crate::font::BIG_FONT_GLYPH_COUNT;
use crate::instruction::Instruction;
use crate::memory::{AUDIO_BUF_ADDR, AUDIO_BUF_SIZE, STACK_FRAMES};
use rand::Rng;

impl Machine {
    /// Runs one iteration of the fetch -> decode -> execute cycle.
    ///
    /// Returns whether an instruction actually retired: `false` when the
    /// machine has exited, or when a wait-for-key stall rewound the program
    /// counter.  Unknown opcodes are executed as no-ops (the program counter
    /// has already advanced) and reported through the `log` facade.
    pub fn execute(&mut self) -> bool {
        if self.exit {
            return false;
        }
        // Fetch the two-byte opcode at the program counter (big-endian) and
        // advance past it before executing, so jumps store the destination
        // itself.
        let opcode = self.ram.read_word(self.pc);
        self.pc = self.pc.wrapping_add(2);
        let instruction = match Instruction::decode(opcode) {
            Some(instruction) => instruction,
            None => {
                log::debug!(
                    "unknown opcode {:#06X} at {:#06X} treated as a no-op",
                    opcode,
                    self.pc.wrapping_sub(2)
                );
                return true;
            }
        };
        match instruction {
            Instruction::ScrollDown { n } => self.exec_scroll_down(n),
            Instruction::ScrollUp { n } => self.exec_scroll_up(n),
            Instruction::ClearScreen => self.exec_clear_screen(),
            Instruction::Return => self.exec_return(),
            Instruction::ScrollRight => self.exec_scroll_right(),
            Instruction::ScrollLeft => self.exec_scroll_left(),
            Instruction::Exit => self.exit = true,
            Instruction::LoresMode => self.exec_set_resolution(false),
            Instruction::HiresMode => self.exec_set_resolution(true),
            Instruction::Jump { nnn } => self.pc = nnn,
            Instruction::Call { nnn } => self.exec_call(nnn),
            Instruction::SkipEqImm { x, kk } => self.exec_skip_eq_imm(x, kk),
            Instruction::SkipNeImm { x, kk } => self.exec_skip_ne_imm(x, kk),
            Instruction::SkipEqReg { x, y } => self.exec_skip_eq_reg(x, y),
            Instruction::StoreRange { x, y } => self.exec_store_range(x, y),
            Instruction::LoadRange { x, y } => self.exec_load_range(x, y),
            Instruction::LoadImm { x, kk } => self.v[x] = kk,
            Instruction::AddImm { x, kk } => self.v[x] = self.v[x].wrapping_add(kk),
            Instruction::Copy { x, y } => self.v[x] = self.v[y],
            Instruction::Or { x, y } => self.exec_or(x, y),
            Instruction::And { x, y } => self.exec_and(x, y),
            Instruction::Xor { x, y } => self.exec_xor(x, y),
            Instruction::Add { x, y } => self.exec_add(x, y),
            Instruction::Sub { x, y } => self.exec_sub(x, y),
            Instruction::ShiftRight { x, y } => self.exec_shift_right(x, y),
            Instruction::SubReversed { x, y } => self.exec_sub_reversed(x, y),
            Instruction::ShiftLeft { x, y } => self.exec_shift_left(x, y),
            Instruction::SkipNeReg { x, y } => self.exec_skip_ne_reg(x, y),
            Instruction::LoadIndex { nnn } => self.i = nnn,
            Instruction::JumpOffset { nnn } => self.exec_jump_offset(nnn),
            Instruction::Random { x, kk } => self.exec_random(x, kk),
            Instruction::Draw { x, y, n } => self.exec_draw(x, y, n),
            Instruction::SkipKeyDown { x } => self.exec_skip_key_down(x),
            Instruction::SkipKeyUp { x } => self.exec_skip_key_up(x),
            Instruction::LoadLongIndex => self.exec_load_long_index(),
            Instruction::SelectPlanes { n } => self.plane_mask = n & 0x3,
            Instruction::StoreAudioPattern => self.exec_store_audio_pattern(),
            Instruction::ReadDelay { x } => self.v[x] = self.dt,
            Instruction::WaitKey { x } => return self.exec_wait_key(x),
            Instruction::SetDelay { x } => self.dt = self.v[x],
            Instruction::SetSound { x } => self.exec_set_sound(x),
            Instruction::AddIndex { x } => self.i = self.i.wrapping_add(self.v[x] as u16),
            Instruction::FontChar { x } => self.exec_font_char(x),
            Instruction::BigFontChar { x } => self.exec_big_font_char(x),
            Instruction::StoreBcd { x } => self.exec_store_bcd(x),
            Instruction::SetPitch { x } => self.exec_set_pitch(x),
            Instruction::StoreRegisters { x } => self.exec_store_registers(x),
            Instruction::LoadRegisters { x } => self.exec_load_registers(x),
            Instruction::StoreUserFlags { x } => self.exec_store_user_flags(x),
            Instruction::LoadUserFlags { x } => self.exec_load_user_flags(x),
        }
        true
    }

    /// Skips the instruction at the program counter.  A skipped `F000`
    /// occupies four bytes, so the skip width depends on what is being
    /// skipped.
    fn skip_next(&mut self) {
        let step = if self.ram.read_word(self.pc) == 0xF000 {
            4
        } else {
            2
        };
        self.pc = self.pc.wrapping_add(step);
    }

    /// Executes the 00Cn instruction - SCD
    /// Purpose: scroll the selected planes down by n pixels
    fn exec_scroll_down(&mut self, n: u8) {
        let amount = self.scroll_amount(n as usize);
        self.display.scroll_down(self.plane_mask, amount);
        self.display_updated = true;
    }

    /// Executes the 00Dn instruction - SCU
    /// Purpose: scroll the selected planes up by n pixels
    fn exec_scroll_up(&mut self, n: u8) {
        let amount = self.scroll_amount(n as usize);
        self.display.scroll_up(self.plane_mask, amount);
        self.display_updated = true;
    }

    /// Executes the 00FB instruction - SCR
    /// Purpose: scroll the selected planes right by 4 pixels
    fn exec_scroll_right(&mut self) {
        let amount = self.scroll_amount(SCROLL_STEP);
        self.display.scroll_right(self.plane_mask, amount);
        self.display_updated = true;
    }

    /// Executes the 00FC instruction - SCL
    /// Purpose: scroll the selected planes left by 4 pixels
    fn exec_scroll_left(&mut self) {
        let amount = self.scroll_amount(SCROLL_STEP);
        self.display.scroll_left(self.plane_mask, amount);
        self.display_updated = true;
    }

    /// Scroll opcodes count active-resolution pixels by default; the legacy
    /// SUPER-CHIP convention of halving the distance in lo-res is an opt-in.
    fn scroll_amount(&self, n: usize) -> usize {
        if self.halve_lores_scroll && !self.display.hires() {
            n / 2
        } else {
            n
        }
    }

    /// Executes the 00E0 instruction - CLS
    /// Purpose: clear both display planes
    fn exec_clear_screen(&mut self) {
        self.display.clear();
        self.display_updated = true;
    }

    /// Executes the 00EE instruction - RET
    /// Purpose: return from a subroutine
    ///
    /// A return with no frame on the stack is dropped rather than allowed to
    /// tear the stack pointer below its base.
    fn exec_return(&mut self) {
        if self.sp <= SP_START_ADDR {
            log::warn!(
                "stack underflow at {:#06X}; return ignored",
                self.pc.wrapping_sub(2)
            );
            return;
        }
        self.pc = self.ram.read_word(self.sp);
        self.sp -= 2;
    }

    /// Executes the 00FE / 00FF instructions - LOW / HIGH
    /// Purpose: switch between lo-res and hi-res mode, clearing the display
    /// when the resolution-switch quirk asks for it
    fn exec_set_resolution(&mut self, hires: bool) {
        self.display.set_hires(hires, self.quirks.res_switch_clears);
        self.display_updated = true;
    }

    /// Executes the 2nnn instruction - CALL addr
    /// Purpose: call the subroutine at nnn
    ///
    /// A call past the sixteenth nested frame is dropped, which keeps
    /// runaway recursion in ill-behaved ROMs from corrupting RAM above the
    /// stack region.
    fn exec_call(&mut self, nnn: u16) {
        if self.sp >= SP_START_ADDR + 2 * STACK_FRAMES {
            log::warn!(
                "stack overflow at {:#06X}; call to {:#05X} ignored",
                self.pc.wrapping_sub(2),
                nnn
            );
            return;
        }
        self.sp += 2;
        self.ram.write_word(self.sp, self.pc);
        self.pc = nnn;
    }

    /// Executes the 3xkk instruction - SE Vx, byte
    /// Purpose: skip the next instruction if Vx == kk
    fn exec_skip_eq_imm(&mut self, x: usize, kk: u8) {
        if self.v[x] == kk {
            self.skip_next();
        }
    }

    /// Executes the 4xkk instruction - SNE Vx, byte
    /// Purpose: skip the next instruction if Vx != kk
    fn exec_skip_ne_imm(&mut self, x: usize, kk: u8) {
        if self.v[x] != kk {
            self.skip_next();
        }
    }

    /// Executes the 5xy0 instruction - SE Vx, Vy
    /// Purpose: skip the next instruction if Vx == Vy
    fn exec_skip_eq_reg(&mut self, x: usize, y: usize) {
        if self.v[x] == self.v[y] {
            self.skip_next();
        }
    }

    /// Executes the 9xy0 instruction - SNE Vx, Vy
    /// Purpose: skip the next instruction if Vx != Vy
    fn exec_skip_ne_reg(&mut self, x: usize, y: usize) {
        if self.v[x] != self.v[y] {
            self.skip_next();
        }
    }

    /// Executes the 5xy2 instruction - XO-CHIP register range store
    /// Purpose: write Vx..Vy inclusive to memory at I, in operand order
    /// (descending when x > y).  I is not modified.
    fn exec_store_range(&mut self, x: usize, y: usize) {
        let mut addr = self.i;
        if x <= y {
            for reg in x..=y {
                self.ram.write_byte(addr, self.v[reg]);
                addr = addr.wrapping_add(1);
            }
        } else {
            for reg in (y..=x).rev() {
                self.ram.write_byte(addr, self.v[reg]);
                addr = addr.wrapping_add(1);
            }
        }
    }

    /// Executes the 5xy3 instruction - XO-CHIP register range load
    /// Purpose: read Vx..Vy inclusive from memory at I, in operand order
    /// (descending when x > y).  I is not modified.
    fn exec_load_range(&mut self, x: usize, y: usize) {
        let mut addr = self.i;
        if x <= y {
            for reg in x..=y {
                self.v[reg] = self.ram.read_byte(addr);
                addr = addr.wrapping_add(1);
            }
        } else {
            for reg in (y..=x).rev() {
                self.v[reg] = self.ram.read_byte(addr);
                addr = addr.wrapping_add(1);
            }
        }
    }

    /// Executes the 8xy1 instruction - OR Vx, Vy
    /// Purpose: set Vx = Vx | Vy; the original COSMAC interpreter also
    /// clobbered VF, preserved here behind a quirk
    fn exec_or(&mut self, x: usize, y: usize) {
        self.v[x] |= self.v[y];
        if !self.quirks.vf_logic_preserved {
            self.v[0xF] = 0;
        }
    }

    /// Executes the 8xy2 instruction - AND Vx, Vy
    /// Purpose: set Vx = Vx & Vy, with the same VF handling as OR
    fn exec_and(&mut self, x: usize, y: usize) {
        self.v[x] &= self.v[y];
        if !self.quirks.vf_logic_preserved {
            self.v[0xF] = 0;
        }
    }

    /// Executes the 8xy3 instruction - XOR Vx, Vy
    /// Purpose: set Vx = Vx ^ Vy, with the same VF handling as OR
    fn exec_xor(&mut self, x: usize, y: usize) {
        self.v[x] ^= self.v[y];
        if !self.quirks.vf_logic_preserved {
            self.v[0xF] = 0;
        }
    }

    /// Executes the 8xy4 instruction - ADD Vx, Vy
    /// Purpose: set Vx = Vx + Vy, then VF = carry.  The flag is written
    /// after the result, so `8xF4` leaves the carry in VF.
    fn exec_add(&mut self, x: usize, y: usize) {
        let (result, carry) = self.v[x].overflowing_add(self.v[y]);
        self.v[x] = result;
        self.v[0xF] = carry as u8;
    }

    /// Executes the 8xy5 instruction - SUB Vx, Vy
    /// Purpose: set Vx = Vx - Vy, then VF = 1 when there was no borrow
    fn exec_sub(&mut self, x: usize, y: usize) {
        let (result, borrow) = self.v[x].overflowing_sub(self.v[y]);
        self.v[x] = result;
        self.v[0xF] = !borrow as u8;
    }

    /// Executes the 8xy7 instruction - SUBN Vx, Vy
    /// Purpose: set Vx = Vy - Vx, then VF = 1 when there was no borrow
    fn exec_sub_reversed(&mut self, x: usize, y: usize) {
        let (result, borrow) = self.v[y].overflowing_sub(self.v[x]);
        self.v[x] = result;
        self.v[0xF] = !borrow as u8;
    }

    /// Executes the 8xy6 instruction - SHR Vx {, Vy}
    /// Purpose: shift right by one, storing the result in Vx and the
    /// shifted-out bit in VF.  The source register is Vy when the shift
    /// quirk is enabled, Vx otherwise.
    fn exec_shift_right(&mut self, x: usize, y: usize) {
        let source = if self.quirks.shift_source_vy {
            self.v[y]
        } else {
            self.v[x]
        };
        self.v[x] = source >> 1;
        self.v[0xF] = source & 0x1;
    }

    /// Executes the 8xyE instruction - SHL Vx {, Vy}
    /// Purpose: shift left by one, storing the result in Vx and the
    /// shifted-out bit in VF.  Source selection matches SHR.
    fn exec_shift_left(&mut self, x: usize, y: usize) {
        let source = if self.quirks.shift_source_vy {
            self.v[y]
        } else {
            self.v[x]
        };
        self.v[x] = source << 1;
        self.v[0xF] = (source & 0x80 != 0) as u8;
    }

    /// Executes the Bnnn instruction - JP V0, addr
    /// Purpose: jump to nnn plus an offset register: V[x] with x the high
    /// nibble of nnn when the jump quirk is enabled, V0 otherwise
    fn exec_jump_offset(&mut self, nnn: u16) {
        let offset = if self.quirks.jump_vx {
            self.v[(nnn >> 8) as usize]
        } else {
            self.v[0]
        };
        self.pc = nnn.wrapping_add(offset as u16);
    }

    /// Executes the Cxkk instruction - RND Vx, byte
    /// Purpose: set Vx = random byte & kk, drawn from the seeded generator
    fn exec_random(&mut self, x: usize, kk: u8) {
        let random: u8 = self.rng.gen();
        self.v[x] = random & kk;
    }

    /// Executes the Dxyn instruction - DRW Vx, Vy, nibble
    /// Purpose: XOR a sprite into the selected planes at (Vx, Vy) and leave
    /// the collision outcome in VF.
    ///
    /// `n == 0` selects the 16-row big sprite form: 16 pixels wide in hi-res
    /// (or in lo-res with the big-sprite quirk), 8 wide otherwise.  The
    /// start coordinates wrap modulo the active resolution before drawing;
    /// whether individual pixels wrap or clip is the wrapping quirk's call.
    /// Each selected plane consumes its own run of sprite bytes from
    /// `RAM[I..]`.
    ///
    /// VF receives the number of colliding rows (plus bottom-clipped rows,
    /// per quirk) when collision enumeration applies in hi-res, and a 0/1
    /// collision flag otherwise.
    fn exec_draw(&mut self, x: usize, y: usize, n: u8) {
        let x_start = self.v[x] as usize % self.display.width();
        let y_start = self.v[y] as usize % self.display.height();
        let wide = n == 0 && (self.display.hires() || self.quirks.big_sprite_lores);
        let sprite_height = if n == 0 { 16 } else { n as usize };
        let sprite_width = if wide { 16 } else { 8 };
        let wrap = self.quirks.sprite_wrapping;
        let mut addr = self.i;
        let mut rows_collided: u8 = 0;
        let mut rows_clipped: u8 = 0;
        for plane in 0..NUM_PLANES {
            if self.plane_mask & (1 << plane) == 0 {
                continue;
            }
            let mut rows: Vec<u16> = Vec::with_capacity(sprite_height);
            for _ in 0..sprite_height {
                if wide {
                    rows.push(self.ram.read_word(addr));
                    addr = addr.wrapping_add(2);
                } else {
                    rows.push(self.ram.read_byte(addr) as u16);
                    addr = addr.wrapping_add(1);
                }
            }
            let (collided, clipped) =
                self.display
                    .draw_rows(plane, x_start, y_start, &rows, sprite_width, wrap);
            rows_collided += collided;
            rows_clipped += clipped;
        }
        self.v[0xF] = if self.display.hires() && self.quirks.collision_enumeration {
            if self.quirks.collision_bottom {
                rows_collided + rows_clipped
            } else {
                rows_collided
            }
        } else {
            (rows_collided > 0) as u8
        };
        self.display_updated = true;
    }

    /// Executes the Ex9E instruction - SKP Vx
    /// Purpose: skip the next instruction while the key named by Vx is held
    fn exec_skip_key_down(&mut self, x: usize) {
        if self.keypad.is_down(self.v[x]) {
            self.skip_next();
        }
    }

    /// Executes the ExA1 instruction - SKNP Vx
    /// Purpose: skip the next instruction while the key named by Vx is not held
    fn exec_skip_key_up(&mut self, x: usize) {
        if !self.keypad.is_down(self.v[x]) {
            self.skip_next();
        }
    }

    /// Executes the F000 nnnn instruction - XO-CHIP load long index
    /// Purpose: set I to the full 16-bit address stored in the following
    /// instruction slot, then step over it
    fn exec_load_long_index(&mut self) {
        self.i = self.ram.read_word(self.pc);
        self.pc = self.pc.wrapping_add(2);
    }

    /// Executes the F002 instruction - XO-CHIP audio pattern store
    /// Purpose: copy the 16 bytes at I into the audio pattern buffer
    fn exec_store_audio_pattern(&mut self) {
        for offset in 0..AUDIO_BUF_SIZE as u16 {
            let byte = self.ram.read_byte(self.i.wrapping_add(offset));
            self.ram.write_byte(AUDIO_BUF_ADDR + offset, byte);
        }
    }

    /// Executes the Fx0A instruction - LD Vx, K
    /// Purpose: block until a key is released, then store that key in Vx.
    ///
    /// Blocking is implemented by rewinding the program counter so the
    /// opcode refetches every cycle until a DOWN -> RELEASED edge is
    /// pending; consuming the edge resets that key to UP.  Returns whether
    /// the instruction completed.
    fn exec_wait_key(&mut self, x: usize) -> bool {
        match self.keypad.take_released() {
            Some(key) => {
                self.v[x] = key;
                true
            }
            None => {
                self.pc = self.pc.wrapping_sub(2);
                false
            }
        }
    }

    /// Executes the Fx18 instruction - LD ST, Vx
    /// Purpose: set the sound timer and rederive the beep line
    fn exec_set_sound(&mut self, x: usize) {
        self.st = self.v[x];
        self.beep = self.st > 0;
    }

    /// Executes the Fx29 instruction - LD F, Vx
    /// Purpose: point I at the 5-byte small font glyph for the low nibble
    /// of Vx
    fn exec_font_char(&mut self, x: usize) {
        let digit = (self.v[x] & 0xF) as u16;
        self.i = FONT_START_ADDR + digit * font::FONT_CHAR_SIZE as u16;
    }

    /// Executes the Fx30 instruction - LD HF, Vx
    /// Purpose: point I at the 10-byte big font glyph for the low nibble of
    /// Vx.  The big font only has decimal digits; by default the index is
    /// taken unconditionally, matching SUPER-CHIP 1.1, with an optional
    /// fallback to the small font for 0xA..=0xF.
    fn exec_big_font_char(&mut self, x: usize) {
        let digit = (self.v[x] & 0xF) as u16;
        if self.big_font_small_fallback && digit >= BIG_FONT_GLYPH_COUNT as u16 {
            self.i = FONT_START_ADDR + digit * font::FONT_CHAR_SIZE as u16;
        } else {
            self.i = BIG_FONT_START_ADDR + digit * font::BIG_FONT_CHAR_SIZE as u16;
        }
    }

    /// Executes the Fx33 instruction - LD B, Vx
    /// Purpose: write the three decimal digits of Vx to I, I+1 and I+2
    fn exec_store_bcd(&mut self, x: usize) {
        let value = self.v[x];
        self.ram.write_byte(self.i, value / 100);
        self.ram.write_byte(self.i.wrapping_add(1), (value % 100) / 10);
        self.ram.write_byte(self.i.wrapping_add(2), value % 10);
    }

    /// Executes the Fx3A instruction - XO-CHIP pitch
    /// Purpose: set the audio pitch register; the cached playback frequency
    /// is invalidated so an in-progress tone retunes immediately
    fn exec_set_pitch(&mut self, x: usize) {
        self.pitch = self.v[x];
        self.audio.playback_freq = 0;
    }

    /// Executes the Fx55 instruction - LD [I], Vx
    /// Purpose: store V0..Vx to memory at I; whether I advances past the
    /// stored range afterwards is the index quirk's call
    fn exec_store_registers(&mut self, x: usize) {
        let mut addr = self.i;
        for reg in 0..=x {
            self.ram.write_byte(addr, self.v[reg]);
            addr = addr.wrapping_add(1);
        }
        if !self.quirks.index_unchanged {
            self.i = self.i.wrapping_add(x as u16 + 1);
        }
    }

    /// Executes the Fx65 instruction - LD Vx, [I]
    /// Purpose: load V0..Vx from memory at I, with the same I handling as
    /// Fx55
    fn exec_load_registers(&mut self, x: usize) {
        let mut addr = self.i;
        for reg in 0..=x {
            self.v[reg] = self.ram.read_byte(addr);
            addr = addr.wrapping_add(1);
        }
        if !self.quirks.index_unchanged {
            self.i = self.i.wrapping_add(x as u16 + 1);
        }
    }

    /// Executes the Fx75 instruction - LD R, Vx
    /// Purpose: persist V0..Vx into the user flag registers
    fn exec_store_user_flags(&mut self, x: usize) {
        self.user_flags[0..=x].copy_from_slice(&self.v[0..=x]);
    }

    /// Executes the Fx85 instruction - LD Vx, R
    /// Purpose: restore V0..Vx from the user flag registers
    fn exec_load_user_flags(&mut self, x: usize) {
        self.v[0..=x].copy_from_slice(&self.user_flags[0..=x]);
    }
}
