// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The addressing-mode engine and every memory-touching handler: single
//! and multiple transfers, doubleword pairs, the exclusive-access
//! operations and SWP.
//!
//! Addressing functions run only after the record's condition has passed,
//! so indexed modes write their base back unconditionally here.

use super::Step;
use crate::{
    arm::{AddrFn, LdSt, Media, Op},
    interface::{Bus, VfpDispatch},
    numutil::NumExt,
    state::CpuState,
    Cpu,
};

/// Select the addressing-mode routine from bits 24-27, 21 and 4-11.
pub(crate) fn addressing_fn(inst: u32) -> Option<AddrFn> {
    let code = inst.bits(24, 4);
    let w = inst.is_bit(21);
    let plain_reg = inst.bits(4, 8) == 0;
    let shifted_reg = !inst.is_bit(4);
    let misc = inst.is_bit(7) && inst.is_bit(4);

    Some(match code {
        5 if !w => ldst_imm_offset,
        5 => ldst_imm_pre,
        7 if !w && plain_reg => ldst_reg_offset,
        7 if !w && shifted_reg => ldst_scaled_offset,
        7 if w && plain_reg => ldst_reg_pre,
        7 if w && shifted_reg => ldst_scaled_pre,
        4 if !w => ldst_imm_post,
        6 if !w && plain_reg => ldst_reg_post,
        6 if !w && shifted_reg => ldst_scaled_post,

        1 if misc && inst.bits(21, 2) == 2 => misc_imm_offset,
        1 if misc && inst.bits(21, 2) == 0 => misc_reg_offset,
        1 if misc && inst.bits(21, 2) == 3 => misc_imm_pre,
        1 if misc && inst.bits(21, 2) == 1 => misc_reg_pre,
        0 if misc && inst.bits(21, 2) == 2 => misc_imm_post,
        0 if misc && inst.bits(21, 2) == 0 => misc_reg_post,

        _ => match inst.bits(23, 5) {
            0x11 => block_increment_after,
            0x13 => block_increment_before,
            0x10 => block_decrement_after,
            0x12 => block_decrement_before,
            _ => return None,
        },
    })
}

/// Addressing for the translation-forced (T) forms: always post-indexed,
/// immediate or plain register.
pub(crate) fn addressing_fn_forced(inst: u32) -> AddrFn {
    if inst.bits(25, 3) == 2 {
        ldst_imm_post
    } else {
        ldst_reg_post
    }
}

fn offset_12(inst: u32) -> u32 {
    inst.bits(0, 12)
}

/// Split 8-bit immediate of the halfword/doubleword forms.
fn offset_8(inst: u32) -> u32 {
    (inst.bits(8, 4) << 4) | inst.bits(0, 4)
}

fn apply(base: u32, offset: u32, up: bool) -> u32 {
    if up {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    }
}

/// Index value of the scaled-register forms, including the RRX case.
fn scaled_index(cpu: &CpuState, inst: u32) -> u32 {
    let rm = cpu.read_reg_word_aligned(inst.bits(0, 4));
    let imm = inst.bits(7, 5);
    match inst.bits(5, 2) {
        0 => rm << imm,
        1 => {
            if imm == 0 {
                0
            } else {
                rm >> imm
            }
        }
        2 => {
            if imm == 0 {
                ((rm as i32) >> 31) as u32
            } else {
                ((rm as i32) >> imm) as u32
            }
        }
        _ => {
            if imm == 0 {
                ((cpu.c as u32) << 31) | (rm >> 1)
            } else {
                rm.rotate_right(imm)
            }
        }
    }
}

fn ldst_imm_offset(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    apply(rn, offset_12(inst), inst.is_bit(23))
}

fn ldst_imm_pre(cpu: &mut CpuState, inst: u32) -> u32 {
    let addr = ldst_imm_offset(cpu, inst);
    cpu.registers[inst.bits(16, 4).us()] = addr;
    addr
}

fn ldst_imm_post(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = inst.bits(16, 4);
    let addr = cpu.read_reg_word_aligned(rn);
    cpu.registers[rn.us()] = apply(addr, offset_12(inst), inst.is_bit(23));
    addr
}

fn ldst_reg_offset(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    let rm = cpu.read_reg_word_aligned(inst.bits(0, 4));
    apply(rn, rm, inst.is_bit(23))
}

fn ldst_reg_pre(cpu: &mut CpuState, inst: u32) -> u32 {
    let addr = ldst_reg_offset(cpu, inst);
    cpu.registers[inst.bits(16, 4).us()] = addr;
    addr
}

fn ldst_reg_post(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = inst.bits(16, 4);
    let rm = cpu.read_reg_word_aligned(inst.bits(0, 4));
    let addr = cpu.read_reg_word_aligned(rn);
    cpu.registers[rn.us()] = apply(addr, rm, inst.is_bit(23));
    addr
}

fn ldst_scaled_offset(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    let index = scaled_index(cpu, inst);
    apply(rn, index, inst.is_bit(23))
}

fn ldst_scaled_pre(cpu: &mut CpuState, inst: u32) -> u32 {
    let addr = ldst_scaled_offset(cpu, inst);
    cpu.registers[inst.bits(16, 4).us()] = addr;
    addr
}

fn ldst_scaled_post(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = inst.bits(16, 4);
    let index = scaled_index(cpu, inst);
    let addr = cpu.read_reg_word_aligned(rn);
    cpu.registers[rn.us()] = apply(addr, index, inst.is_bit(23));
    addr
}

fn misc_imm_offset(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    apply(rn, offset_8(inst), inst.is_bit(23))
}

fn misc_imm_pre(cpu: &mut CpuState, inst: u32) -> u32 {
    let addr = misc_imm_offset(cpu, inst);
    cpu.registers[inst.bits(16, 4).us()] = addr;
    addr
}

fn misc_imm_post(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = inst.bits(16, 4);
    let addr = cpu.read_reg_word_aligned(rn);
    cpu.registers[rn.us()] = apply(addr, offset_8(inst), inst.is_bit(23));
    addr
}

fn misc_reg_offset(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    let rm = cpu.read_reg_word_aligned(inst.bits(0, 4));
    apply(rn, rm, inst.is_bit(23))
}

fn misc_reg_pre(cpu: &mut CpuState, inst: u32) -> u32 {
    let addr = misc_reg_offset(cpu, inst);
    cpu.registers[inst.bits(16, 4).us()] = addr;
    addr
}

fn misc_reg_post(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = inst.bits(16, 4);
    let rm = cpu.read_reg_word_aligned(inst.bits(0, 4));
    let addr = cpu.read_reg_word_aligned(rn);
    cpu.registers[rn.us()] = apply(addr, rm, inst.is_bit(23));
    addr
}

fn rlist_bytes(inst: u32) -> u32 {
    (inst & 0xFFFF).count_ones() * 4
}

fn block_writeback(cpu: &mut CpuState, inst: u32, new_base: u32) {
    if inst.is_bit(21) {
        cpu.registers[inst.bits(16, 4).us()] = new_base;
    }
}

fn block_increment_after(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    block_writeback(cpu, inst, rn.wrapping_add(rlist_bytes(inst)));
    rn
}

fn block_increment_before(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    block_writeback(cpu, inst, rn.wrapping_add(rlist_bytes(inst)));
    rn.wrapping_add(4)
}

fn block_decrement_after(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    block_writeback(cpu, inst, rn.wrapping_sub(rlist_bytes(inst)));
    rn.wrapping_sub(rlist_bytes(inst)).wrapping_add(4)
}

fn block_decrement_before(cpu: &mut CpuState, inst: u32) -> u32 {
    let rn = cpu.read_reg_word_aligned(inst.bits(16, 4));
    block_writeback(cpu, inst, rn.wrapping_sub(rlist_bytes(inst)));
    rn.wrapping_sub(rlist_bytes(inst))
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    /// Data reads and writes honor the guest's CPSR.E data endianness;
    /// instruction fetches do not.
    pub(crate) fn read_word(&mut self, addr: u32) -> u32 {
        let value = self.bus.get::<u32>(addr);
        if self.state.big_endian() {
            value.swap_bytes()
        } else {
            value
        }
    }

    pub(crate) fn read_hword(&mut self, addr: u32) -> u32 {
        let value = self.bus.get::<u16>(addr);
        if self.state.big_endian() {
            value.swap_bytes().u32()
        } else {
            value.u32()
        }
    }

    pub(crate) fn read_byte(&mut self, addr: u32) -> u32 {
        self.bus.get::<u8>(addr).u32()
    }

    pub(crate) fn write_word(&mut self, addr: u32, value: u32) {
        let value = if self.state.big_endian() {
            value.swap_bytes()
        } else {
            value
        };
        self.bus.set::<u32>(addr, value);
    }

    pub(crate) fn write_hword(&mut self, addr: u32, value: u16) {
        let value = if self.state.big_endian() {
            value.swap_bytes()
        } else {
            value
        };
        self.bus.set::<u16>(addr, value);
    }

    pub(crate) fn write_byte(&mut self, addr: u32, value: u8) {
        self.bus.set::<u8>(addr, value);
    }

    pub(crate) fn write_dword(&mut self, addr: u32, value: u64) {
        let value = if self.state.big_endian() {
            value.swap_bytes()
        } else {
            value
        };
        self.bus.set::<u64>(addr, value);
    }

    fn ld_st(&mut self, at: usize) -> (u32, u32) {
        let p: LdSt = self.cache.arena.payload(at);
        let addr = (p.addr)(&mut self.state, p.inst);
        (addr, p.inst)
    }

    pub(super) fn op_ldr(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.read_word(addr);
        let rd = inst.bits(12, 4);
        self.state.registers[rd.us()] = value;
        if rd == 15 {
            // Bit 0 selects the instruction set, like BX.
            self.state.t = value.is_bit(0);
            self.state.registers[15] &= !1;
            Step::Branch
        } else {
            Step::Advance
        }
    }

    pub(super) fn op_ldrb(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.read_byte(addr);
        self.write_rd(inst, value)
    }

    pub(super) fn op_ldrh(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.read_hword(addr);
        self.write_rd(inst, value)
    }

    pub(super) fn op_ldrsb(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.read_byte(addr) as u8 as i8 as i32 as u32;
        self.write_rd(inst, value)
    }

    pub(super) fn op_ldrsh(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.read_hword(addr) as u16 as i16 as i32 as u32;
        self.write_rd(inst, value)
    }

    pub(super) fn op_ldrd(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        // Two separate reads; the MPCore has no LPAE single access here.
        let rd = inst.bits(12, 4).us();
        self.state.registers[rd] = self.read_word(addr);
        self.state.registers[rd + 1] = self.read_word(addr.wrapping_add(4));
        Step::Advance
    }

    fn write_rd(&mut self, inst: u32, value: u32) -> Step {
        let rd = inst.bits(12, 4);
        self.state.registers[rd.us()] = value;
        if rd == 15 {
            Step::Branch
        } else {
            Step::Advance
        }
    }

    pub(super) fn op_str(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.state.read_reg(inst.bits(12, 4));
        self.write_word(addr, value);
        Step::Advance
    }

    pub(super) fn op_strb(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.state.read_reg(inst.bits(12, 4));
        self.write_byte(addr, value.u8());
        Step::Advance
    }

    pub(super) fn op_strh(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let value = self.state.read_reg(inst.bits(12, 4));
        self.write_hword(addr, value.u16());
        Step::Advance
    }

    pub(super) fn op_strd(&mut self, at: usize) -> Step {
        let (addr, inst) = self.ld_st(at);
        let rd = inst.bits(12, 4).us();
        let (lo, hi) = (self.state.registers[rd], self.state.registers[rd + 1]);
        self.write_word(addr, lo);
        self.write_word(addr.wrapping_add(4), hi);
        Step::Advance
    }

    pub(super) fn op_ldm(&mut self, at: usize) -> Step {
        let (mut addr, inst) = self.ld_st(at);

        if inst.is_bit(22) && !inst.is_bit(15) {
            // User-bank transfer.
            for r in 0..15u16 {
                if inst.is_bit(r) {
                    let value = self.read_word(addr);
                    self.state.set_user_reg(r.u32(), value);
                    addr = addr.wrapping_add(4);
                }
            }
        } else if !inst.is_bit(22) {
            for r in 0..16u16 {
                if inst.is_bit(r) {
                    let mut value = self.read_word(addr);
                    if r == 15 {
                        self.state.t = value.is_bit(0);
                        value &= !1;
                    }
                    self.state.registers[r.us()] = value;
                    addr = addr.wrapping_add(4);
                }
            }
        } else {
            // S bit with the PC in the list: CPSR comes back from SPSR
            // before the PC is loaded.
            for r in 0..15u16 {
                if inst.is_bit(r) {
                    self.state.registers[r.us()] = self.read_word(addr);
                    addr = addr.wrapping_add(4);
                }
            }
            if self.state.has_spsr() {
                let spsr = self.state.spsr();
                self.state.write_cpsr(spsr);
            }
            self.state.registers[15] = self.read_word(addr);
        }

        if inst.is_bit(15) {
            Step::Branch
        } else {
            Step::Advance
        }
    }

    pub(super) fn op_stm(&mut self, at: usize) -> Step {
        let p: LdSt = self.cache.arena.payload(at);
        let inst = p.inst;
        let rn = inst.bits(16, 4);
        // The base value stored for a list containing Rn is the
        // pre-writeback one.
        let base_old = self.state.registers[rn.us()];
        let mut addr = (p.addr)(&mut self.state, inst);

        if inst.is_bit(22) {
            for r in 0..15u16 {
                if inst.is_bit(r) {
                    let value = self.state.user_reg(r.u32());
                    self.write_word(addr, value);
                    addr = addr.wrapping_add(4);
                }
            }
        } else {
            for r in 0..15u16 {
                if inst.is_bit(r) {
                    let value = if r.u32() == rn {
                        base_old
                    } else {
                        self.state.registers[r.us()]
                    };
                    self.write_word(addr, value);
                    addr = addr.wrapping_add(4);
                }
            }
        }
        if inst.is_bit(15) {
            let value = self.state.read_reg(15);
            self.write_word(addr, value);
        }
        Step::Advance
    }

    pub(super) fn op_srs(&mut self, at: usize) -> Step {
        let (addr, _) = self.ld_st(at);
        let lr = self.state.registers[14];
        let spsr = self.state.spsr();
        self.write_word(addr, lr);
        self.write_word(addr.wrapping_add(4), spsr);
        Step::Advance
    }

    pub(super) fn op_rfe(&mut self, at: usize) -> Step {
        let (addr, _) = self.ld_st(at);
        let cpsr = self.read_word(addr);
        let target = self.read_word(addr.wrapping_add(4));
        self.state.write_cpsr(cpsr);
        self.state.registers[15] = target;
        Step::Branch
    }

    pub(super) fn op_ldrex(&mut self, op: Op, at: usize) -> Step {
        let p: Media = self.cache.arena.payload(at);
        let addr = self.state.registers[p.rn.us()];
        self.state.set_exclusive(addr);

        let rd = p.rd.us();
        match op {
            Op::Ldrex => self.state.registers[rd] = self.read_word(addr),
            Op::Ldrexb => self.state.registers[rd] = self.read_byte(addr),
            Op::Ldrexh => self.state.registers[rd] = self.read_hword(addr),
            _ => {
                self.state.registers[rd] = self.read_word(addr);
                self.state.registers[rd + 1] = self.read_word(addr.wrapping_add(4));
            }
        }
        if p.rd == 15 {
            Step::Branch
        } else {
            Step::Advance
        }
    }

    pub(super) fn op_strex(&mut self, op: Op, at: usize) -> Step {
        let p: Media = self.cache.arena.payload(at);
        let addr = self.state.registers[p.rn.us()];

        if self.state.check_exclusive(addr) {
            self.state.clear_exclusive();
            match op {
                Op::Strex => {
                    let value = self.state.registers[p.rm.us()];
                    self.write_word(addr, value);
                }
                Op::Strexb => {
                    let value = self.state.registers[p.rm.us()];
                    self.write_byte(addr, value.u8());
                }
                Op::Strexh => {
                    let value = self.state.registers[p.rm.us()];
                    self.write_hword(addr, value.u16());
                }
                _ => {
                    let rt = self.state.registers[p.rm.us()] as u64;
                    let rt2 = self.state.registers[p.rm.us() + 1] as u64;
                    let value = if self.state.big_endian() {
                        (rt << 32) | rt2
                    } else {
                        (rt2 << 32) | rt
                    };
                    self.write_dword(addr, value);
                }
            }
            self.state.registers[p.rd.us()] = 0;
        } else {
            self.state.registers[p.rd.us()] = 1;
        }
        Step::Advance
    }

    pub(super) fn op_swp(&mut self, op: Op, at: usize) -> Step {
        let p: Media = self.cache.arena.payload(at);
        let addr = self.state.registers[p.rn.us()];
        let rm = self.state.registers[p.rm.us()];

        let value = if op == Op::Swp {
            let value = self.read_word(addr);
            self.write_word(addr, rm);
            value
        } else {
            let value = self.read_byte(addr);
            self.write_byte(addr, rm.u8());
            value
        };
        self.state.registers[p.rd.us()] = value;
        Step::Advance
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn state_with_base(rn: u32, value: u32) -> CpuState {
        let mut state = CpuState::default();
        state.registers[rn.us()] = value;
        state
    }

    #[test]
    fn immediate_indexing() {
        // ldr r0, [r1, #8]
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(ldst_imm_offset(&mut cpu, 0xE591_0008), 0x108);
        assert_eq!(cpu.registers[1], 0x100);

        // ldr r0, [r1, #-8]!
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(ldst_imm_pre(&mut cpu, 0xE531_0008), 0xF8);
        assert_eq!(cpu.registers[1], 0xF8);

        // ldr r0, [r1], #8
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(ldst_imm_post(&mut cpu, 0xE491_0008), 0x100);
        assert_eq!(cpu.registers[1], 0x108);
    }

    #[test]
    fn misc_split_immediate() {
        // ldrh r0, [r1, #0x24]
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(misc_imm_offset(&mut cpu, 0xE1D1_02B4), 0x124);
    }

    #[test]
    fn block_start_addresses() {
        // Four registers in the list: r0-r3
        let list = 0xE891_000F;
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(block_increment_after(&mut cpu, list), 0x100);
        assert_eq!(block_increment_before(&mut cpu, list), 0x104);
        assert_eq!(block_decrement_after(&mut cpu, list), 0xF4);
        assert_eq!(block_decrement_before(&mut cpu, list), 0xF0);
        // No writeback without the W bit
        assert_eq!(cpu.registers[1], 0x100);
    }

    #[test]
    fn block_writeback_with_w() {
        // ldmia r1!, {r0, r2}
        let mut cpu = state_with_base(1, 0x100);
        assert_eq!(block_increment_after(&mut cpu, 0xE8B1_0005), 0x100);
        assert_eq!(cpu.registers[1], 0x108);
    }

    #[test]
    fn scaled_offsets() {
        // ldr r0, [r1, r2, lsl #2]
        let mut cpu = state_with_base(1, 0x100);
        cpu.registers[2] = 4;
        assert_eq!(ldst_scaled_offset(&mut cpu, 0xE791_0102), 0x110);

        // asr #32 on a negative index subtracts -1
        let mut cpu = state_with_base(1, 0x100);
        cpu.registers[2] = 0x8000_0000;
        assert_eq!(ldst_scaled_offset(&mut cpu, 0xE791_0042), 0xFF);
    }

    #[test]
    fn pc_base_is_word_aligned() {
        let mut cpu = CpuState::default();
        cpu.registers[15] = 0x1002;
        cpu.t = true;
        // ldr r0, [pc, #4] from Thumb-expanded code
        assert_eq!(ldst_imm_offset(&mut cpu, 0xE59F_0004), 0x1008);
    }
}
