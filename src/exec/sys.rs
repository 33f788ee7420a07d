// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Status transfer, interrupt masking, coprocessor access, hints and the
//! supervisor call.

use super::Step;
use crate::{
    arm::{CpPair, CpReg, Cps, Imm24, Mrs, Msr, Op, SetEnd},
    interface::{Bus, VfpDispatch},
    numutil::NumExt,
    state::{Flag, Mode},
    Cpu,
};

/// CPSR fields writable from user mode: flags, GE lanes, E bit.
const USER_MASK: u32 = 0xF80F_0200;
/// Fields additionally writable from privileged modes.
const PRIV_MASK: u32 = 0x0000_01DF;
/// Execution-state bits; reserved in the CPSR, writable in an SPSR.
const STATE_MASK: u32 = 0x0100_0020;

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    pub(super) fn op_mrs(&mut self, at: usize) -> Step {
        let p: Mrs = self.cache.arena.payload(at);
        let value = if p.spsr {
            self.state.spsr()
        } else {
            self.state.save_flags();
            self.state.cpsr
        };
        self.state.registers[p.rd.us()] = value;
        Step::Advance
    }

    pub(super) fn op_msr(&mut self, at: usize) -> Step {
        let p: Msr = self.cache.arena.payload(at);
        let inst = p.inst;

        let operand = if inst.is_bit(25) {
            (inst & 0xFF).rotate_right(inst.bits(8, 4) * 2)
        } else {
            self.state.registers[inst.bits(0, 4).us()]
        };
        let byte_mask = (if inst.is_bit(16) { 0x0000_00FF } else { 0 })
            | (if inst.is_bit(17) { 0x0000_FF00 } else { 0 })
            | (if inst.is_bit(18) { 0x00FF_0000 } else { 0 })
            | (if inst.is_bit(19) { 0xFF00_0000u32 } else { 0 });

        if !p.spsr {
            // The state-bit region is reserved in the CPSR.
            if operand & STATE_MASK != 0 {
                log::warn!("MSR writing reserved CPSR state bits ({operand:08X}), ignored");
            }
            let mask = if self.state.in_privileged_mode() {
                byte_mask & (USER_MASK | PRIV_MASK)
            } else {
                byte_mask & USER_MASK
            };
            self.state.save_flags();
            let value = (self.state.cpsr & !mask) | (operand & mask);
            self.state.write_cpsr(value);
        } else if self.state.has_spsr() {
            let mask = byte_mask & (USER_MASK | PRIV_MASK | STATE_MASK);
            let value = (self.state.spsr() & !mask) | (operand & mask);
            self.state.set_spsr(value);
        }
        Step::Advance
    }

    pub(super) fn op_cps(&mut self, at: usize) -> Step {
        let p: Cps = self.cache.arena.payload(at);
        if !self.state.in_privileged_mode() {
            return Step::Advance;
        }

        if p.imod & 0b10 != 0 {
            let value = (p.imod & 1).u32();
            let mut mask = 0;
            let mut bits = 0;
            if p.a {
                mask |= Flag::AsyncDisable.mask();
                bits |= value << 8;
            }
            if p.i {
                mask |= Flag::IrqDisable.mask();
                bits |= value << 7;
            }
            if p.f {
                mask |= Flag::FiqDisable.mask();
                bits |= value << 6;
            }
            self.state.cpsr = (self.state.cpsr & !mask) | bits;
        }
        if p.mmod {
            self.state.change_privilege_mode(Mode::get(p.mode.u32()));
        }
        Step::Advance
    }

    pub(super) fn op_setend(&mut self, at: usize) -> Step {
        let p: SetEnd = self.cache.arena.payload(at);
        self.state.cpsr = self.state.cpsr.set_bit(Flag::BigEndian as u16, p.big);
        log::warn!("SETEND {} executed", if p.big { "BE" } else { "LE" });
        Step::Advance
    }

    pub(super) fn op_mrc(&mut self, at: usize) -> Step {
        let p: CpReg = self.cache.arena.payload(at);
        if p.cp_num != 15 {
            log::warn!("MRC from unhandled coprocessor p{}", p.cp_num);
            return Step::Advance;
        }

        let value = self
            .state
            .cp15
            .read(p.crn.u32(), p.op1.u32(), p.crm.u32(), p.op2.u32());
        if p.rd == 15 {
            // Rd of 15 targets the flags.
            self.state.n = value.is_bit(31);
            self.state.z = value.is_bit(30);
            self.state.c = value.is_bit(29);
            self.state.v = value.is_bit(28);
        } else {
            self.state.registers[p.rd.us()] = value;
        }
        Step::Advance
    }

    pub(super) fn op_mcr(&mut self, at: usize) -> Step {
        let p: CpReg = self.cache.arena.payload(at);
        if p.cp_num != 15 {
            log::warn!("MCR to unhandled coprocessor p{}", p.cp_num);
            return Step::Advance;
        }

        let value = self.state.read_reg(p.rd.u32());
        self.state
            .cp15
            .write(value, p.crn.u32(), p.op1.u32(), p.crm.u32(), p.op2.u32());
        Step::Advance
    }

    /// MCRR/MRRC. The MPCore exposes no registers through these; stubbed.
    pub(super) fn op_cp_pair(&mut self, op: Op, at: usize) -> Step {
        let p: CpPair = self.cache.arena.payload(at);
        log::warn!(
            "{:?} executed | coprocessor: p{}, crm: c{}, opc1: {}, rt: r{}, rt2: r{}",
            op,
            p.cp_num,
            p.crm,
            p.op1,
            p.rt,
            p.rt2
        );
        Step::Advance
    }

    /// CDP/LDC/STC: reserved here; the guest's undefined-instruction
    /// handling takes over.
    pub(super) fn op_undefined_coprocessor(&mut self, op: Op) -> Step {
        log::debug!("undefined coprocessor instruction ({op:?}) at {:08X}", self.state.pc());
        Step::Halt
    }

    pub(super) fn op_hint(&mut self, op: Op) -> Step {
        log::trace!("{op:?} executed");
        Step::Advance
    }

    pub(super) fn op_bkpt(&mut self, at: usize) -> Step {
        let p: Imm24 = self.cache.arena.payload(at);
        log::debug!(
            "breakpoint instruction hit at {:08X}, comment {:04X}",
            self.state.pc(),
            p.imm
        );
        Step::Advance
    }

    pub(super) fn op_swi(&mut self, at: usize) -> Step {
        let p: Imm24 = self.cache.arena.payload(at);
        self.bus.call_svc(&mut self.state, p.imm);
        Step::Advance
    }
}
