// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The dispatch loop: walks pre-decoded records and hands each one to its
//! semantic handler.

pub mod alu;
pub mod media;
pub mod mem;
pub mod mul;
pub mod sys;

use num_traits::FromPrimitive;

use crate::{
    arena::HEADER_SIZE,
    arm::{self, flow, Op},
    interface::{Bus, VfpDispatch, VFP_TAG},
    numutil::NumExt,
    Cpu,
};

/// Outcome of one executed record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Step {
    /// Not a taken branch: the loop advances the PC by the instruction
    /// size and steps to the next record of the block.
    Advance,
    /// The handler wrote a new PC; control returns to the dispatch
    /// prologue.
    Branch,
    /// Undefined-instruction trap: zero the budget and return to the host.
    Halt,
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    /// Execute up to `instructions_to_execute` guest instructions,
    /// returning the number actually executed. Returns early when the IRQ
    /// line is raised while IRQs are enabled, so the host can take the
    /// interrupt.
    pub fn run(&mut self) -> u32 {
        self.state.load_flags();
        let mut executed = 0;

        'dispatch: loop {
            if self.state.irq_line && !self.state.irqs_masked() {
                break;
            }

            // Halfword alignment on Thumb, word alignment on ARM.
            let align = self.state.inst_size() - 1;
            self.state.registers[15] &= !align;
            let pc = self.state.pc();

            let mut at = match self.cache.lookup(pc) {
                Some(offset) => offset,
                None => self.build_block(pc),
            };

            loop {
                if executed >= self.state.instructions_to_execute {
                    break 'dispatch;
                }
                executed += 1;

                let header = self.cache.arena.header(at);
                let passed =
                    header.cond == 0xE || self.state.condition_passed(header.cond.u32());
                let step = if !passed {
                    Step::Advance
                } else if header.tag & VFP_TAG != 0 {
                    let payload: arm::VfpWord = self.cache.arena.payload(at);
                    self.vfp.execute(
                        &mut self.state,
                        &mut self.bus,
                        header.tag & !VFP_TAG,
                        payload.word,
                    )
                } else {
                    let op = Op::from_u16(header.tag).expect("corrupt operation record");
                    self.execute(op, at)
                };

                match step {
                    Step::Advance => {
                        self.state.registers[15] =
                            self.state.registers[15].wrapping_add(header.size.u32());
                        if header.flow & flow::NON_BRANCH == 0 {
                            continue 'dispatch;
                        }
                        at += record_len(header.tag);
                    }
                    Step::Branch => continue 'dispatch,
                    Step::Halt => break 'dispatch,
                }
            }
        }

        self.state.save_flags();
        self.state.instructions_to_execute = 0;
        executed
    }

    /// Route one record to its handler. O(1): the match lowers to a jump
    /// table keyed by tag.
    fn execute(&mut self, op: Op, at: usize) -> Step {
        match op {
            Op::And
            | Op::Eor
            | Op::Sub
            | Op::Rsb
            | Op::Add
            | Op::Adc
            | Op::Sbc
            | Op::Rsc
            | Op::Tst
            | Op::Teq
            | Op::Cmp
            | Op::Cmn
            | Op::Orr
            | Op::Mov
            | Op::Bic
            | Op::Mvn => self.op_dataproc(op, at),

            Op::Bbl => self.op_bbl(at),
            Op::Bx | Op::Bxj => self.op_bx(at),
            Op::BlxReg => self.op_blx_reg(at),
            Op::BlxImm => self.op_blx_imm(at),

            Op::Mul | Op::Mla => self.op_mul(op, at),
            Op::Umaal | Op::Umull | Op::Umlal | Op::Smull | Op::Smlal => {
                self.op_mul_long(op, at)
            }
            Op::SmlaXy => self.op_smla_xy(at),
            Op::SmlalXy => self.op_smlal_xy(at),
            Op::SmulXy => self.op_smul_xy(at),
            Op::SmlawY
            | Op::SmulwY
            | Op::Smlad
            | Op::Smlsd
            | Op::Smuad
            | Op::Smusd
            | Op::Smmla
            | Op::Smmls
            | Op::Smmul => self.op_dsp_mul(op, at),
            Op::Smlald | Op::Smlsld => self.op_dsp_mul_long(op, at),
            Op::Usad8 | Op::Usada8 => self.op_usad(at),

            Op::Qadd | Op::Qsub | Op::Qdadd | Op::Qdsub => self.op_sat_arith(op, at),
            Op::Ssat | Op::Usat => self.op_sat(op, at),
            Op::Ssat16 | Op::Usat16 => self.op_sat16(op, at),

            Op::Sadd8 | Op::Sadd16 | Op::Sasx | Op::Ssax | Op::Ssub8 | Op::Ssub16 => {
                self.op_parallel_signed(op, at)
            }
            Op::Uadd8 | Op::Uadd16 | Op::Uasx | Op::Usax | Op::Usub8 | Op::Usub16 => {
                self.op_parallel_unsigned(op, at)
            }
            Op::Qadd8 | Op::Qadd16 | Op::Qasx | Op::Qsax | Op::Qsub8 | Op::Qsub16 => {
                self.op_parallel_sat_signed(op, at)
            }
            Op::Uqadd8 | Op::Uqadd16 | Op::Uqasx | Op::Uqsax | Op::Uqsub8 | Op::Uqsub16 => {
                self.op_parallel_sat_unsigned(op, at)
            }
            Op::Shadd8 | Op::Shadd16 | Op::Shasx | Op::Shsax | Op::Shsub8 | Op::Shsub16 => {
                self.op_parallel_halving_signed(op, at)
            }
            Op::Uhadd8 | Op::Uhadd16 | Op::Uhasx | Op::Uhsax | Op::Uhsub8 | Op::Uhsub16 => {
                self.op_parallel_halving_unsigned(op, at)
            }

            Op::Sel => self.op_sel(at),
            Op::Clz => self.op_clz(at),
            Op::Rev | Op::Rev16 | Op::Revsh => self.op_rev(op, at),
            Op::Pkhbt | Op::Pkhtb => self.op_pkh(op, at),
            Op::Sxtb
            | Op::Sxth
            | Op::Sxtb16
            | Op::Uxtb
            | Op::Uxth
            | Op::Uxtb16
            | Op::Sxtab
            | Op::Sxtah
            | Op::Sxtab16
            | Op::Uxtab
            | Op::Uxtah
            | Op::Uxtab16 => self.op_extend(op, at),

            Op::Ldr | Op::Ldrt => self.op_ldr(at),
            Op::Ldrb | Op::Ldrbt => self.op_ldrb(at),
            Op::Ldrh => self.op_ldrh(at),
            Op::Ldrsb => self.op_ldrsb(at),
            Op::Ldrsh => self.op_ldrsh(at),
            Op::Ldrd => self.op_ldrd(at),
            Op::Str | Op::Strt => self.op_str(at),
            Op::Strb | Op::Strbt => self.op_strb(at),
            Op::Strh => self.op_strh(at),
            Op::Strd => self.op_strd(at),
            Op::Ldm => self.op_ldm(at),
            Op::Stm => self.op_stm(at),
            Op::Srs => self.op_srs(at),
            Op::Rfe => self.op_rfe(at),

            Op::Ldrex | Op::Ldrexb | Op::Ldrexh | Op::Ldrexd => self.op_ldrex(op, at),
            Op::Strex | Op::Strexb | Op::Strexh | Op::Strexd => self.op_strex(op, at),
            Op::Clrex => {
                self.state.clear_exclusive();
                Step::Advance
            }
            Op::Swp | Op::Swpb => self.op_swp(op, at),

            Op::Mrs => self.op_mrs(at),
            Op::Msr => self.op_msr(at),
            Op::Cps => self.op_cps(at),
            Op::Setend => self.op_setend(at),

            Op::Mrc => self.op_mrc(at),
            Op::Mcr => self.op_mcr(at),
            Op::Mrrc | Op::Mcrr => self.op_cp_pair(op, at),
            Op::Cdp | Op::Ldc | Op::Stc => self.op_undefined_coprocessor(op),

            Op::Nop | Op::Yield | Op::Wfe | Op::Wfi | Op::Sev | Op::Pld => self.op_hint(op),
            Op::Bkpt => self.op_bkpt(at),
            Op::Swi => self.op_swi(at),

            Op::ThumbB => self.op_thumb_b(at),
            Op::ThumbBCond => self.op_thumb_b(at),
            Op::ThumbBlPrefix => self.op_thumb_bl_prefix(at),
            Op::ThumbBlSuffix => self.op_thumb_bl_suffix(at),
            Op::ThumbBlxSuffix => self.op_thumb_blx_suffix(at),
        }
    }
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    fn op_bbl(&mut self, at: usize) -> Step {
        let p: arm::Branch = self.cache.arena.payload(at);
        let pc = self.state.registers[15];
        if p.link {
            self.state.registers[14] = pc.wrapping_add(4);
        }
        self.state.registers[15] = pc.wrapping_add(8).wrapping_add_signed(p.offset);
        Step::Branch
    }

    fn op_bx(&mut self, at: usize) -> Step {
        let p: arm::BranchExchange = self.cache.arena.payload(at);
        let mut target = self.state.registers[p.rm.us()];
        if p.rm == 15 {
            target = target.wrapping_add(2 * self.state.inst_size());
        }
        self.state.t = target.is_bit(0);
        self.state.registers[15] = target & !1;
        Step::Branch
    }

    fn op_blx_reg(&mut self, at: usize) -> Step {
        let p: arm::BranchExchange = self.cache.arena.payload(at);
        let mut lr = self.state.registers[15].wrapping_add(self.state.inst_size());
        if self.state.t {
            lr |= 1;
        }
        self.state.registers[14] = lr;

        let target = self.state.registers[p.rm.us()];
        self.state.t = target.is_bit(0);
        self.state.registers[15] = target & !1;
        Step::Branch
    }

    fn op_blx_imm(&mut self, at: usize) -> Step {
        let p: arm::BlxImm = self.cache.arena.payload(at);
        let pc = self.state.registers[15];
        self.state.registers[14] = pc.wrapping_add(4);
        self.state.t = true;
        self.state.registers[15] = pc
            .wrapping_add(8)
            .wrapping_add_signed(p.offset)
            .wrapping_add((p.h as u32) << 1);
        Step::Branch
    }

    fn op_thumb_b(&mut self, at: usize) -> Step {
        let p: arm::ThumbBranch = self.cache.arena.payload(at);
        self.state.registers[15] = self.state.registers[15]
            .wrapping_add(4)
            .wrapping_add_signed(p.offset);
        Step::Branch
    }

    /// First half of a BL/BLX pair: stage the upper offset in LR.
    fn op_thumb_bl_prefix(&mut self, at: usize) -> Step {
        let p: arm::ThumbBranch = self.cache.arena.payload(at);
        self.state.registers[14] = self.state.registers[15]
            .wrapping_add(4)
            .wrapping_add_signed(p.offset);
        Step::Advance
    }

    fn op_thumb_bl_suffix(&mut self, at: usize) -> Step {
        let p: arm::ThumbBranch = self.cache.arena.payload(at);
        let ret = self.state.registers[15].wrapping_add(2) | 1;
        self.state.registers[15] = self.state.registers[14].wrapping_add(p.offset as u32);
        self.state.registers[14] = ret;
        Step::Branch
    }

    /// BLX suffix: like the BL one, but the target is word-aligned ARM
    /// state.
    fn op_thumb_blx_suffix(&mut self, at: usize) -> Step {
        let p: arm::ThumbBranch = self.cache.arena.payload(at);
        let ret = self.state.registers[15].wrapping_add(2) | 1;
        self.state.registers[15] =
            self.state.registers[14].wrapping_add(p.offset as u32) & !3;
        self.state.registers[14] = ret;
        self.state.t = false;
        Step::Branch
    }
}

/// Total byte length of the record with the given tag: header plus the
/// payload type the tag selects.
pub(crate) fn record_len(tag: u16) -> usize {
    use std::mem::size_of;

    if tag & VFP_TAG != 0 {
        return HEADER_SIZE + size_of::<arm::VfpWord>();
    }

    let op = Op::from_u16(tag).expect("corrupt operation record");
    HEADER_SIZE
        + match op {
            Op::And
            | Op::Eor
            | Op::Sub
            | Op::Rsb
            | Op::Add
            | Op::Adc
            | Op::Sbc
            | Op::Rsc
            | Op::Tst
            | Op::Teq
            | Op::Cmp
            | Op::Cmn
            | Op::Orr
            | Op::Mov
            | Op::Bic
            | Op::Mvn => size_of::<arm::Alu>(),

            Op::Bbl => size_of::<arm::Branch>(),
            Op::Bx | Op::Bxj | Op::BlxReg => size_of::<arm::BranchExchange>(),
            Op::BlxImm => size_of::<arm::BlxImm>(),

            Op::Mul | Op::Mla => size_of::<arm::Mul>(),
            Op::Umaal | Op::Umull | Op::Umlal | Op::Smull | Op::Smlal => {
                size_of::<arm::MulLong>()
            }
            Op::SmlaXy | Op::SmlalXy | Op::SmulXy => size_of::<arm::HalfMul>(),
            Op::SmlawY
            | Op::SmulwY
            | Op::Smlad
            | Op::Smlsd
            | Op::Smuad
            | Op::Smusd
            | Op::Smmla
            | Op::Smmls
            | Op::Smmul => size_of::<arm::DspMul>(),
            Op::Smlald | Op::Smlsld => size_of::<arm::DspMulLong>(),
            Op::Usad8 | Op::Usada8 => size_of::<arm::MediaAcc>(),

            Op::Ssat | Op::Usat | Op::Ssat16 | Op::Usat16 => size_of::<arm::Sat>(),
            Op::Pkhbt | Op::Pkhtb => size_of::<arm::Pkh>(),
            Op::Sxtb
            | Op::Sxth
            | Op::Sxtb16
            | Op::Uxtb
            | Op::Uxth
            | Op::Uxtb16
            | Op::Sxtab
            | Op::Sxtah
            | Op::Sxtab16
            | Op::Uxtab
            | Op::Uxtah
            | Op::Uxtab16 => size_of::<arm::Extend>(),

            Op::Ldr
            | Op::Ldrb
            | Op::Ldrh
            | Op::Ldrsb
            | Op::Ldrsh
            | Op::Ldrd
            | Op::Str
            | Op::Strb
            | Op::Strh
            | Op::Strd
            | Op::Ldrt
            | Op::Ldrbt
            | Op::Strt
            | Op::Strbt
            | Op::Ldm
            | Op::Stm
            | Op::Srs
            | Op::Rfe => size_of::<arm::LdSt>(),

            Op::Mrs => size_of::<arm::Mrs>(),
            Op::Msr => size_of::<arm::Msr>(),
            Op::Cps => size_of::<arm::Cps>(),
            Op::Setend => size_of::<arm::SetEnd>(),
            Op::Mrc | Op::Mcr => size_of::<arm::CpReg>(),
            Op::Mrrc | Op::Mcrr => size_of::<arm::CpPair>(),
            Op::Bkpt | Op::Swi => size_of::<arm::Imm24>(),

            Op::ThumbB
            | Op::ThumbBCond
            | Op::ThumbBlPrefix
            | Op::ThumbBlSuffix
            | Op::ThumbBlxSuffix => size_of::<arm::ThumbBranch>(),

            // Every remaining tag is a three-register or operand-free
            // record.
            Op::Qadd | Op::Qsub | Op::Qdadd | Op::Qdsub | Op::Sel | Op::Clz | Op::Rev
            | Op::Rev16 | Op::Revsh | Op::Ldrex | Op::Ldrexb | Op::Ldrexh | Op::Ldrexd
            | Op::Strex | Op::Strexb | Op::Strexh | Op::Strexd | Op::Swp | Op::Swpb => {
                size_of::<arm::Media>()
            }
            Op::Sadd8 | Op::Sadd16 | Op::Sasx | Op::Ssax | Op::Ssub8 | Op::Ssub16
            | Op::Uadd8 | Op::Uadd16 | Op::Uasx | Op::Usax | Op::Usub8 | Op::Usub16
            | Op::Qadd8 | Op::Qadd16 | Op::Qasx | Op::Qsax | Op::Qsub8 | Op::Qsub16
            | Op::Uqadd8 | Op::Uqadd16 | Op::Uqasx | Op::Uqsax | Op::Uqsub8 | Op::Uqsub16
            | Op::Shadd8 | Op::Shadd16 | Op::Shasx | Op::Shsax | Op::Shsub8 | Op::Shsub16
            | Op::Uhadd8 | Op::Uhadd16 | Op::Uhasx | Op::Uhsax | Op::Uhsub8 | Op::Uhsub16 => {
                size_of::<arm::Media>()
            }

            Op::Clrex | Op::Cdp | Op::Ldc | Op::Stc | Op::Nop | Op::Yield | Op::Wfe
            | Op::Wfi | Op::Sev | Op::Pld => 0,
        }
}
