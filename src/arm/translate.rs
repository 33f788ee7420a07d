// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The translator: walks a basic block starting at the guest PC, turning
//! every fetched instruction into a pre-decoded record in the arena.

use super::{
    classify::classify, flow, Alu, ArmInst, BlxImm, Branch, BranchExchange, CpPair, CpReg, Cps,
    DspMul, DspMulLong, Extend, HalfMul, Imm24, LdSt, Media, MediaAcc, Mrs, Msr, Mul, MulLong,
    Op, Pkh, Sat, SetEnd, ThumbBranch, VfpWord,
};
use crate::{
    arena::{NoOperands, OpHeader, Payload},
    exec::{
        alu::shift_operand_fn,
        mem::{addressing_fn, addressing_fn_forced},
    },
    interface::{Bus, VfpDispatch, VFP_TAG},
    numutil::{NumExt, U32Ext},
    thumb::{self, BranchKind, Expanded},
    Cpu,
};

fn is_coprocessor_space(word: u32) -> bool {
    word.bits(25, 3) == 0b110 || word.bits(24, 4) == 0b1110
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    /// Translate the basic block starting at `entry` and register it in
    /// the block cache. When the arena is out of room, the whole cache is
    /// reset once and translation retried.
    pub(crate) fn build_block(&mut self, entry: u32) -> usize {
        match self.try_build_block(entry) {
            Some(start) => start,
            None => {
                self.cache.reset();
                match self.try_build_block(entry) {
                    Some(start) => start,
                    None => panic!("operation arena exhausted by one block at {entry:08X}"),
                }
            }
        }
    }

    fn try_build_block(&mut self, entry: u32) -> Option<usize> {
        let start = self.cache.arena.top();
        let mut pc = entry;
        loop {
            let record = self.cache.arena.top();
            let (flow_bits, size) = if self.state.t {
                self.translate_thumb(pc)?
            } else {
                let word = self.bus.get::<u32>(pc & !3);
                (self.translate_arm(word, pc, 4, 0)?, 4)
            };

            pc = pc.wrapping_add(size);
            if flow_bits & flow::NON_BRANCH == 0 {
                break;
            }
            if pc & 0xFFF == 0 {
                // The successor runs onto the next page: force a
                // re-dispatch so faults there can surface.
                let forced = (flow_bits & !flow::NON_BRANCH) | flow::END_OF_PAGE;
                self.cache.arena.set_flow(record, forced);
                break;
            }
        }
        self.cache.insert(entry, start);
        Some(start)
    }

    fn translate_thumb(&mut self, pc: u32) -> Option<(u8, u32)> {
        let half = self.bus.get::<u16>(pc & !1);
        match thumb::expand(half) {
            Expanded::Arm(word) => Some((self.translate_arm(word, pc, 2, flow::THUMB)?, 2)),
            Expanded::Branch(kind) => {
                let (op, cond, fl, offset) = match kind {
                    BranchKind::B { offset } => (Op::ThumbB, 0xE, flow::DIRECT_BRANCH, offset),
                    BranchKind::BCond { cond, offset } => {
                        (Op::ThumbBCond, cond, flow::DIRECT_BRANCH | flow::COND, offset)
                    }
                    BranchKind::BlPrefix { offset } => {
                        (Op::ThumbBlPrefix, 0xE, flow::NON_BRANCH, offset)
                    }
                    BranchKind::BlSuffix { offset } => (
                        Op::ThumbBlSuffix,
                        0xE,
                        flow::DIRECT_BRANCH | flow::CALL,
                        offset as i32,
                    ),
                    BranchKind::BlxSuffix { offset } => (
                        Op::ThumbBlxSuffix,
                        0xE,
                        flow::DIRECT_BRANCH | flow::CALL,
                        offset as i32,
                    ),
                };
                let payload = ThumbBranch {
                    offset,
                    cond: cond.u8(),
                };
                let fl = self.push(op, cond, fl | flow::THUMB, 2, payload)?;
                Some((fl, 2))
            }
            Expanded::Undefined => self.decode_failure(half.u32(), pc),
        }
    }

    fn decode_failure(&mut self, word: u32, pc: u32) -> ! {
        self.state.save_flags();
        log::error!(
            "decode failure at {pc:08X}: instruction {word:08X}, CPSR {:08X}",
            self.state.cpsr
        );
        panic!("undecodable guest instruction {word:08X} at {pc:08X}");
    }

    fn translate_arm(&mut self, word: u32, pc: u32, size: u8, extra: u8) -> Option<u8> {
        let inst = ArmInst(word);
        let cond = inst.cond();

        // cp10/cp11 words get first refusal by the VFP dispatcher.
        if is_coprocessor_space(word) && matches!(inst.bits(8, 4), 10 | 11) {
            if let Some(tag) = self.vfp.classify(word) {
                return self.push_raw(
                    VFP_TAG | tag,
                    cond,
                    flow::NON_BRANCH | extra,
                    size,
                    VfpWord { word },
                );
            }
        }

        let Some(op) = classify(word) else {
            self.decode_failure(word, pc)
        };

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
            | Op::Mvn => {
                let writes = !matches!(op, Op::Tst | Op::Teq | Op::Cmp | Op::Cmn);
                let rd = inst.reg(12).u8();
                let fl = if writes && rd == 15 {
                    flow::INDIRECT_BRANCH
                } else {
                    flow::NON_BRANCH
                };
                self.push(
                    op,
                    cond,
                    fl | extra,
                    size,
                    Alu {
                        shift: shift_operand_fn(word),
                        operand: word & 0xFFF,
                        rn: inst.reg(16).u8(),
                        rd,
                        s: inst.is_bit(20),
                    },
                )
            }

            Op::Bbl => {
                let link = inst.is_bit(24);
                let mut fl = if link { flow::CALL } else { flow::DIRECT_BRANCH };
                if cond != 0xE {
                    fl |= flow::COND;
                }
                self.push(
                    op,
                    cond,
                    fl | extra,
                    size,
                    Branch {
                        offset: word.i24() << 2,
                        link,
                    },
                )
            }
            Op::Bx | Op::Bxj => self.push(
                op,
                cond,
                flow::INDIRECT_BRANCH | extra,
                size,
                BranchExchange {
                    rm: inst.reg(0).u8(),
                    link: false,
                },
            ),
            Op::BlxReg => self.push(
                op,
                cond,
                flow::INDIRECT_BRANCH | flow::CALL | extra,
                size,
                BranchExchange {
                    rm: inst.reg(0).u8(),
                    link: true,
                },
            ),
            Op::BlxImm => self.push(
                op,
                cond,
                flow::DIRECT_BRANCH | flow::CALL | extra,
                size,
                BlxImm {
                    offset: word.i24() << 2,
                    h: inst.is_bit(24),
                },
            ),

            Op::Mul | Op::Mla => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Mul {
                    rd: inst.reg(16).u8(),
                    rn: inst.reg(12).u8(),
                    rm: inst.reg(0).u8(),
                    rs: inst.reg(8).u8(),
                    s: inst.is_bit(20),
                },
            ),
            Op::Umaal | Op::Umull | Op::Umlal | Op::Smull | Op::Smlal => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                MulLong {
                    rdhi: inst.reg(16).u8(),
                    rdlo: inst.reg(12).u8(),
                    rm: inst.reg(0).u8(),
                    rs: inst.reg(8).u8(),
                    s: op != Op::Umaal && inst.is_bit(20),
                },
            ),
            Op::SmlaXy | Op::SmulXy | Op::SmlalXy => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                HalfMul {
                    rd: inst.reg(16).u8(),
                    rn: inst.reg(12).u8(),
                    rm: inst.reg(0).u8(),
                    rs: inst.reg(8).u8(),
                    x: inst.is_bit(5),
                    y: inst.is_bit(6),
                },
            ),
            Op::SmlawY
            | Op::SmulwY
            | Op::Smlad
            | Op::Smlsd
            | Op::Smuad
            | Op::Smusd
            | Op::Smmla
            | Op::Smmls
            | Op::Smmul => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                DspMul {
                    rd: inst.reg(16).u8(),
                    ra: inst.reg(12).u8(),
                    rm: inst.reg(8).u8(),
                    rn: inst.reg(0).u8(),
                    // Top-half select for the 32x16 forms, swap/round
                    // otherwise.
                    m: if matches!(op, Op::SmlawY | Op::SmulwY) {
                        inst.is_bit(6)
                    } else {
                        inst.is_bit(5)
                    },
                },
            ),
            Op::Smlald | Op::Smlsld => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                DspMulLong {
                    rdhi: inst.reg(16).u8(),
                    rdlo: inst.reg(12).u8(),
                    rm: inst.reg(8).u8(),
                    rn: inst.reg(0).u8(),
                    m: inst.is_bit(5),
                },
            ),
            Op::Usad8 | Op::Usada8 => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                MediaAcc {
                    rd: inst.reg(16).u8(),
                    ra: inst.reg(12).u8(),
                    rm: inst.reg(8).u8(),
                    rn: inst.reg(0).u8(),
                },
            ),

            Op::Ssat | Op::Usat => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Sat {
                    rd: inst.reg(12).u8(),
                    rn: inst.reg(0).u8(),
                    sat_imm: inst.bits(16, 5).u8(),
                    shift_type: inst.bits(6, 1).u8(),
                    imm5: inst.bits(7, 5).u8(),
                },
            ),
            Op::Ssat16 | Op::Usat16 => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Sat {
                    rd: inst.reg(12).u8(),
                    rn: inst.reg(0).u8(),
                    sat_imm: inst.bits(16, 4).u8(),
                    shift_type: 0,
                    imm5: 0,
                },
            ),
            Op::Pkhbt | Op::Pkhtb => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Pkh {
                    rd: inst.reg(12).u8(),
                    rn: inst.reg(16).u8(),
                    rm: inst.reg(0).u8(),
                    imm: inst.bits(7, 5).u8(),
                },
            ),
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
            | Op::Uxtab16 => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Extend {
                    rd: inst.reg(12).u8(),
                    rn: inst.reg(16).u8(),
                    rm: inst.reg(0).u8(),
                    rotate: inst.bits(10, 2).u8(),
                },
            ),

            Op::Ldr
            | Op::Ldrb
            | Op::Ldrh
            | Op::Ldrsb
            | Op::Ldrsh
            | Op::Ldrd
            | Op::Str
            | Op::Strb
            | Op::Strh
            | Op::Strd => {
                let Some(addr) = addressing_fn(word) else {
                    self.decode_failure(word, pc)
                };
                let fl = if inst.reg(12) == 15 {
                    flow::INDIRECT_BRANCH
                } else {
                    flow::NON_BRANCH
                };
                self.push(op, cond, fl | extra, size, LdSt { addr, inst: word })
            }
            Op::Ldrt | Op::Ldrbt | Op::Strt | Op::Strbt => {
                let fl = if inst.reg(12) == 15 {
                    flow::INDIRECT_BRANCH
                } else {
                    flow::NON_BRANCH
                };
                self.push(
                    op,
                    cond,
                    fl | extra,
                    size,
                    LdSt { addr: addressing_fn_forced(word), inst: word },
                )
            }
            Op::Ldm | Op::Stm => {
                let Some(addr) = addressing_fn(word) else {
                    self.decode_failure(word, pc)
                };
                let fl = if op == Op::Ldm && inst.is_bit(15) {
                    flow::INDIRECT_BRANCH
                } else {
                    flow::NON_BRANCH
                };
                self.push(op, cond, fl | extra, size, LdSt { addr, inst: word })
            }
            Op::Srs | Op::Rfe => {
                // The block addressing engine computes the two-word
                // frame's start address from a synthesized list.
                let synth = (word & 0xFFFF_0000) | 0b11;
                let Some(addr) = addressing_fn(synth) else {
                    self.decode_failure(word, pc)
                };
                let fl = if op == Op::Rfe {
                    flow::INDIRECT_BRANCH | flow::RET
                } else {
                    flow::NON_BRANCH
                };
                self.push(op, 0xE, fl | extra, size, LdSt { addr, inst: synth })
            }

            Op::Qadd | Op::Qsub | Op::Qdadd | Op::Qdsub | Op::Sel | Op::Clz | Op::Rev
            | Op::Rev16 | Op::Revsh | Op::Ldrex | Op::Ldrexb | Op::Ldrexh | Op::Ldrexd
            | Op::Strex | Op::Strexb | Op::Strexh | Op::Strexd | Op::Swp | Op::Swpb
            | Op::Sadd8 | Op::Sadd16 | Op::Sasx | Op::Ssax | Op::Ssub8 | Op::Ssub16
            | Op::Uadd8 | Op::Uadd16 | Op::Uasx | Op::Usax | Op::Usub8 | Op::Usub16
            | Op::Qadd8 | Op::Qadd16 | Op::Qasx | Op::Qsax | Op::Qsub8 | Op::Qsub16
            | Op::Uqadd8 | Op::Uqadd16 | Op::Uqasx | Op::Uqsax | Op::Uqsub8 | Op::Uqsub16
            | Op::Shadd8 | Op::Shadd16 | Op::Shasx | Op::Shsax | Op::Shsub8 | Op::Shsub16
            | Op::Uhadd8 | Op::Uhadd16 | Op::Uhasx | Op::Uhsax | Op::Uhsub8
            | Op::Uhsub16 => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Media {
                    rd: inst.reg(12).u8(),
                    rn: inst.reg(16).u8(),
                    rm: inst.reg(0).u8(),
                },
            ),

            Op::Mrs => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Mrs {
                    rd: inst.reg(12).u8(),
                    spsr: inst.is_bit(22),
                },
            ),
            Op::Msr => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Msr {
                    inst: word,
                    spsr: inst.is_bit(22),
                },
            ),
            Op::Cps => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Cps {
                    imod: inst.bits(18, 2).u8(),
                    mmod: inst.is_bit(17),
                    a: inst.is_bit(8),
                    i: inst.is_bit(7),
                    f: inst.is_bit(6),
                    mode: inst.bits(0, 5).u8(),
                },
            ),
            Op::Setend => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                SetEnd {
                    big: inst.is_bit(9),
                },
            ),

            Op::Mrc | Op::Mcr => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                CpReg {
                    rd: inst.reg(12).u8(),
                    crn: inst.reg(16).u8(),
                    crm: inst.reg(0).u8(),
                    op1: inst.bits(21, 3).u8(),
                    op2: inst.bits(5, 3).u8(),
                    cp_num: inst.bits(8, 4).u8(),
                },
            ),
            Op::Mrrc | Op::Mcrr => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                CpPair {
                    rt: inst.reg(12).u8(),
                    rt2: inst.reg(16).u8(),
                    crm: inst.reg(0).u8(),
                    op1: inst.bits(4, 4).u8(),
                    cp_num: inst.bits(8, 4).u8(),
                },
            ),

            Op::Swi => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Imm24 {
                    imm: word & 0x00FF_FFFF,
                },
            ),
            Op::Bkpt => self.push(
                op,
                cond,
                flow::NON_BRANCH | extra,
                size,
                Imm24 {
                    imm: (inst.bits(8, 12) << 4) | inst.bits(0, 4),
                },
            ),

            Op::Clrex | Op::Cdp | Op::Ldc | Op::Stc | Op::Nop | Op::Yield | Op::Wfe
            | Op::Wfi | Op::Sev | Op::Pld => {
                self.push(op, cond, flow::NON_BRANCH | extra, size, NoOperands)
            }

            Op::ThumbB | Op::ThumbBCond | Op::ThumbBlPrefix | Op::ThumbBlSuffix
            | Op::ThumbBlxSuffix => unreachable!("thumb branch tags are made by the expander"),
        }
    }

    fn push<P: Payload>(&mut self, op: Op, cond: u32, fl: u8, size: u8, payload: P) -> Option<u8> {
        self.push_raw(op as u16, cond, fl, size, payload)
    }

    fn push_raw<P: Payload>(
        &mut self,
        tag: u16,
        cond: u32,
        fl: u8,
        size: u8,
        payload: P,
    ) -> Option<u8> {
        if self.cache.arena.push(OpHeader::new(tag, cond, fl, size), payload) {
            Some(fl)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{exec::record_len, interface::RwType, state::CpuState};

    struct FlatBus(Vec<u8>);

    impl Bus for FlatBus {
        fn get<T: RwType>(&mut self, addr: u32) -> T {
            let addr = addr.us() % self.0.len();
            let mut value = 0u64;
            for i in 0..T::WIDTH.us() {
                value |= (self.0[addr + i] as u64) << (8 * i);
            }
            T::from_u64(value)
        }

        fn set<T: RwType>(&mut self, addr: u32, value: T) {
            let addr = addr.us() % self.0.len();
            let value = value.u64();
            for i in 0..T::WIDTH.us() {
                self.0[addr + i] = (value >> (8 * i)) as u8;
            }
        }

        fn call_svc(&mut self, _cpu: &mut CpuState, _comment: u32) {}
    }

    fn cpu_with_words(words: &[(u32, u32)]) -> Cpu<FlatBus> {
        let mut bus = FlatBus(vec![0; 16 * 1024]);
        for (addr, word) in words {
            bus.set::<u32>(*addr, *word);
        }
        Cpu::new(bus)
    }

    fn headers(cpu: &Cpu<FlatBus>, mut at: usize) -> Vec<(Op, u8, u8)> {
        let mut out = Vec::new();
        loop {
            let header = cpu.cache.arena.header(at);
            let op = num_traits::FromPrimitive::from_u16(header.tag).unwrap();
            out.push((op, header.flow, header.size));
            if header.flow & flow::NON_BRANCH == 0 {
                return out;
            }
            at += record_len(header.tag);
        }
    }

    #[test]
    fn block_ends_at_branch() {
        let mut cpu = cpu_with_words(&[
            (0x100, 0xE1A0_0001), // mov r0, r1
            (0x104, 0xE092_0003), // adds r2, r2, r3
            (0x108, 0xEAFF_FFFE), // b .
            (0x10C, 0xE1A0_0000), // never reached
        ]);
        let start = cpu.build_block(0x100);

        let records = headers(&cpu, start);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].0, Op::Mov);
        assert_eq!(records[1].0, Op::Add);
        assert_eq!(records[2].0, Op::Bbl);
        assert_eq!(records[2].1, flow::DIRECT_BRANCH);
        assert!(records.iter().all(|r| r.2 == 4));
        assert_eq!(cpu.cache.lookup(0x100), Some(start));
    }

    #[test]
    fn block_ends_at_page_boundary() {
        let mut cpu = cpu_with_words(&[
            (0xFF8, 0xE1A0_0001),
            (0xFFC, 0xE1A0_0002),
            (0x1000, 0xE1A0_0003),
        ]);
        let start = cpu.build_block(0xFF8);

        let records = headers(&cpu, start);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].1, flow::END_OF_PAGE);
    }

    #[test]
    fn blocks_are_cached_and_reused() {
        let mut cpu = cpu_with_words(&[(0x100, 0xEAFF_FFFE)]);
        let first = cpu.build_block(0x100);
        let top = cpu.cache.arena.top();
        assert_eq!(cpu.cache.lookup(0x100), Some(first));

        // A second entry gets its own records; the first is untouched.
        cpu.bus.set::<u32>(0x200, 0xEAFF_FFFE);
        let second = cpu.build_block(0x200);
        assert_eq!(second, top);
        assert_eq!(cpu.cache.lookup(0x100), Some(first));
    }

    #[test]
    fn thumb_records_are_halfword_sized() {
        let mut cpu = cpu_with_words(&[]);
        cpu.bus.set::<u16>(0x100, 0x2307); // movs r3, #7
        cpu.bus.set::<u16>(0x102, 0x1889); // adds r1, r1, r2
        cpu.bus.set::<u16>(0x104, 0xE7FE); // b .
        cpu.state.t = true;

        let start = cpu.build_block(0x100);
        let records = headers(&cpu, start);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].0, Op::Mov);
        assert_eq!(records[1].0, Op::Add);
        assert_eq!(records[2].0, Op::ThumbB);
        assert!(records.iter().all(|r| r.2 == 2));
        assert!(records.iter().all(|r| r.1 & flow::THUMB != 0));
    }

    #[test]
    fn conditional_branch_flow_is_marked() {
        let mut cpu = cpu_with_words(&[(0x100, 0x0AFF_FFFE)]); // beq .
        let start = cpu.build_block(0x100);
        let records = headers(&cpu, start);
        assert_eq!(records[0].1, flow::DIRECT_BRANCH | flow::COND);
    }

    #[test]
    #[should_panic(expected = "undecodable")]
    fn classification_failure_is_fatal() {
        // NV-space data processing is undefined.
        let mut cpu = cpu_with_words(&[(0x100, 0xF092_0001)]);
        cpu.build_block(0x100);
    }
}
