// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The multiply family: 32-bit, long, halfword-select and dual-16 DSP
//! forms.

use super::Step;
use crate::{
    arm::{DspMul, DspMulLong, HalfMul, Mul, MulLong, Op},
    interface::{Bus, VfpDispatch},
    numutil::NumExt,
    Cpu,
};

/// Pick the top or bottom halfword of a register as a signed value.
fn half(value: u32, top: bool) -> i32 {
    if top {
        (value >> 16) as u16 as i16 as i32
    } else {
        value as u16 as i16 as i32
    }
}

fn add_overflows(a: u32, b: u32) -> bool {
    (a as i32).checked_add(b as i32).is_none()
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    pub(super) fn op_mul(&mut self, op: Op, at: usize) -> Step {
        let p: Mul = self.cache.arena.payload(at);
        let rm = self.state.registers[p.rm.us()];
        let rs = self.state.registers[p.rs.us()];

        let mut result = rm.wrapping_mul(rs);
        if op == Op::Mla {
            result = result.wrapping_add(self.state.registers[p.rn.us()]);
        }
        self.state.registers[p.rd.us()] = result;

        if p.s {
            self.state.n = result.is_bit(31);
            self.state.z = result == 0;
        }
        if p.rd == 15 {
            Step::Branch
        } else {
            Step::Advance
        }
    }

    pub(super) fn op_mul_long(&mut self, op: Op, at: usize) -> Step {
        let p: MulLong = self.cache.arena.payload(at);
        let rm = self.state.registers[p.rm.us()];
        let rs = self.state.registers[p.rs.us()];
        let hi = self.state.registers[p.rdhi.us()] as u64;
        let lo = self.state.registers[p.rdlo.us()] as u64;

        let result = match op {
            Op::Umull => (rm as u64).wrapping_mul(rs as u64),
            Op::Umlal => (rm as u64)
                .wrapping_mul(rs as u64)
                .wrapping_add((hi << 32) | lo),
            // UMAAL accumulates both halves separately; it cannot
            // overflow 64 bits.
            Op::Umaal => (rm as u64)
                .wrapping_mul(rs as u64)
                .wrapping_add(lo)
                .wrapping_add(hi),
            Op::Smull => ((rm as i32 as i64).wrapping_mul(rs as i32 as i64)) as u64,
            _ => ((rm as i32 as i64).wrapping_mul(rs as i32 as i64))
                .wrapping_add(((hi << 32) | lo) as i64) as u64,
        };

        self.state.registers[p.rdhi.us()] = (result >> 32).u32();
        self.state.registers[p.rdlo.us()] = result.u32();

        if p.s {
            self.state.n = result.is_bit(63);
            self.state.z = result == 0;
        }
        Step::Advance
    }

    /// SMLA<x><y>: 16x16 multiply-accumulate, Q on accumulate overflow.
    pub(super) fn op_smla_xy(&mut self, at: usize) -> Step {
        let p: HalfMul = self.cache.arena.payload(at);
        let op1 = half(self.state.registers[p.rm.us()], p.x);
        let op2 = half(self.state.registers[p.rs.us()], p.y);
        let acc = self.state.registers[p.rn.us()];

        let product = op1.wrapping_mul(op2) as u32;
        if add_overflows(product, acc) {
            self.state.set_q();
        }
        self.state.registers[p.rd.us()] = product.wrapping_add(acc);
        Step::Advance
    }

    pub(super) fn op_smul_xy(&mut self, at: usize) -> Step {
        let p: HalfMul = self.cache.arena.payload(at);
        let op1 = half(self.state.registers[p.rm.us()], p.x);
        let op2 = half(self.state.registers[p.rs.us()], p.y);
        self.state.registers[p.rd.us()] = op1.wrapping_mul(op2) as u32;
        Step::Advance
    }

    /// SMLAL<x><y>: 16x16 product added into a 64-bit accumulator.
    /// `rd`/`rn` hold RdHi/RdLo.
    pub(super) fn op_smlal_xy(&mut self, at: usize) -> Step {
        let p: HalfMul = self.cache.arena.payload(at);
        let op1 = half(self.state.registers[p.rm.us()], p.x) as i64;
        let op2 = half(self.state.registers[p.rs.us()], p.y) as i64;

        let acc = ((self.state.registers[p.rd.us()] as u64) << 32)
            | self.state.registers[p.rn.us()] as u64;
        let result = acc.wrapping_add(op1.wrapping_mul(op2) as u64);

        self.state.registers[p.rn.us()] = result.u32();
        self.state.registers[p.rd.us()] = (result >> 32).u32();
        Step::Advance
    }

    /// The dual-16 and most-significant-word multiplies, plus the 32x16
    /// SMLAW/SMULW forms. `m` is the swap, round or top-half bit of the
    /// respective encoding.
    pub(super) fn op_dsp_mul(&mut self, op: Op, at: usize) -> Step {
        let p: DspMul = self.cache.arena.payload(at);
        let rn = self.state.registers[p.rn.us()];
        let mut rm = self.state.registers[p.rm.us()];

        match op {
            Op::SmlawY | Op::SmulwY => {
                let op2 = half(rm, p.m) as i64;
                let product = (rn as i32 as i64).wrapping_mul(op2);
                if op == Op::SmlawY {
                    let acc = self.state.registers[p.ra.us()] as i32 as i64;
                    let result = product.wrapping_add(acc << 16);
                    let rd = (result >> 16) as u32;
                    if (result >> 16) != (rd as i32 as i64) {
                        self.state.set_q();
                    }
                    self.state.registers[p.rd.us()] = rd;
                } else {
                    self.state.registers[p.rd.us()] = (product >> 16) as u32;
                }
            }
            Op::Smmla | Op::Smmls | Op::Smmul => {
                let mut result = (rn as i32 as i64).wrapping_mul(rm as i32 as i64);
                if op == Op::Smmla {
                    result =
                        result.wrapping_add((self.state.registers[p.ra.us()] as i64) << 32);
                } else if op == Op::Smmls {
                    result =
                        ((self.state.registers[p.ra.us()] as i64) << 32).wrapping_sub(result);
                }
                if p.m {
                    result = result.wrapping_add(0x8000_0000);
                }
                self.state.registers[p.rd.us()] = (result >> 32) as u32;
            }
            _ => {
                // SMLAD/SMLSD/SMUAD/SMUSD
                if p.m {
                    rm = rm.rotate_right(16);
                }
                let product1 = half(rn, false).wrapping_mul(half(rm, false)) as u32;
                let product2 = half(rn, true).wrapping_mul(half(rm, true)) as u32;

                let sum = if matches!(op, Op::Smlad | Op::Smuad) {
                    if add_overflows(product1, product2) {
                        self.state.set_q();
                    }
                    product1.wrapping_add(product2)
                } else {
                    product1.wrapping_sub(product2)
                };

                let result = if matches!(op, Op::Smlad | Op::Smlsd) {
                    let acc = self.state.registers[p.ra.us()];
                    if add_overflows(sum, acc) {
                        self.state.set_q();
                    }
                    sum.wrapping_add(acc)
                } else {
                    sum
                };
                self.state.registers[p.rd.us()] = result;
            }
        }
        Step::Advance
    }

    /// SMLALD/SMLSLD.
    pub(super) fn op_dsp_mul_long(&mut self, op: Op, at: usize) -> Step {
        let p: DspMulLong = self.cache.arena.payload(at);
        let rn = self.state.registers[p.rn.us()];
        let mut rm = self.state.registers[p.rm.us()];
        if p.m {
            rm = rm.rotate_right(16);
        }

        let product1 = half(rn, false).wrapping_mul(half(rm, false)) as i64;
        let product2 = half(rn, true).wrapping_mul(half(rm, true)) as i64;
        let dual = if op == Op::Smlald {
            product1.wrapping_add(product2)
        } else {
            product1.wrapping_sub(product2)
        };

        let acc = (((self.state.registers[p.rdhi.us()] as u64) << 32)
            | self.state.registers[p.rdlo.us()] as u64) as i64;
        let result = acc.wrapping_add(dual) as u64;

        self.state.registers[p.rdlo.us()] = result.u32();
        self.state.registers[p.rdhi.us()] = (result >> 32).u32();
        Step::Advance
    }
}
