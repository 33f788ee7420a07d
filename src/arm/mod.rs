// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! ARM instruction representation: the operation tag set, flow metadata
//! and the payload types stored behind record headers.

pub mod classify;
pub mod translate;

use num_derive::FromPrimitive;

use crate::{
    arena::Payload,
    numutil::NumExt,
    state::CpuState,
};

/// A raw 32-bit ARM instruction word.
#[derive(Copy, Clone)]
pub struct ArmInst(pub u32);

impl ArmInst {
    /// 4-bit register field starting at the given bit.
    #[inline]
    pub fn reg(self, idx: u32) -> u32 {
        self.0.bits(idx, 4)
    }

    #[inline]
    pub fn bits(self, start: u32, len: u32) -> u32 {
        self.0.bits(start, len)
    }

    #[inline]
    pub fn is_bit(self, bit: u16) -> bool {
        self.0.is_bit(bit)
    }

    #[inline]
    pub fn cond(self) -> u32 {
        self.0 >> 28
    }
}

/// Flow bits of a record. Orthogonal; a block ends at any record whose
/// flow does not include [flow::NON_BRANCH].
pub mod flow {
    pub const COND: u8 = 1 << 0;
    pub const NON_BRANCH: u8 = 1 << 1;
    pub const DIRECT_BRANCH: u8 = 1 << 2;
    pub const INDIRECT_BRANCH: u8 = 1 << 3;
    pub const CALL: u8 = 1 << 4;
    pub const RET: u8 = 1 << 5;
    pub const END_OF_PAGE: u8 = 1 << 6;
    pub const THUMB: u8 = 1 << 7;
}

/// Operation tags. One per semantic handler; the data-processing tags
/// keep their ARM opcode values so the classifier can map them directly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u16)]
pub enum Op {
    // Data processing, discriminants = ARM opcode field
    And = 0,
    Eor = 1,
    Sub = 2,
    Rsb = 3,
    Add = 4,
    Adc = 5,
    Sbc = 6,
    Rsc = 7,
    Tst = 8,
    Teq = 9,
    Cmp = 10,
    Cmn = 11,
    Orr = 12,
    Mov = 13,
    Bic = 14,
    Mvn = 15,

    // Branches
    Bbl,
    Bx,
    Bxj,
    BlxReg,
    BlxImm,

    // Multiplies
    Mul,
    Mla,
    Umaal,
    Umull,
    Umlal,
    Smull,
    Smlal,
    SmlaXy,
    SmlalXy,
    SmulXy,
    SmlawY,
    SmulwY,
    Smlad,
    Smlsd,
    Smuad,
    Smusd,
    Smlald,
    Smlsld,
    Smmla,
    Smmls,
    Smmul,
    Usad8,
    Usada8,

    // Saturating arithmetic
    Qadd,
    Qsub,
    Qdadd,
    Qdsub,
    Ssat,
    Ssat16,
    Usat,
    Usat16,

    // Parallel add/subtract, signed wrapping
    Sadd8,
    Sadd16,
    Sasx,
    Ssax,
    Ssub8,
    Ssub16,
    // unsigned wrapping
    Uadd8,
    Uadd16,
    Uasx,
    Usax,
    Usub8,
    Usub16,
    // signed saturating
    Qadd8,
    Qadd16,
    Qasx,
    Qsax,
    Qsub8,
    Qsub16,
    // unsigned saturating
    Uqadd8,
    Uqadd16,
    Uqasx,
    Uqsax,
    Uqsub8,
    Uqsub16,
    // signed halving
    Shadd8,
    Shadd16,
    Shasx,
    Shsax,
    Shsub8,
    Shsub16,
    // unsigned halving
    Uhadd8,
    Uhadd16,
    Uhasx,
    Uhsax,
    Uhsub8,
    Uhsub16,

    // Byte selection, packing, bit twiddling
    Sel,
    Clz,
    Rev,
    Rev16,
    Revsh,
    Pkhbt,
    Pkhtb,

    // Extend (and accumulate) family
    Sxtb,
    Sxth,
    Sxtb16,
    Uxtb,
    Uxth,
    Uxtb16,
    Sxtab,
    Sxtah,
    Sxtab16,
    Uxtab,
    Uxtah,
    Uxtab16,

    // Loads and stores
    Ldr,
    Ldrb,
    Ldrh,
    Ldrsb,
    Ldrsh,
    Ldrd,
    Str,
    Strb,
    Strh,
    Strd,
    Ldrt,
    Ldrbt,
    Strt,
    Strbt,
    Ldm,
    Stm,
    Srs,
    Rfe,

    // Synchronization
    Ldrex,
    Ldrexb,
    Ldrexh,
    Ldrexd,
    Strex,
    Strexb,
    Strexh,
    Strexd,
    Clrex,
    Swp,
    Swpb,

    // Status transfer
    Mrs,
    Msr,
    Cps,
    Setend,

    // Coprocessor
    Mrc,
    Mcr,
    Mrrc,
    Mcrr,
    Cdp,
    Ldc,
    Stc,

    // Hints and traps
    Nop,
    Yield,
    Wfe,
    Wfi,
    Sev,
    Pld,
    Bkpt,
    Swi,

    // Thumb branches, special-cased by the expander
    ThumbB,
    ThumbBCond,
    ThumbBlPrefix,
    ThumbBlSuffix,
    ThumbBlxSuffix,
}

/// Computes a data-processing shifter operand from the stored 12-bit
/// field, leaving the shifter carry in [CpuState::shifter_carry].
pub type ShiftFn = fn(&mut CpuState, u32) -> u32;

/// Computes the effective address of a load/store from the raw word,
/// performing any base-register writeback as a side effect.
pub type AddrFn = fn(&mut CpuState, u32) -> u32;

/// Data-processing operands.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Alu {
    pub shift: ShiftFn,
    pub operand: u32,
    pub rn: u8,
    pub rd: u8,
    pub s: bool,
}

/// Load/store operands: the raw word plus the selected addressing mode.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct LdSt {
    pub addr: AddrFn,
    pub inst: u32,
}

/// MUL/MLA. `rn` is the accumulator, unused by MUL.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Mul {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub rs: u8,
    pub s: bool,
}

/// 64-bit multiplies.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct MulLong {
    pub rdhi: u8,
    pub rdlo: u8,
    pub rm: u8,
    pub rs: u8,
    pub s: bool,
}

/// 16x16 and 32x16 multiplies with selectable halves. For SMLAL<x><y>,
/// `rd`/`rn` are RdHi/RdLo.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct HalfMul {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub rs: u8,
    pub x: bool,
    pub y: bool,
}

/// Dual-16 and most-significant-word multiplies. `m` is the Rm-swap
/// (or rounding) bit; `ra` of 15 means no accumulate.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct DspMul {
    pub rd: u8,
    pub ra: u8,
    pub rm: u8,
    pub rn: u8,
    pub m: bool,
}

/// SMLALD/SMLSLD.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct DspMulLong {
    pub rdhi: u8,
    pub rdlo: u8,
    pub rm: u8,
    pub rn: u8,
    pub m: bool,
}

/// Three-register operations: parallel add/sub, saturating arithmetic,
/// SEL, CLZ and the REV family (which ignore `rn`), and the exclusive /
/// swap memory operations.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Media {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
}

/// USAD8/USADA8. `ra` of 15 means plain USAD8.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct MediaAcc {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub ra: u8,
}

/// SSAT/USAT and their 16-bit forms.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Sat {
    pub rd: u8,
    pub rn: u8,
    pub sat_imm: u8,
    pub shift_type: u8,
    pub imm5: u8,
}

/// SXT*/UXT* with optional accumulator; `rn` of 15 means no accumulate.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Extend {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub rotate: u8,
}

/// PKHBT/PKHTB.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Pkh {
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub imm: u8,
}

/// B/BL with the offset already sign-extended and scaled.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Branch {
    pub offset: i32,
    pub link: bool,
}

/// BX/BXJ/BLX (register).
#[derive(Copy, Clone)]
#[repr(C)]
pub struct BranchExchange {
    pub rm: u8,
    pub link: bool,
}

/// BLX (immediate); `h` is the halfword bit added to the target.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct BlxImm {
    pub offset: i32,
    pub h: bool,
}

/// MRS.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Mrs {
    pub rd: u8,
    pub spsr: bool,
}

/// MSR; operand and field mask are decoded from the raw word.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Msr {
    pub inst: u32,
    pub spsr: bool,
}

/// MRC/MCR.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct CpReg {
    pub rd: u8,
    pub crn: u8,
    pub crm: u8,
    pub op1: u8,
    pub op2: u8,
    pub cp_num: u8,
}

/// MCRR/MRRC.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct CpPair {
    pub rt: u8,
    pub rt2: u8,
    pub crm: u8,
    pub op1: u8,
    pub cp_num: u8,
}

/// SWI and BKPT comment fields.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Imm24 {
    pub imm: u32,
}

/// CPS. `imod` holds bits 19:18 (apply/value).
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Cps {
    pub imod: u8,
    pub mmod: bool,
    pub a: bool,
    pub i: bool,
    pub f: bool,
    pub mode: u8,
}

/// SETEND.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct SetEnd {
    pub big: bool,
}

/// The five special-cased Thumb branches. `cond` is only meaningful for
/// the conditional form.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct ThumbBranch {
    pub offset: i32,
    pub cond: u8,
}

/// Raw word of a record owned by the VFP dispatcher.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct VfpWord {
    pub word: u32,
}

impl Payload for Alu {}
impl Payload for LdSt {}
impl Payload for Mul {}
impl Payload for MulLong {}
impl Payload for HalfMul {}
impl Payload for DspMul {}
impl Payload for DspMulLong {}
impl Payload for Media {}
impl Payload for MediaAcc {}
impl Payload for Sat {}
impl Payload for Extend {}
impl Payload for Pkh {}
impl Payload for Branch {}
impl Payload for BranchExchange {}
impl Payload for BlxImm {}
impl Payload for Mrs {}
impl Payload for Msr {}
impl Payload for CpReg {}
impl Payload for CpPair {}
impl Payload for Imm24 {}
impl Payload for Cps {}
impl Payload for SetEnd {}
impl Payload for ThumbBranch {}
impl Payload for VfpWord {}
