// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! The ARM classifier: maps a raw 32-bit word to its operation tag.
//!
//! The match is order-sensitive. The unconditional space is peeled off
//! first, then within the 000 space the multiply/sync/transfer encodings
//! (bit 7 and bit 4 set) and the miscellaneous space (S clear, opcode
//! 10xx) take priority over plain data processing. Arms further down only
//! see words the earlier arms rejected.

use bitmatch::bitmatch;
use num_traits::FromPrimitive;

use super::Op;
use crate::numutil::NumExt;

/// Classify one ARM word. `None` means the encoding is undefined or
/// unsupported; the translator treats that as fatal.
#[bitmatch]
pub fn classify(word: u32) -> Option<Op> {
    #[bitmatch]
    match word {
        // ---- Unconditional space ------------------------------------
        "1111_0001_0000_???0_????_????_????_????" => Some(Op::Cps),
        "1111_0001_0000_0001_????_????_????_????" => Some(Op::Setend),
        "1111_01?1_?101_????_1111_????_????_????" => Some(Op::Pld),
        "1111_0101_0111_1111_1111_0000_0001_1111" => Some(Op::Clrex),
        "1111_100?_?1?0_1101_????_????_????_????" => Some(Op::Srs),
        "1111_100?_?0?1_????_????_????_????_????" => Some(Op::Rfe),
        "1111_101?_????_????_????_????_????_????" => Some(Op::BlxImm),
        // Everything else with cond = NV is undefined.
        "1111_????_????_????_????_????_????_????" => None,

        // ---- 000 space: multiplies ----------------------------------
        "????_0000_000?_????_????_????_1001_????" => Some(Op::Mul),
        "????_0000_001?_????_????_????_1001_????" => Some(Op::Mla),
        "????_0000_0100_????_????_????_1001_????" => Some(Op::Umaal),
        "????_0000_100?_????_????_????_1001_????" => Some(Op::Umull),
        "????_0000_101?_????_????_????_1001_????" => Some(Op::Umlal),
        "????_0000_110?_????_????_????_1001_????" => Some(Op::Smull),
        "????_0000_111?_????_????_????_1001_????" => Some(Op::Smlal),

        // ---- 000 space: swap and exclusive access -------------------
        "????_0001_0000_????_????_????_1001_????" => Some(Op::Swp),
        "????_0001_0100_????_????_????_1001_????" => Some(Op::Swpb),
        "????_0001_1000_????_????_????_1001_????" => Some(Op::Strex),
        "????_0001_1001_????_????_????_1001_????" => Some(Op::Ldrex),
        "????_0001_1010_????_????_????_1001_????" => Some(Op::Strexd),
        "????_0001_1011_????_????_????_1001_????" => Some(Op::Ldrexd),
        "????_0001_1100_????_????_????_1001_????" => Some(Op::Strexb),
        "????_0001_1101_????_????_????_1001_????" => Some(Op::Ldrexb),
        "????_0001_1110_????_????_????_1001_????" => Some(Op::Strexh),
        "????_0001_1111_????_????_????_1001_????" => Some(Op::Ldrexh),

        // ---- 000 space: halfword/signed/doubleword transfers --------
        "????_000?_???1_????_????_????_1011_????" => Some(Op::Ldrh),
        "????_000?_???0_????_????_????_1011_????" => Some(Op::Strh),
        "????_000?_???1_????_????_????_1101_????" => Some(Op::Ldrsb),
        "????_000?_???0_????_????_????_1101_????" => Some(Op::Ldrd),
        "????_000?_???1_????_????_????_1111_????" => Some(Op::Ldrsh),
        "????_000?_???0_????_????_????_1111_????" => Some(Op::Strd),

        // ---- 000 space: miscellaneous (S clear, opcode 10xx) --------
        "????_0001_0?00_1111_????_0000_0000_0000" => Some(Op::Mrs),
        "????_0001_0?10_????_1111_0000_0000_????" => Some(Op::Msr),
        "????_0001_0010_1111_1111_1111_0001_????" => Some(Op::Bx),
        "????_0001_0010_1111_1111_1111_0010_????" => Some(Op::Bxj),
        "????_0001_0010_1111_1111_1111_0011_????" => Some(Op::BlxReg),
        "????_0001_0110_1111_????_1111_0001_????" => Some(Op::Clz),
        "1110_0001_0010_????_????_????_0111_????" => Some(Op::Bkpt),
        "????_0001_0oo0_????_????_????_0101_????" => match o {
            0 => Some(Op::Qadd),
            1 => Some(Op::Qsub),
            2 => Some(Op::Qdadd),
            _ => Some(Op::Qdsub),
        },
        "????_0001_0000_????_????_????_1??0_????" => Some(Op::SmlaXy),
        "????_0001_0010_????_????_????_1?00_????" => Some(Op::SmlawY),
        "????_0001_0010_????_????_????_1?10_????" => Some(Op::SmulwY),
        "????_0001_0100_????_????_????_1??0_????" => Some(Op::SmlalXy),
        "????_0001_0110_????_????_????_1??0_????" => Some(Op::SmulXy),
        // Remaining S-clear opcode-10xx encodings are undefined.
        "????_0001_0??0_????_????_????_????_????" => None,

        // ---- 000/001 space: data processing -------------------------
        "????_000o_ooo?_????_????_????_???0_????" => Op::from_u32(o),
        "????_000o_ooo?_????_????_????_0??1_????" => Op::from_u32(o),
        // v6K hints live in the would-be MSR immediate space with an
        // all-zero field mask.
        "????_0011_0010_0000_1111_0000_0000_0000" => Some(Op::Nop),
        "????_0011_0010_0000_1111_0000_0000_0001" => Some(Op::Yield),
        "????_0011_0010_0000_1111_0000_0000_0010" => Some(Op::Wfe),
        "????_0011_0010_0000_1111_0000_0000_0011" => Some(Op::Wfi),
        "????_0011_0010_0000_1111_0000_0000_0100" => Some(Op::Sev),
        "????_0011_0?10_????_1111_????_????_????" => Some(Op::Msr),
        "????_0011_0?00_????_????_????_????_????" => None,
        "????_001o_ooo?_????_????_????_????_????" => Op::from_u32(o),

        // ---- 010/011 space: word/byte loads and stores --------------
        // Translation-forced forms (post-indexed, W set) come first.
        "????_0100_?111_????_????_????_????_????" => Some(Op::Ldrbt),
        "????_0100_?110_????_????_????_????_????" => Some(Op::Strbt),
        "????_0100_?011_????_????_????_????_????" => Some(Op::Ldrt),
        "????_0100_?010_????_????_????_????_????" => Some(Op::Strt),
        "????_010?_?1?1_????_????_????_????_????" => Some(Op::Ldrb),
        "????_010?_?1?0_????_????_????_????_????" => Some(Op::Strb),
        "????_010?_?0?1_????_????_????_????_????" => Some(Op::Ldr),
        "????_010?_?0?0_????_????_????_????_????" => Some(Op::Str),
        "????_0110_?111_????_????_????_???0_????" => Some(Op::Ldrbt),
        "????_0110_?110_????_????_????_???0_????" => Some(Op::Strbt),
        // The chip does not implement the scaled-register LDRT/STRT (T2)
        // variant; only the plain register form is accepted.
        "????_0110_?011_????_????_0000_0000_????" => Some(Op::Ldrt),
        "????_0110_?010_????_????_0000_0000_????" => Some(Op::Strt),
        "????_0110_?011_????_????_????_???0_????" => None,
        "????_0110_?010_????_????_????_???0_????" => None,
        "????_011?_?1?1_????_????_????_???0_????" => Some(Op::Ldrb),
        "????_011?_?1?0_????_????_????_???0_????" => Some(Op::Strb),
        "????_011?_?0?1_????_????_????_???0_????" => Some(Op::Ldr),
        "????_011?_?0?0_????_????_????_???0_????" => Some(Op::Str),

        // ---- 011 space with bit 4 set: media ------------------------
        "????_0110_0ppp_????_????_????_ooo1_????" => parallel_add_sub(p, o),
        "????_0110_1000_????_????_1111_1011_????" => Some(Op::Sel),
        "????_0110_1000_????_????_????_?t01_????" => {
            Some(if t == 0 { Op::Pkhbt } else { Op::Pkhtb })
        }
        "????_0110_1010_????_????_1111_0011_????" => Some(Op::Ssat16),
        "????_0110_101?_????_????_????_??01_????" => Some(Op::Ssat),
        "????_0110_1110_????_????_1111_0011_????" => Some(Op::Usat16),
        "????_0110_1011_????_????_1111_0011_????" => Some(Op::Rev),
        "????_0110_1011_????_????_1111_1011_????" => Some(Op::Rev16),
        "????_0110_1111_????_????_1111_1011_????" => Some(Op::Revsh),
        "????_0110_111?_????_????_????_??01_????" => Some(Op::Usat),
        "????_0110_1ttt_nnnn_????_??00_0111_????" => extend(t, n),
        "????_0111_0000_????_aaaa_????_00?1_????" => {
            Some(if a == 15 { Op::Smuad } else { Op::Smlad })
        }
        "????_0111_0000_????_aaaa_????_01?1_????" => {
            Some(if a == 15 { Op::Smusd } else { Op::Smlsd })
        }
        "????_0111_0100_????_????_????_00?1_????" => Some(Op::Smlald),
        "????_0111_0100_????_????_????_01?1_????" => Some(Op::Smlsld),
        "????_0111_0101_????_aaaa_????_00?1_????" => {
            Some(if a == 15 { Op::Smmul } else { Op::Smmla })
        }
        "????_0111_0101_????_????_????_11?1_????" => Some(Op::Smmls),
        "????_0111_1000_????_aaaa_????_0001_????" => {
            Some(if a == 15 { Op::Usad8 } else { Op::Usada8 })
        }

        // ---- 100/101 space: block transfers and branches ------------
        "????_100?_???1_????_????_????_????_????" => Some(Op::Ldm),
        "????_100?_???0_????_????_????_????_????" => Some(Op::Stm),
        "????_101?_????_????_????_????_????_????" => Some(Op::Bbl),

        // ---- 110/111 space: coprocessor and SWI ---------------------
        "????_1100_0100_????_????_????_????_????" => Some(Op::Mcrr),
        "????_1100_0101_????_????_????_????_????" => Some(Op::Mrrc),
        "????_110?_???1_????_????_????_????_????" => Some(Op::Ldc),
        "????_110?_???0_????_????_????_????_????" => Some(Op::Stc),
        "????_1110_???0_????_????_????_???1_????" => Some(Op::Mcr),
        "????_1110_???1_????_????_????_???1_????" => Some(Op::Mrc),
        "????_1110_????_????_????_????_???0_????" => Some(Op::Cdp),
        "????_1111_????_????_????_????_????_????" => Some(Op::Swi),

        _ => None,
    }
}

/// The parallel add/subtract block: prefix bits 22-20 select the
/// saturation family, bits 7-5 the lane operation.
fn parallel_add_sub(prefix: u32, op: u32) -> Option<Op> {
    let fam = match prefix {
        0b001 => family(Op::Sadd16, Op::Sasx, Op::Ssax, Op::Ssub16, Op::Sadd8, Op::Ssub8),
        0b010 => family(Op::Qadd16, Op::Qasx, Op::Qsax, Op::Qsub16, Op::Qadd8, Op::Qsub8),
        0b011 => family(Op::Shadd16, Op::Shasx, Op::Shsax, Op::Shsub16, Op::Shadd8, Op::Shsub8),
        0b101 => family(Op::Uadd16, Op::Uasx, Op::Usax, Op::Usub16, Op::Uadd8, Op::Usub8),
        0b110 => family(Op::Uqadd16, Op::Uqasx, Op::Uqsax, Op::Uqsub16, Op::Uqadd8, Op::Uqsub8),
        0b111 => family(Op::Uhadd16, Op::Uhasx, Op::Uhsax, Op::Uhsub16, Op::Uhadd8, Op::Uhsub8),
        _ => return None,
    };
    fam[op.us()]
}

const fn family(a16: Op, asx: Op, sax: Op, s16: Op, a8: Op, s8: Op) -> [Option<Op>; 8] {
    [
        Some(a16),
        Some(asx),
        Some(sax),
        Some(s16),
        Some(a8),
        None,
        None,
        Some(s8),
    ]
}

/// The extend block: bits 22-20 select the width, Rn of 15 the
/// non-accumulating form.
fn extend(ttt: u32, rn: u32) -> Option<Op> {
    let plain = rn == 15;
    match ttt {
        0b000 if plain => Some(Op::Sxtb16),
        0b000 => Some(Op::Sxtab16),
        0b010 if plain => Some(Op::Sxtb),
        0b010 => Some(Op::Sxtab),
        0b011 if plain => Some(Op::Sxth),
        0b011 => Some(Op::Sxtah),
        0b100 if plain => Some(Op::Uxtb16),
        0b100 => Some(Op::Uxtab16),
        0b110 if plain => Some(Op::Uxtb),
        0b110 => Some(Op::Uxtab),
        0b111 if plain => Some(Op::Uxth),
        0b111 => Some(Op::Uxtah),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tag(word: u32) -> Op {
        classify(word).unwrap_or_else(|| panic!("{word:08X} did not classify"))
    }

    #[test]
    fn data_processing() {
        assert_eq!(tag(0xE092_0001), Op::Add); // adds r2, r2, r1
        assert_eq!(tag(0xE1B0_2001), Op::Mov); // movs r2, r1
        assert_eq!(tag(0xE152_0003), Op::Cmp); // cmp r2, r3
        assert_eq!(tag(0xE213_0001), Op::And); // ands r0, r3, #1
        assert_eq!(tag(0xE1E0_0000), Op::Mvn); // mvn r0, r0
        assert_eq!(tag(0xE012_0113), Op::And); // ands r0, r2, r3, lsl r1
    }

    #[test]
    fn branches() {
        assert_eq!(tag(0xEA00_0010), Op::Bbl); // b
        assert_eq!(tag(0xEB00_0010), Op::Bbl); // bl
        assert_eq!(tag(0xE12F_FF11), Op::Bx); // bx r1
        assert_eq!(tag(0xE12F_FF21), Op::Bxj); // bxj r1
        assert_eq!(tag(0xE12F_FF31), Op::BlxReg); // blx r1
        assert_eq!(tag(0xFA00_0001), Op::BlxImm); // blx #
        assert_eq!(tag(0xEF00_0042), Op::Swi); // swi 0x42
    }

    #[test]
    fn multiplies() {
        assert_eq!(tag(0xE001_0392), Op::Mul); // mul r1, r2, r3
        assert_eq!(tag(0xE021_4392), Op::Mla); // mla r1, r2, r3, r4
        assert_eq!(tag(0xE041_0392), Op::Umaal);
        assert_eq!(tag(0xE081_0392), Op::Umull);
        assert_eq!(tag(0xE0E1_0392), Op::Smlal);
        assert_eq!(tag(0xE101_8382), Op::SmlaXy); // smlabb
        assert_eq!(tag(0xE161_0382), Op::SmulXy); // smulbb
        assert_eq!(tag(0xE701_F312), Op::Smuad); // smuad r1, r2, r3
        assert_eq!(tag(0xE701_4312), Op::Smlad); // smlad r1, r2, r3, r4
        assert_eq!(tag(0xE751_F312), Op::Smmul);
    }

    #[test]
    fn loads_and_stores() {
        assert_eq!(tag(0xE591_2004), Op::Ldr); // ldr r2, [r1, #4]
        assert_eq!(tag(0xE581_2004), Op::Str);
        assert_eq!(tag(0xE5D1_2004), Op::Ldrb);
        assert_eq!(tag(0xE1D1_20B4), Op::Ldrh); // ldrh r2, [r1, #4]
        assert_eq!(tag(0xE1C1_20B4), Op::Strh);
        assert_eq!(tag(0xE1D1_20D4), Op::Ldrsb);
        assert_eq!(tag(0xE1D1_20F4), Op::Ldrsh);
        assert_eq!(tag(0xE1C1_20D4), Op::Ldrd);
        assert_eq!(tag(0xE1C1_20F4), Op::Strd);
        assert_eq!(tag(0xE891_0006), Op::Ldm); // ldmia r1, {r1, r2}
        assert_eq!(tag(0xE881_0006), Op::Stm);
        assert_eq!(tag(0xE4B1_2004), Op::Ldrt);
        assert_eq!(tag(0xE791_2002), Op::Ldr); // ldr r2, [r1, r2]
    }

    #[test]
    fn sync() {
        assert_eq!(tag(0xE191_2F9F), Op::Ldrex);
        assert_eq!(tag(0xE181_2F93), Op::Strex);
        assert_eq!(tag(0xE1D1_2F9F), Op::Ldrexb);
        assert_eq!(tag(0xE1F1_2F9F), Op::Ldrexh);
        assert_eq!(tag(0xE1B1_2F9F), Op::Ldrexd);
        assert_eq!(tag(0xE101_2093), Op::Swp);
        assert_eq!(tag(0xE141_2093), Op::Swpb);
        assert_eq!(tag(0xF57F_F01F), Op::Clrex);
    }

    #[test]
    fn media() {
        assert_eq!(tag(0xE611_2F93), Op::Sadd8);
        assert_eq!(tag(0xE611_2F13), Op::Sadd16);
        assert_eq!(tag(0xE651_2FF3), Op::Usub8);
        assert_eq!(tag(0xE661_2FF3), Op::Uqsub8);
        assert_eq!(tag(0xE631_2F33), Op::Shasx);
        assert_eq!(tag(0xE681_2FB3), Op::Sel);
        assert_eq!(tag(0xE6BF_2073), Op::Sxth); // sxth r2, r3
        assert_eq!(tag(0xE6B1_2073), Op::Sxtah); // sxtah r2, r1, r3
        assert_eq!(tag(0xE6EF_2073), Op::Uxtb);
        assert_eq!(tag(0xE6BF_2F33), Op::Rev); // rev r2, r3
        assert_eq!(tag(0xE6BF_2FB3), Op::Rev16);
        assert_eq!(tag(0xE6FF_2FB3), Op::Revsh);
        assert_eq!(tag(0xE16F_2F13), Op::Clz); // clz r2, r3
        assert_eq!(tag(0xE6A2_1013), Op::Ssat); // ssat r1, #3, r3
        assert_eq!(tag(0xE6A2_1F33), Op::Ssat16);
        assert_eq!(tag(0xE6E2_1013), Op::Usat);
        assert_eq!(tag(0xE682_1013), Op::Pkhbt);
        assert_eq!(tag(0xE682_1053), Op::Pkhtb);
        assert_eq!(tag(0xE781_F413), Op::Usad8);
        assert_eq!(tag(0xE781_4413), Op::Usada8);
    }

    #[test]
    fn saturating_scalar() {
        assert_eq!(tag(0xE101_2053), Op::Qadd);
        assert_eq!(tag(0xE121_2053), Op::Qsub);
        assert_eq!(tag(0xE141_2053), Op::Qdadd);
        assert_eq!(tag(0xE161_2053), Op::Qdsub);
    }

    #[test]
    fn status_and_system() {
        assert_eq!(tag(0xE10F_1000), Op::Mrs); // mrs r1, cpsr
        assert_eq!(tag(0xE14F_1000), Op::Mrs); // mrs r1, spsr
        assert_eq!(tag(0xE129_F001), Op::Msr); // msr cpsr_fc, r1
        assert_eq!(tag(0xE328_F001), Op::Msr); // msr cpsr_f, #1
        assert_eq!(tag(0xF102_001F), Op::Cps);
        assert_eq!(tag(0xF101_0200), Op::Setend);
        assert_eq!(tag(0xF5D1_F000), Op::Pld);
        assert_eq!(tag(0xE320_F000), Op::Nop);
        assert_eq!(tag(0xE320_F002), Op::Wfe);
        assert_eq!(tag(0xE320_F003), Op::Wfi);
        assert_eq!(tag(0xE120_0070), Op::Bkpt);
        assert_eq!(tag(0xEE01_1F10), Op::Mcr); // mcr p15, 0, r1, c1, c0, 0
        assert_eq!(tag(0xEE11_1F10), Op::Mrc);
        assert_eq!(tag(0xEC42_1F00), Op::Mcrr);
        assert_eq!(tag(0xEC52_1F00), Op::Mrrc);
        assert_eq!(tag(0xEE01_1F00), Op::Cdp);
        assert_eq!(tag(0xED91_1F00), Op::Ldc);
        assert_eq!(tag(0xED81_1F00), Op::Stc);
        assert_eq!(tag(0xF8CD_0503), Op::Srs);
        assert_eq!(tag(0xF8B9_0A00), Op::Rfe);
    }

    #[test]
    fn undefined_encodings() {
        // NV-space data processing
        assert_eq!(classify(0xF092_0001), None);
        // scaled-register LDRT
        assert_eq!(classify(0xE631_2102), None);
        // would-be MRS immediate
        assert_eq!(classify(0xE300_0000), None);
    }
}
