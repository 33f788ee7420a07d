// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! CP15 system-control coprocessor register file, covering the ARM11
//! MPCore registers guests actually touch. Cache, barrier and TLB
//! maintenance operations are accepted and discarded; this core performs
//! no address translation.

/// Main ID register: ARM11 MPCore.
const MIDR: u32 = 0x410F_B024;
/// Cache type register value reported by the MPCore.
const CTR: u32 = 0x1D15_2152;
/// Reset value of the control register: U-bit set, caches off.
const SCTLR_RESET: u32 = 0x0005_0078;

#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cp15 {
    pub control: u32,
    pub aux_control: u32,
    pub coproc_access: u32,

    pub ttbr0: u32,
    pub ttbr1: u32,
    pub ttb_control: u32,
    pub domain_access: u32,

    pub data_fault_status: u32,
    pub inst_fault_status: u32,
    pub fault_address: u32,
    pub watch_fault_address: u32,

    pub thread_uprw: u32,
    pub thread_upro: u32,
    pub thread_prw: u32,
}

impl Default for Cp15 {
    fn default() -> Self {
        Self {
            control: SCTLR_RESET,
            aux_control: 0xF,
            coproc_access: 0,
            ttbr0: 0,
            ttbr1: 0,
            ttb_control: 0,
            domain_access: 0,
            data_fault_status: 0,
            inst_fault_status: 0,
            fault_address: 0,
            watch_fault_address: 0,
            thread_uprw: 0,
            thread_upro: 0,
            thread_prw: 0,
        }
    }
}

impl Cp15 {
    pub fn read(&self, crn: u32, op1: u32, crm: u32, op2: u32) -> u32 {
        match (crn, op1, crm, op2) {
            (0, 0, 0, 0) => MIDR,
            (0, 0, 0, 1) => CTR,

            (1, 0, 0, 0) => self.control,
            (1, 0, 0, 1) => self.aux_control,
            (1, 0, 0, 2) => self.coproc_access,

            (2, 0, 0, 0) => self.ttbr0,
            (2, 0, 0, 1) => self.ttbr1,
            (2, 0, 0, 2) => self.ttb_control,
            (3, 0, 0, 0) => self.domain_access,

            (5, 0, 0, 0) => self.data_fault_status,
            (5, 0, 0, 1) => self.inst_fault_status,
            (6, 0, 0, 0) => self.fault_address,
            (6, 0, 0, 1) => self.watch_fault_address,

            // Cache/barrier maintenance space; reads are UNPREDICTABLE,
            // return 0 like the hardware's RAZ behavior.
            (7, ..) => 0,

            (13, 0, 0, 2) => self.thread_uprw,
            (13, 0, 0, 3) => self.thread_upro,
            (13, 0, 0, 4) => self.thread_prw,

            _ => {
                log::warn!("CP15 read of unimplemented register c{crn}, {op1}, c{crm}, {op2}");
                0
            }
        }
    }

    pub fn write(&mut self, value: u32, crn: u32, op1: u32, crm: u32, op2: u32) {
        match (crn, op1, crm, op2) {
            (1, 0, 0, 0) => self.control = value,
            (1, 0, 0, 1) => self.aux_control = value,
            (1, 0, 0, 2) => self.coproc_access = value,

            (2, 0, 0, 0) => self.ttbr0 = value,
            (2, 0, 0, 1) => self.ttbr1 = value,
            (2, 0, 0, 2) => self.ttb_control = value,
            (3, 0, 0, 0) => self.domain_access = value,

            (5, 0, 0, 0) => self.data_fault_status = value,
            (5, 0, 0, 1) => self.inst_fault_status = value,
            (6, 0, 0, 0) => self.fault_address = value,
            (6, 0, 0, 1) => self.watch_fault_address = value,

            // Cache, barrier and TLB maintenance: accepted, nothing to do.
            (7, ..) | (8, ..) => (),

            (13, 0, 0, 2) => self.thread_uprw = value,
            (13, 0, 0, 3) => self.thread_upro = value,
            (13, 0, 0, 4) => self.thread_prw = value,

            _ => {
                log::warn!(
                    "CP15 write of {value:08X} to unimplemented register c{crn}, {op1}, c{crm}, {op2}"
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn id_registers_are_readonly() {
        let mut cp = Cp15::default();
        assert_eq!(cp.read(0, 0, 0, 0), MIDR);
        cp.write(0xDEAD_BEEF, 0, 0, 0, 0);
        assert_eq!(cp.read(0, 0, 0, 0), MIDR);
    }

    #[test]
    fn thread_id_roundtrip() {
        let mut cp = Cp15::default();
        cp.write(0x1234, 13, 0, 0, 2);
        cp.write(0xCAFE, 13, 0, 0, 3);
        assert_eq!(cp.read(13, 0, 0, 2), 0x1234);
        assert_eq!(cp.read(13, 0, 0, 3), 0xCAFE);
    }

    #[test]
    fn maintenance_space_is_ignored() {
        let mut cp = Cp15::default();
        cp.write(1, 7, 0, 10, 4); // DSB
        cp.write(1, 8, 0, 7, 0); // invalidate TLBs
        assert_eq!(cp.read(7, 0, 10, 4), 0);
    }
}
