// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Traits connecting the core to its host: guest memory, the supervisor
//! call handler, and the VFP coprocessor seam.

use crate::{exec::Step, numutil::NumExt, state::CpuState};

/// Trait for the system hosting this CPU. It provides guest memory and the
/// supervisor-call handler; everything architectural lives in [CpuState].
///
/// Addresses handed to `get`/`set` are guest-virtual; unaligned accesses are
/// handled by the implementation as its platform dictates. Values are
/// little-endian; the core swaps them itself when the guest runs
/// big-endian.
pub trait Bus: Sized + 'static {
    /// Get the value at the given memory address.
    fn get<T: RwType>(&mut self, addr: u32) -> T;
    /// Set the value at the given memory address.
    fn set<T: RwType>(&mut self, addr: u32, value: T);

    /// SWI/SVC was executed. The handler owns all register effects.
    fn call_svc(&mut self, cpu: &mut CpuState, comment: u32);
}

/// Trait for a type that the CPU can read/write memory with.
/// On this CPU it is u8, u16, u32 and u64 (LDREXD/STRD).
pub trait RwType: NumExt + 'static {}

impl RwType for u8 {}
impl RwType for u16 {}
impl RwType for u32 {}
impl RwType for u64 {}

/// Tag bit marking a record as belonging to the VFP's parallel tag set.
/// The low bits carry the VFP-local tag returned by [VfpDispatch::classify].
pub const VFP_TAG: u16 = 0x8000;

/// Seam for the vector floating-point unit. The VFP owns a parallel set of
/// operation tags; its records live in the same arena and are executed by
/// the same dispatch loop, which routes any tag carrying [VFP_TAG] here.
pub trait VfpDispatch<S: Bus>: Default + 'static {
    /// Classify a cp10/cp11 coprocessor word. `Some(tag)` claims the
    /// instruction with a VFP-local tag; `None` lets the core fall through
    /// to the generic coprocessor handling.
    fn classify(&self, word: u32) -> Option<u16>;

    /// Execute a previously claimed instruction.
    fn execute(&mut self, state: &mut CpuState, bus: &mut S, tag: u16, word: u32) -> Step;
}

/// VFP seam that claims nothing. VFP encodings then trap as undefined
/// coprocessor instructions.
#[derive(Default)]
pub struct NullVfp;

impl<S: Bus> VfpDispatch<S> for NullVfp {
    fn classify(&self, _word: u32) -> Option<u16> {
        None
    }

    fn execute(&mut self, _state: &mut CpuState, _bus: &mut S, tag: u16, word: u32) -> Step {
        log::error!("VFP record {tag:04X} ({word:08X}) reached the null VFP");
        Step::Halt
    }
}
