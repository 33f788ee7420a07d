// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! An ARMv6K (ARM11 MPCore) interpreter core.
//!
//! Guest instructions are pre-decoded into compact records cached per
//! basic block, then executed by a threaded dispatch loop with
//! bit-accurate flag, saturation and exclusive-access semantics. The
//! host supplies guest memory and the supervisor-call handler through
//! [Bus]; see `interface.rs`.

mod arena;
pub mod arm;
mod cp15;
pub mod exec;
pub mod interface;
pub mod numutil;
pub mod state;
pub mod thumb;

pub use crate::{
    cp15::Cp15,
    exec::Step,
    interface::{Bus, NullVfp, RwType, VfpDispatch, VFP_TAG},
    state::{CpuState, Flag, Mode},
};

use crate::arena::BlockCache;

/// One guest CPU: architectural state, its bus, the VFP seam, and the
/// pre-decoded block cache.
pub struct Cpu<S: Bus, V: VfpDispatch<S> = NullVfp> {
    pub state: CpuState,
    pub bus: S,
    pub vfp: V,
    pub(crate) cache: BlockCache,
}

impl<S: Bus, V: VfpDispatch<S>> Cpu<S, V> {
    pub fn new(bus: S) -> Self {
        Self {
            state: CpuState::default(),
            bus,
            vfp: V::default(),
            cache: BlockCache::new(),
        }
    }

    /// Throw away every cached block. Blocks are never invalidated
    /// individually, so hosts running self-modifying guest code must call
    /// this after writes to code pages.
    pub fn invalidate_blocks(&mut self) {
        self.cache.reset();
    }
}
