// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests: small guest programs on a flat in-memory bus.

use arm11_cpu::{numutil::NumExt, Bus, Cpu, CpuState, Flag, RwType};

const MEM_SIZE: usize = 16 * 1024;

struct TestBus {
    mem: Vec<u8>,
    svc_calls: Vec<u32>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            mem: vec![0; MEM_SIZE],
            svc_calls: Vec::new(),
        }
    }
}

impl Bus for TestBus {
    fn get<T: RwType>(&mut self, addr: u32) -> T {
        let addr = addr.us() % MEM_SIZE;
        let mut value = 0u64;
        for i in 0..T::WIDTH.us() {
            value |= (self.mem[addr + i] as u64) << (8 * i);
        }
        T::from_u64(value)
    }

    fn set<T: RwType>(&mut self, addr: u32, value: T) {
        let addr = addr.us() % MEM_SIZE;
        let value = value.u64();
        for i in 0..T::WIDTH.us() {
            self.mem[addr + i] = (value >> (8 * i)) as u8;
        }
    }

    fn call_svc(&mut self, _cpu: &mut CpuState, comment: u32) {
        self.svc_calls.push(comment);
    }
}

const CODE: u32 = 0x100;
/// b .
const SELF_LOOP: u32 = 0xEAFF_FFFE;

/// A CPU with the given ARM words at 0x100 (terminated by a self-loop)
/// and the PC pointing at them.
fn cpu_with(words: &[u32]) -> Cpu<TestBus> {
    let mut bus = TestBus::new();
    for (i, word) in words.iter().chain([&SELF_LOOP]).enumerate() {
        bus.set::<u32>(CODE + 4 * i as u32, *word);
    }
    let mut cpu = Cpu::new(bus);
    cpu.state.registers[15] = CODE;
    cpu
}

fn run(cpu: &mut Cpu<TestBus>, instructions: u32) -> u32 {
    cpu.state.instructions_to_execute = instructions;
    cpu.run()
}

#[test]
fn movs_lsr_32_shifter_edge() {
    // movs r0, r1, lsr #32
    let mut cpu = cpu_with(&[0xE1B0_0021]);
    cpu.state.registers[1] = 0x8000_0000;
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[0], 0);
    assert!(cpu.state.c);
    assert!(cpu.state.z);
    assert!(!cpu.state.n);
}

#[test]
fn adcs_with_carry_in() {
    // adcs r0, r1, r2
    let mut cpu = cpu_with(&[0xE0B1_0002]);
    cpu.state.registers[1] = 0xFFFF_FFFF;
    cpu.state.registers[2] = 1;
    cpu.state.c = true;
    cpu.state.save_flags();
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[0], 1);
    assert!(cpu.state.c);
    assert!(!cpu.state.z);
    assert!(!cpu.state.v);
}

#[test]
fn ldm_with_pc_switches_to_thumb() {
    // ldmia sp!, {r0, r1, pc}
    let mut cpu = cpu_with(&[0xE8BD_8003]);
    cpu.state.registers[13] = 0x200;
    cpu.bus.set::<u32>(0x200, 0x100);
    cpu.bus.set::<u32>(0x204, 0x200);
    cpu.bus.set::<u32>(0x208, 0x03);
    // Thumb landing pad at the loaded target: nop, b .
    cpu.bus.set::<u16>(0x02, 0x46C0);
    cpu.bus.set::<u16>(0x04, 0xE7FE);
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[0], 0x100);
    assert_eq!(cpu.state.registers[1], 0x200);
    assert_eq!(cpu.state.registers[15], 0x02);
    assert!(cpu.state.t);
    assert_eq!(cpu.state.registers[13], 0x200 + 12);
}

#[test]
fn uqsub8_saturates_per_lane() {
    // uqsub8 r0, r1, r2
    let mut cpu = cpu_with(&[0xE661_0FF2]);
    cpu.state.registers[1] = 0x0410_80FF;
    cpu.state.registers[2] = 0x1010_1010;
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[0], 0x0000_70EF);
}

#[test]
fn strex_succeeds_once() {
    let mut cpu = cpu_with(&[
        0xE194_0F9F, // ldrex r0, [r4]
        0xE184_1F92, // strex r1, r2, [r4]
        0xE184_1F93, // strex r1, r3, [r4]
    ]);
    cpu.state.registers[4] = 0x200;
    cpu.state.registers[2] = 0xAA;
    cpu.state.registers[3] = 0xBB;
    run(&mut cpu, 2);
    assert_eq!(cpu.bus.get::<u32>(0x200), 0xAA);
    assert_eq!(cpu.state.registers[1], 0);

    run(&mut cpu, 1);
    assert_eq!(cpu.bus.get::<u32>(0x200), 0xAA);
    assert_eq!(cpu.state.registers[1], 1);
}

#[test]
fn clrex_blocks_store_exclusive() {
    let mut cpu = cpu_with(&[
        0xE194_0F9F, // ldrex r0, [r4]
        0xF57F_F01F, // clrex
        0xE184_1F92, // strex r1, r2, [r4]
    ]);
    cpu.state.registers[4] = 0x200;
    cpu.state.registers[2] = 0xAA;
    cpu.bus.set::<u32>(0x200, 0x77);
    run(&mut cpu, 3);

    assert_eq!(cpu.bus.get::<u32>(0x200), 0x77);
    assert_eq!(cpu.state.registers[1], 1);
}

#[test]
fn backwards_branch() {
    // Instruction at 0x1000 is b 0xF04.
    let mut bus = TestBus::new();
    bus.set::<u32>(0x1000, 0xEAFF_FFBF);
    bus.set::<u32>(0xF04, SELF_LOOP);
    let mut cpu = Cpu::new(bus);
    cpu.state.registers[15] = 0x1000;
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[15], 0xF04);
}

#[test]
fn bl_links_return_address() {
    // bl +8 (to 0x110), then the callee parks itself
    let mut cpu = cpu_with(&[0xEB00_0002, SELF_LOOP]);
    cpu.bus.set::<u32>(0x110, SELF_LOOP);
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[15], 0x110);
    assert_eq!(cpu.state.registers[14], 0x104);
}

#[test]
fn pc_reads_as_plus_8() {
    // mov r0, pc
    let mut cpu = cpu_with(&[0xE1A0_000F]);
    run(&mut cpu, 1);
    assert_eq!(cpu.state.registers[0], CODE + 8);
}

#[test]
fn failed_condition_only_moves_pc() {
    // addeq r0, r0, #1 with Z clear
    let mut cpu = cpu_with(&[0x0290_0001]);
    cpu.state.registers[0] = 7;
    let before = cpu.state.registers;
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[0], 7);
    assert_eq!(cpu.state.registers[15], before[15] + 4);
    assert_eq!(cpu.state.registers[..15], before[..15]);
}

#[test]
fn q_flag_is_sticky_until_msr() {
    let mut cpu = cpu_with(&[
        0xE6A7_0011, // ssat r0, #8, r1
        0xE281_2001, // add r2, r1, #1
        0xE328_F000, // msr cpsr_f, #0
    ]);
    cpu.state.registers[1] = 0x1000;
    run(&mut cpu, 1);
    assert_eq!(cpu.state.registers[0], 0x7F);
    assert!(cpu.state.cpsr.is_bit(27));

    // An op that does not saturate leaves Q alone.
    run(&mut cpu, 1);
    assert!(cpu.state.cpsr.is_bit(27));

    // Only an MSR flag write clears it.
    run(&mut cpu, 1);
    assert!(!cpu.state.cpsr.is_bit(27));
}

#[test]
fn ssat_result_is_a_fixed_point() {
    let mut cpu = cpu_with(&[
        0xE6A7_0011, // ssat r0, #8, r1
        0xE6A7_2010, // ssat r2, #8, r0
    ]);
    cpu.state.registers[1] = 0xFFFF_4000;
    run(&mut cpu, 2);
    assert_eq!(cpu.state.registers[0], cpu.state.registers[2]);
}

#[test]
fn swi_reaches_the_handler() {
    let mut cpu = cpu_with(&[0xEF00_0042]);
    run(&mut cpu, 1);
    assert_eq!(cpu.bus.svc_calls, vec![0x42]);
}

#[test]
fn thumb_bl_pair() {
    let mut bus = TestBus::new();
    // bl 0x108: prefix + suffix at 0x100, landing pad after
    bus.set::<u16>(0x100, 0xF000);
    bus.set::<u16>(0x102, 0xF802);
    bus.set::<u16>(0x108, 0x46C0); // nop
    bus.set::<u16>(0x10A, 0xE7FE); // b .
    let mut cpu = Cpu::new(bus);
    cpu.state.registers[15] = 0x100;
    cpu.state.t = true;
    cpu.state.save_flags();
    run(&mut cpu, 2);

    assert_eq!(cpu.state.registers[15], 0x108);
    assert_eq!(cpu.state.registers[14], 0x105);
    assert!(cpu.state.t);
}

#[test]
fn thumb_conditional_branch() {
    let mut bus = TestBus::new();
    bus.set::<u16>(0x100, 0x2800); // cmp r0, #0
    bus.set::<u16>(0x102, 0xD001); // beq +2
    bus.set::<u16>(0x104, 0xE7FE); // b .
    bus.set::<u16>(0x106, 0x46C0); // nop
    bus.set::<u16>(0x108, 0xE7FE); // b .
    let mut cpu = Cpu::new(bus);
    cpu.state.registers[15] = 0x100;
    cpu.state.t = true;
    cpu.state.save_flags();
    run(&mut cpu, 2);
    assert_eq!(cpu.state.registers[15], 0x108);

    // With r0 nonzero the branch falls through.
    let mut cpu = Cpu::new(TestBus::new());
    cpu.bus.set::<u16>(0x100, 0x2800);
    cpu.bus.set::<u16>(0x102, 0xD001);
    cpu.bus.set::<u16>(0x104, 0xE7FE);
    cpu.state.registers[0] = 5;
    cpu.state.registers[15] = 0x100;
    cpu.state.t = true;
    cpu.state.save_flags();
    run(&mut cpu, 2);
    assert_eq!(cpu.state.registers[15], 0x104);
}

#[test]
fn blocks_replay_identically() {
    let program = [
        0xE3B0_0005u32, // movs r0, #5
        0xE090_1000,    // adds r1, r0, r0
        0xE041_2000,    // sub r2, r1, r0
    ];
    let mut cpu = cpu_with(&program);
    let first = run(&mut cpu, 3);
    let (r1, r2, flags) = (
        cpu.state.registers[1],
        cpu.state.registers[2],
        cpu.state.cpsr,
    );

    // Same entry, same input state: the cached block must replay to the
    // same end state.
    cpu.state.registers = [0; 16];
    cpu.state.registers[15] = CODE;
    let second = run(&mut cpu, 3);
    assert_eq!(first, second);
    assert_eq!(cpu.state.registers[1], r1);
    assert_eq!(cpu.state.registers[2], r2);
    assert_eq!(cpu.state.cpsr, flags);
}

#[test]
fn pending_irq_with_enabled_interrupts_returns() {
    let mut cpu = cpu_with(&[0xE1A0_0000]);
    cpu.state.irq_line = true;
    // Reset state masks IRQs, so the budget runs out normally first.
    assert_eq!(run(&mut cpu, 1), 1);

    cpu.state.registers[15] = CODE;
    cpu.state.cpsr &= !Flag::IrqDisable.mask();
    assert_eq!(run(&mut cpu, 1), 0);
}

#[test]
fn zero_budget_executes_nothing() {
    let mut cpu = cpu_with(&[0xE1A0_0000]);
    assert_eq!(run(&mut cpu, 0), 0);
    assert_eq!(cpu.state.registers[15], CODE);
}

#[test]
fn budget_counts_across_blocks() {
    // Two two-instruction blocks joined by a branch.
    let mut cpu = cpu_with(&[
        0xE3B0_0001, // movs r0, #1
        0xEAFF_FFFF, // b to the next word
        0xE290_0001, // adds r0, r0, #1
        0xE290_0001, // adds r0, r0, #1
    ]);
    assert_eq!(run(&mut cpu, 4), 4);
    assert_eq!(cpu.state.registers[0], 3);
}

#[test]
fn undefined_coprocessor_halts() {
    // cdp p7, ... traps as undefined and zeroes the budget
    let mut cpu = cpu_with(&[0xEE01_1700]);
    let executed = run(&mut cpu, 10);
    assert_eq!(executed, 1);
    assert_eq!(cpu.state.instructions_to_execute, 0);
    assert_eq!(cpu.state.registers[15], CODE);
}

#[test]
fn cp15_roundtrip_through_mcr_mrc() {
    let mut cpu = cpu_with(&[
        0xEE0D_1F10, // mcr p15, 0, r1, c13, c0, 0 -> unimplemented, ignored
        0xEE0D_1F30, // mcr p15, 0, r1, c13, c0, 1 -> unimplemented, ignored
        0xEE0D_1F50, // mcr p15, 0, r1, c13, c0, 2 (TPIDRURW)
        0xEE1D_2F50, // mrc p15, 0, r2, c13, c0, 2
    ]);
    cpu.state.registers[1] = 0xFEED_BEEF;
    run(&mut cpu, 4);
    assert_eq!(cpu.state.registers[2], 0xFEED_BEEF);
}

#[test]
fn spsr_restore_on_movs_pc() {
    // Supervisor mode; craft an SPSR for user mode with flags set, then
    // movs pc, lr.
    let mut cpu = cpu_with(&[0xE1B0_F00E]); // movs pc, lr
    cpu.state.registers[14] = 0x200;
    cpu.bus.set::<u32>(0x200, SELF_LOOP);
    cpu.state.set_spsr(0x6000_0010); // user mode, Z and C set
    run(&mut cpu, 1);

    assert_eq!(cpu.state.registers[15], 0x200);
    assert_eq!(cpu.state.mode(), arm11_cpu::Mode::User);
    assert!(cpu.state.z);
    assert!(cpu.state.c);
}

#[test]
fn user_mode_msr_cannot_mask_interrupts() {
    let mut cpu = cpu_with(&[
        0xE321_F0D0, // msr cpsr_c, #0xD0 (attempt: mask IRQs, user mode)
    ]);
    // Drop to user mode with interrupts enabled first.
    cpu.state.write_cpsr(0x10);
    cpu.state.registers[15] = CODE;
    run(&mut cpu, 1);

    assert!(!cpu.state.irqs_masked());
    assert_eq!(cpu.state.mode(), arm11_cpu::Mode::User);
}
