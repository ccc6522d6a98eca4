//! End-to-end scenarios, one per §8 of the specification. Constructs a
//! fresh `Vm` with a tiny ROM/program image loaded at the default
//! instruction pointer and steps it, asserting on register/memory state —
//! the same external-integration style as the teacher crate's
//! `tests/exception.rs`.

use fox32_core::flags::Flags;
use fox32_core::{Fault, MemoryDisk, Rom, Vm, VmConfig};

fn vm_with_program(bytes: &[u8]) -> Vm {
    let mut rom = vec![0u8; bytes.len().max(16)];
    rom[..bytes.len()].copy_from_slice(bytes);
    let config = VmConfig::new(Rom::new(rom), Box::new(MemoryDisk::new(2048)));
    let mut vm = Vm::new(config);
    vm.halted = false;
    vm
}

fn header(size: u16, optype: u8, offset: bool, condition: u8, target: u8, source: u8) -> u16 {
    (size << 14)
        | ((optype as u16) << 8)
        | ((offset as u16) << 7)
        | ((condition as u16) << 4)
        | ((target as u16) << 2)
        | (source as u16)
}

#[test]
fn scenario_1_mov_word_reg_imm() {
    // MOV.W r0 <- imm 0xDEADBEEF. Operands are encoded source-then-target
    // in the instruction stream (the source is consumed first to compute
    // the value, the target's register-index byte follows).
    let mut program = Vec::new();
    program.extend_from_slice(&header(2, 0x17, false, 0, 0, 2).to_le_bytes());
    program.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
    program.push(0x00); // target register index

    let mut vm = vm_with_program(&program);
    let start = vm.pointer_instr();
    vm.step().unwrap();
    assert_eq!(vm.registers().read(0).unwrap(), 0xDEADBEEF);
    assert_eq!(vm.pointer_instr(), start + 7);
    assert!(!vm.flags().zero);
    assert!(!vm.flags().carry);
}

#[test]
fn scenario_2_add_byte_overflow_sets_carry_and_zero() {
    // r0 = 0xFF; ADD.B r0 += 1 -> r0 low byte 0x00, carry=1, zero=1
    let mut program = Vec::new();
    program.extend_from_slice(&header(0, 0x17, false, 0, 0, 2).to_le_bytes()); // MOV.B r0, imm8
    program.push(0xFF);
    program.push(0x00);
    program.extend_from_slice(&header(0, 0x01, false, 0, 0, 2).to_le_bytes()); // ADD.B r0 += imm8
    program.push(0x01);
    program.push(0x00);

    let mut vm = vm_with_program(&program);
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.registers().read(0).unwrap() & 0xFF, 0x00);
    assert!(vm.flags().carry);
    assert!(vm.flags().zero);
}

#[test]
fn scenario_3_div_by_zero_is_recoverable() {
    // DIV.W r0 /= r1, with r1 = 0 (its power-on-reset value)
    let mut program = Vec::new();
    program.extend_from_slice(&header(2, 0x22, false, 0, 0, 0).to_le_bytes());
    program.push(0x01); // source register r1 (divisor)
    program.push(0x00); // target register r0 (dividend)

    let mut vm = vm_with_program(&program);
    let fault_ip = vm.pointer_instr();
    let err = vm.step().unwrap_err();
    assert_eq!(err, Fault::DivZero);
    assert_eq!(vm.pointer_instr(), fault_ip, "I4: faulting ip unchanged");

    vm.flags_mut().interrupt_enable = true;
    vm.recover(err).unwrap();
}

#[test]
fn scenario_4_demand_paged_write_and_read() {
    let mut vm = vm_with_program(&[]);
    vm.memory_write_u8(0x12345, 0x42).unwrap();
    assert_eq!(vm.memory_read_u8(0x12345).unwrap(), 0x42);
}

#[test]
fn scenario_5_eviction_reloads_page() {
    let mut vm = vm_with_program(&[]);
    vm.memory_write_u8(0, 0xAB).unwrap();
    // touch 40 more pages to force the original frame to be evicted
    for p in 1..40u32 {
        vm.memory_write_u8(p * 4096, 0).unwrap();
    }
    assert_eq!(vm.memory_read_u8(0).unwrap(), 0xAB);
}

#[test]
fn scenario_6_reti_with_swap_sp_restores_stack() {
    let mut program = Vec::new();
    // RETI, word, always
    program.extend_from_slice(&header(2, 0x3A, false, 0, 0, 0).to_le_bytes());
    let mut vm = vm_with_program(&program);

    // Simulate having trapped in: currently on the exception stack, with a
    // trap frame built the way `raise` builds one (sp, then ip, then
    // flags, pushed in that order so they pop flags-first).
    vm.registers_mut().sp = 0x0006_E000;
    let restore_sp = 0x0006_F000u32;
    let restore_ip = 0xF000_1234u32;
    let mut saved_flags = Flags::default();
    saved_flags.swap_sp = true;

    vm.safe_push_word(restore_sp).unwrap();
    vm.safe_push_word(restore_ip).unwrap();
    vm.safe_push_byte(saved_flags.pack()).unwrap();

    vm.step().unwrap();
    assert_eq!(vm.registers().sp, restore_sp, "P: saved sp restored");
    assert_eq!(vm.pointer_instr(), restore_ip);
    assert!(vm.flags().swap_sp);
}
