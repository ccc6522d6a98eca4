//! The decode/execute core (§4.5). Grounded on `execute_general_inner` in
//! the teacher crate for the "giant match over decoded fields, `?` out on
//! fault" shape, and on `cpu.c`'s `vm_execute` for the actual opcode
//! semantics this VM needs instead of RISC-V's.

use crate::decode::{decode, opcode, Header};
use crate::error::{Fault, VmResult};
use crate::flags::Condition;
use crate::operand::{OperandType, Width};
use crate::vm::Vm;

impl Vm {
    fn src(&mut self, ty: OperandType, width: Width, offset: bool, advance: bool) -> VmResult<u32> {
        crate::operand::source(&mut self.regs, &mut self.space, &mut self.scratch_ip, ty, width, offset, advance)
    }

    fn tgt(
        &mut self,
        ty: OperandType,
        width: Width,
        offset: bool,
        value: u32,
        zero_extend: bool,
    ) -> VmResult<()> {
        crate::operand::target(
            &mut self.regs,
            &mut self.space,
            &mut self.scratch_ip,
            ty,
            width,
            offset,
            width.truncate(value),
            zero_extend,
        )
    }

    fn skip_operand(&mut self, ty: OperandType, width: Width, offset: bool) {
        crate::operand::skip(&mut self.scratch_ip, ty, width, offset)
    }

    fn push_word(&mut self, value: u32) -> VmResult<()> {
        crate::operand::push(&mut self.space, &mut self.regs.sp, value, Width::Word)
    }

    fn pop_word(&mut self) -> VmResult<u32> {
        crate::operand::pop(&mut self.space, &mut self.regs.sp, Width::Word)
    }

    fn should_skip(&self, condition: Condition) -> bool {
        condition.should_skip(self.flags)
    }

    /// Fetches, decodes, and executes exactly one instruction, committing
    /// the instruction pointer only if no fault was raised (§4.5 "commit
    /// discipline").
    pub(crate) fn execute_one(&mut self) -> VmResult<()> {
        let instr_base = self.pointer_instr;
        let raw = self.space.read_u16(instr_base)?;
        let header = decode(raw)?;
        self.scratch_ip = instr_base + 2;

        dispatch(self, &header, instr_base, raw)?;

        self.pointer_instr = self.scratch_ip;
        Ok(())
    }
}

/// Skips target then source operands (`VM_PRELUDE_2`). Returns `true` if
/// the instruction's condition failed and it should be treated as a no-op.
fn prelude2(vm: &mut Vm, h: &Header, width: Width) -> bool {
    if vm.should_skip(h.condition) {
        vm.skip_operand(h.target, width, h.offset);
        vm.skip_operand(h.source, width, h.offset);
        true
    } else {
        false
    }
}

/// Skips only the source operand (`VM_PRELUDE_1`).
fn prelude1(vm: &mut Vm, h: &Header, width: Width) -> bool {
    if vm.should_skip(h.condition) {
        vm.skip_operand(h.source, width, h.offset);
        true
    } else {
        false
    }
}

/// Skips target at `width` then source at byte width (`VM_PRELUDE_BIT`):
/// shift counts and bit indices are always 8-bit regardless of `size`.
fn prelude_bit(vm: &mut Vm, h: &Header, width: Width) -> bool {
    if vm.should_skip(h.condition) {
        vm.skip_operand(h.target, width, h.offset);
        vm.skip_operand(h.source, Width::Byte, h.offset);
        true
    } else {
        false
    }
}

fn add_w(width: Width, b: u32, a: u32) -> (u32, bool) {
    match width {
        Width::Byte => {
            let (r, o) = (b as u8).overflowing_add(a as u8);
            (r as u32, o)
        }
        Width::Half => {
            let (r, o) = (b as u16).overflowing_add(a as u16);
            (r as u32, o)
        }
        Width::Word => b.overflowing_add(a),
    }
}

fn sub_w(width: Width, b: u32, a: u32) -> (u32, bool) {
    match width {
        Width::Byte => {
            let (r, o) = (b as u8).overflowing_sub(a as u8);
            (r as u32, o)
        }
        Width::Half => {
            let (r, o) = (b as u16).overflowing_sub(a as u16);
            (r as u32, o)
        }
        Width::Word => b.overflowing_sub(a),
    }
}

fn mul_w(width: Width, b: u32, a: u32) -> (u32, bool) {
    match width {
        Width::Byte => {
            let (r, o) = (b as u8).overflowing_mul(a as u8);
            (r as u32, o)
        }
        Width::Half => {
            let (r, o) = (b as u16).overflowing_mul(a as u16);
            (r as u32, o)
        }
        Width::Word => b.overflowing_mul(a),
    }
}

fn imul_w(width: Width, b: u32, a: u32) -> (u32, bool) {
    match width {
        Width::Byte => {
            let (r, o) = (b as u8 as i8).overflowing_mul(a as u8 as i8);
            (r as u8 as u32, o)
        }
        Width::Half => {
            let (r, o) = (b as u16 as i16).overflowing_mul(a as u16 as i16);
            (r as u16 as u32, o)
        }
        Width::Word => {
            let (r, o) = (b as i32).overflowing_mul(a as i32);
            (r as u32, o)
        }
    }
}

fn div_w(width: Width, b: u32, a: u32) -> u32 {
    match width {
        Width::Byte => ((b as u8) / (a as u8)) as u32,
        Width::Half => ((b as u16) / (a as u16)) as u32,
        Width::Word => b / a,
    }
}
fn rem_w(width: Width, b: u32, a: u32) -> u32 {
    match width {
        Width::Byte => ((b as u8) % (a as u8)) as u32,
        Width::Half => ((b as u16) % (a as u16)) as u32,
        Width::Word => b % a,
    }
}
fn idiv_w(width: Width, b: u32, a: u32) -> u32 {
    match width {
        Width::Byte => ((b as u8 as i8) / (a as u8 as i8)) as u8 as u32,
        Width::Half => ((b as u16 as i16) / (a as u16 as i16)) as u16 as u32,
        Width::Word => ((b as i32) / (a as i32)) as u32,
    }
}
fn irem_w(width: Width, b: u32, a: u32) -> u32 {
    match width {
        Width::Byte => ((b as u8 as i8) % (a as u8 as i8)) as u8 as u32,
        Width::Half => ((b as u16 as i16) % (a as u16 as i16)) as u16 as u32,
        Width::Word => ((b as i32) % (a as i32)) as u32,
    }
}

fn shl_w(width: Width, b: u32, count: u32) -> u32 {
    match width {
        Width::Byte => (b as u8).wrapping_shl(count) as u32,
        Width::Half => (b as u16).wrapping_shl(count) as u32,
        Width::Word => b.wrapping_shl(count),
    }
}
fn shr_w(width: Width, b: u32, count: u32) -> u32 {
    match width {
        Width::Byte => (b as u8).wrapping_shr(count) as u32,
        Width::Half => (b as u16).wrapping_shr(count) as u32,
        Width::Word => b.wrapping_shr(count),
    }
}
fn sar_w(width: Width, b: u32, count: u32) -> u32 {
    match width {
        Width::Byte => (b as u8 as i8).wrapping_shr(count) as u8 as u32,
        Width::Half => (b as u16 as i16).wrapping_shr(count) as u16 as u32,
        Width::Word => (b as i32).wrapping_shr(count) as u32,
    }
}
fn rol_w(width: Width, b: u32, count: u32) -> u32 {
    match width {
        Width::Byte => (b as u8).rotate_left(count) as u32,
        Width::Half => (b as u16).rotate_left(count) as u32,
        Width::Word => b.rotate_left(count),
    }
}
fn ror_w(width: Width, b: u32, count: u32) -> u32 {
    match width {
        Width::Byte => (b as u8).rotate_right(count) as u32,
        Width::Half => (b as u16).rotate_right(count) as u32,
        Width::Word => b.rotate_right(count),
    }
}
fn bit_set_w(b: u32, bit: u32) -> u32 {
    b | 1u32.wrapping_shl(bit)
}
fn bit_clear_w(b: u32, bit: u32) -> u32 {
    b & !1u32.wrapping_shl(bit)
}

/// The families sharing `ADD`'s carry/zero semantics (§4.5 "Arithmetic").
enum ArithOp {
    Add,
    Sub,
    Mul,
    Imul,
}

fn arith(vm: &mut Vm, h: &Header, width: Width, op: ArithOp) -> VmResult<()> {
    if prelude2(vm, h, width) {
        return Ok(());
    }
    let a = vm.src(h.source, width, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, false)?;
    let (x, carry) = match op {
        ArithOp::Add => add_w(width, b, a),
        ArithOp::Sub => sub_w(width, b, a),
        ArithOp::Mul => mul_w(width, b, a),
        ArithOp::Imul => imul_w(width, b, a),
    };
    vm.tgt(h.target, width, h.offset, x, false)?;
    vm.flags.carry = carry;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

enum DivOp {
    Div,
    Rem,
    Idiv,
    Irem,
}

fn divide(vm: &mut Vm, h: &Header, width: Width, op: DivOp) -> VmResult<()> {
    if prelude2(vm, h, width) {
        return Ok(());
    }
    let a = vm.src(h.source, width, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, false)?;
    if width.truncate(a) == 0 {
        return Err(Fault::DivZero);
    }
    let x = match op {
        DivOp::Div => div_w(width, b, a),
        DivOp::Rem => rem_w(width, b, a),
        DivOp::Idiv => idiv_w(width, b, a),
        DivOp::Irem => irem_w(width, b, a),
    };
    vm.tgt(h.target, width, h.offset, x, false)?;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

enum BitOp {
    And,
    Or,
    Xor,
}

fn bitwise(vm: &mut Vm, h: &Header, width: Width, op: BitOp) -> VmResult<()> {
    if prelude2(vm, h, width) {
        return Ok(());
    }
    let a = vm.src(h.source, width, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, false)?;
    let x = match op {
        BitOp::And => b & a,
        BitOp::Or => b | a,
        BitOp::Xor => b ^ a,
    };
    vm.tgt(h.target, width, h.offset, x, false)?;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

enum ShiftOp {
    Sla,
    Srl,
    Sra,
    Rol,
    Ror,
    Bse,
    Bcl,
}

fn shift(vm: &mut Vm, h: &Header, width: Width, op: ShiftOp) -> VmResult<()> {
    if prelude_bit(vm, h, width) {
        return Ok(());
    }
    let count = vm.src(h.source, Width::Byte, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, false)?;
    let x = match op {
        ShiftOp::Sla => shl_w(width, b, count),
        ShiftOp::Srl => shr_w(width, b, count),
        ShiftOp::Sra => sar_w(width, b, count),
        ShiftOp::Rol => rol_w(width, b, count),
        ShiftOp::Ror => ror_w(width, b, count),
        ShiftOp::Bse => bit_set_w(b, count),
        ShiftOp::Bcl => bit_clear_w(b, count),
    };
    vm.tgt(h.target, width, h.offset, x, false)?;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

fn icmp_w(width: Width, b: u32, a: u32) -> (u32, bool) {
    match width {
        Width::Byte => {
            let (r, o) = (b as u8 as i8).overflowing_sub(a as u8 as i8);
            (r as u8 as u32, o)
        }
        Width::Half => {
            let (r, o) = (b as u16 as i16).overflowing_sub(a as u16 as i16);
            (r as u16 as u32, o)
        }
        Width::Word => {
            let (r, o) = (b as i32).overflowing_sub(a as i32);
            (r as u32, o)
        }
    }
}

fn cmp(vm: &mut Vm, h: &Header, width: Width, signed: bool) -> VmResult<()> {
    if prelude2(vm, h, width) {
        return Ok(());
    }
    let a = vm.src(h.source, width, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, true)?;
    let (x, carry) = if signed {
        icmp_w(width, b, a)
    } else {
        sub_w(width, b, a)
    };
    vm.flags.carry = carry;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

fn bts(vm: &mut Vm, h: &Header, width: Width) -> VmResult<()> {
    if prelude_bit(vm, h, width) {
        return Ok(());
    }
    let bit = vm.src(h.source, Width::Byte, h.offset, true)?;
    let b = vm.src(h.target, width, h.offset, true)?;
    let x = b & 1u32.wrapping_shl(bit);
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

fn not_op(vm: &mut Vm, h: &Header, width: Width) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    let v = vm.src(h.source, width, h.offset, false)?;
    let x = width.truncate(!v);
    vm.tgt(h.source, width, h.offset, x, false)?;
    vm.flags.zero = x == 0;
    Ok(())
}

fn inc_dec(vm: &mut Vm, h: &Header, width: Width, negate: bool) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    let v = vm.src(h.source, width, h.offset, false)?;
    let amount = 1u32 << h.target_bits;
    let (x, carry) = if negate {
        sub_w(width, v, amount)
    } else {
        add_w(width, v, amount)
    };
    vm.tgt(h.source, width, h.offset, x, false)?;
    vm.flags.carry = carry;
    vm.flags.zero = width.truncate(x) == 0;
    Ok(())
}

fn mov(vm: &mut Vm, h: &Header, width: Width, zero_extend: bool) -> VmResult<()> {
    if prelude2(vm, h, width) {
        return Ok(());
    }
    let value = vm.src(h.source, width, h.offset, true)?;
    vm.tgt(h.target, width, h.offset, value, zero_extend)
}

fn push_op(vm: &mut Vm, h: &Header, width: Width) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    let value = vm.src(h.source, width, h.offset, true)?;
    crate::operand::push(&mut vm.space, &mut vm.regs.sp, value, width)
}

fn pop_op(vm: &mut Vm, h: &Header, width: Width) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    // sp is restored around the target write so a fault writing the
    // target (e.g. a bad register) leaves sp untouched (§4.4).
    let old_sp = vm.regs.sp;
    let value = crate::operand::pop(&mut vm.space, &mut vm.regs.sp, width)?;
    let new_sp = vm.regs.sp;
    vm.regs.sp = old_sp;
    vm.tgt(h.source, width, h.offset, value, false)?;
    vm.regs.sp = new_sp;
    Ok(())
}

fn jump_target(vm: &mut Vm, h: &Header, width: Width, instr_base: u32, relative: bool) -> VmResult<u32> {
    let raw = vm.src(h.source, width, h.offset, true)?;
    let signed = width.sign_extend(raw);
    Ok(if relative {
        instr_base.wrapping_add(signed)
    } else {
        signed
    })
}

fn jmp(vm: &mut Vm, h: &Header, width: Width, instr_base: u32, relative: bool) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    vm.scratch_ip = jump_target(vm, h, width, instr_base, relative)?;
    Ok(())
}

fn call(vm: &mut Vm, h: &Header, width: Width, instr_base: u32, relative: bool) -> VmResult<()> {
    if prelude1(vm, h, width) {
        return Ok(());
    }
    let target = jump_target(vm, h, width, instr_base, relative)?;
    vm.push_word(vm.scratch_ip)?;
    vm.scratch_ip = target;
    Ok(())
}

fn loop_op(vm: &mut Vm, h: &Header, width: Width, instr_base: u32, relative: bool) -> VmResult<()> {
    use crate::registers::REGISTER_LOOP;
    let taken = if vm.should_skip(h.condition) {
        false
    } else {
        let count = vm.regs.read(REGISTER_LOOP)?.wrapping_sub(1);
        vm.regs.write(REGISTER_LOOP, count)?;
        count != 0
    };
    if taken {
        vm.scratch_ip = jump_target(vm, h, width, instr_base, relative)?;
    } else {
        vm.skip_operand(h.source, width, h.offset);
    }
    Ok(())
}

fn dispatch(vm: &mut Vm, h: &Header, instr_base: u32, raw: u16) -> VmResult<()> {
    use opcode::*;
    let size = h.size;

    let word_only = |size: Width| -> VmResult<()> {
        if size != Width::Word {
            Err(Fault::BadOpcode { raw })
        } else {
            Ok(())
        }
    };

    match h.optype {
        NOP => Ok(()),
        HALT => {
            if !vm.should_skip(h.condition) {
                vm.soft_halted = true;
            }
            Ok(())
        }
        BRK => {
            if !vm.should_skip(h.condition) {
                vm.pointer_instr = vm.scratch_ip;
                return Err(Fault::Debugger);
            }
            Ok(())
        }

        IN => {
            word_only(size)?;
            if prelude2(vm, h, Width::Word) {
                return Ok(());
            }
            let port = vm.src(h.source, Width::Word, h.offset, true)?;
            let value = vm.io.read(port).map_err(|_| Fault::IoRead { port })?;
            vm.tgt(h.target, Width::Word, h.offset, value, true)
        }
        OUT => {
            word_only(size)?;
            if prelude2(vm, h, Width::Word) {
                return Ok(());
            }
            let value = vm.src(h.source, Width::Word, h.offset, true)?;
            let port = vm.src(h.target, Width::Word, h.offset, true)?;
            vm.io.write(port, value).map_err(|_| Fault::IoWrite { port })
        }

        RTA => {
            if prelude2(vm, h, size) {
                return Ok(());
            }
            let source = vm.src(h.source, size, h.offset, true)?;
            let addr = instr_base.wrapping_add(size.sign_extend(source));
            vm.tgt(h.target, Width::Word, h.offset, addr, true)
        }

        RET => {
            word_only(size)?;
            if vm.should_skip(h.condition) {
                return Ok(());
            }
            vm.scratch_ip = vm.pop_word()?;
            Ok(())
        }
        RETI => {
            word_only(size)?;
            if vm.should_skip(h.condition) {
                return Ok(());
            }
            vm.trap_return()
        }

        ISE => {
            word_only(size)?;
            if !vm.should_skip(h.condition) {
                vm.flags.interrupt_enable = true;
            }
            Ok(())
        }
        ICL => {
            word_only(size)?;
            if !vm.should_skip(h.condition) {
                vm.flags.interrupt_enable = false;
            }
            Ok(())
        }
        MSE => {
            word_only(size)?;
            if !vm.should_skip(h.condition) {
                vm.mmu_enabled = true;
            }
            Ok(())
        }
        MCL => {
            word_only(size)?;
            if !vm.should_skip(h.condition) {
                vm.mmu_enabled = false;
            }
            Ok(())
        }

        JMP => {
            word_only(size)?;
            jmp(vm, h, Width::Word, instr_base, false)
        }
        CALL => {
            word_only(size)?;
            call(vm, h, Width::Word, instr_base, false)
        }
        LOOP => {
            word_only(size)?;
            loop_op(vm, h, Width::Word, instr_base, false)
        }
        RJMP => jmp(vm, h, size, instr_base, true),
        RCALL => call(vm, h, size, instr_base, true),
        RLOOP => loop_op(vm, h, size, instr_base, true),

        INT => {
            word_only(size)?;
            if prelude1(vm, h, Width::Word) {
                return Ok(());
            }
            let vector = vm.src(h.source, Width::Word, h.offset, true)?;
            vm.pointer_instr = vm.scratch_ip;
            vm.raise(vector as u16)?;
            vm.scratch_ip = vm.pointer_instr;
            Ok(())
        }
        TLB | FLP => Ok(()),

        POP => pop_op(vm, h, size),
        PUSH => push_op(vm, h, size),

        MOV => mov(vm, h, size, size == Width::Word),
        MOVZ => mov(vm, h, size, true),

        NOT => not_op(vm, h, size),
        INC => inc_dec(vm, h, size, false),
        DEC => inc_dec(vm, h, size, true),

        ADD => arith(vm, h, size, ArithOp::Add),
        SUB => arith(vm, h, size, ArithOp::Sub),
        MUL => arith(vm, h, size, ArithOp::Mul),
        IMUL => arith(vm, h, size, ArithOp::Imul),

        DIV => divide(vm, h, size, DivOp::Div),
        REM => divide(vm, h, size, DivOp::Rem),
        IDIV => divide(vm, h, size, DivOp::Idiv),
        IREM => divide(vm, h, size, DivOp::Irem),

        AND => bitwise(vm, h, size, BitOp::And),
        OR => bitwise(vm, h, size, BitOp::Or),
        XOR => bitwise(vm, h, size, BitOp::Xor),

        SLA => shift(vm, h, size, ShiftOp::Sla),
        SRL => shift(vm, h, size, ShiftOp::Srl),
        SRA => shift(vm, h, size, ShiftOp::Sra),
        ROL => shift(vm, h, size, ShiftOp::Rol),
        ROR => shift(vm, h, size, ShiftOp::Ror),
        BSE => shift(vm, h, size, ShiftOp::Bse),
        BCL => shift(vm, h, size, ShiftOp::Bcl),

        CMP => cmp(vm, h, size, false),
        ICMP => cmp(vm, h, size, true),
        BTS => bts(vm, h, size),

        _ => Err(Fault::BadOpcode { raw }),
    }
}
