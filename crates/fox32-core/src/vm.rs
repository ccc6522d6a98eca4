use tracing::{error, warn};

use crate::address_space::AddressSpace;
use crate::config::VmConfig;
use crate::error::{Fault, VmResult};
use crate::flags::Flags;
use crate::io::{DefaultIo, IoHandler};
use crate::operand::{self, Width};
use crate::pager::Pager;
use crate::registers::Registers;

/// The machine state the interpreter advances one instruction at a time
/// (§3). Owns no interior mutability and is not `Sync`: an embedder that
/// wants parallel guests runs one `Vm` per thread (§5).
pub struct Vm {
    pub(crate) regs: Registers,
    pub(crate) space: AddressSpace,
    pub(crate) io: Box<dyn IoHandler>,
    pub(crate) flags: Flags,
    pub(crate) pointer_instr: u32,
    pub(crate) scratch_ip: u32,
    pub(crate) exception_operand: u32,
    pub(crate) mmu_enabled: bool,
    pub halted: bool,
    pub soft_halted: bool,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let pager = Pager::new(config.disk, config.swap_base_sector);
        let space = AddressSpace::new(pager, config.rom);
        let mut regs = Registers::default();
        regs.sp = config.default_stack_pointer;
        regs.esp = config.default_stack_pointer;
        Vm {
            regs,
            space,
            io: Box::new(DefaultIo),
            flags: Flags::default(),
            pointer_instr: config.default_instr_pointer,
            scratch_ip: config.default_instr_pointer,
            exception_operand: 0,
            mmu_enabled: false,
            halted: true,
            soft_halted: false,
        }
    }

    pub fn set_io_handler(&mut self, io: Box<dyn IoHandler>) {
        self.io = io;
    }

    pub fn pointer_instr(&self) -> u32 {
        self.pointer_instr
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Reads a byte out of the guest address space, independent of the
    /// instruction stream — used by the CLI's `inspect` command and by
    /// tests.
    pub fn memory_read_u8(&mut self, address: u32) -> VmResult<u8> {
        self.space.read_u8(address)
    }

    pub fn memory_write_u8(&mut self, address: u32, value: u8) -> VmResult<()> {
        self.space.write_u8(address, value)
    }

    /// Executes exactly one instruction, or returns the fault that aborted
    /// it. Leaves all state untouched on a fault except where §9 documents
    /// an intentional early commit (`BRK`, `INT`).
    pub fn step(&mut self) -> VmResult<()> {
        match self.execute_one() {
            Ok(()) => Ok(()),
            Err(fault) => {
                self.halted = true;
                Err(fault)
            }
        }
    }

    /// Runs up to `count` instructions. Stops early on a hard fault or a
    /// soft halt (`HALT`); on soft halt the full `count` is reported as
    /// executed, matching the source's `vm_resume`.
    pub fn resume(&mut self, count: u32) -> VmResult<u32> {
        self.halted = false;
        let mut executed = 0;
        while !self.halted && !self.soft_halted && executed < count {
            if let Err(fault) = self.execute_one() {
                self.halted = true;
                return Err(fault);
            }
            executed += 1;
        }
        if self.soft_halted {
            executed = count;
        }
        Ok(executed)
    }

    /// Dispatches to the vectored handler at `4 * vector` (§4.6). Pushes a
    /// trap frame and halts the runner so the embedder must explicitly
    /// resume into the handler.
    pub fn raise(&mut self, vector: u16) -> VmResult<()> {
        if vector < 256 && !self.flags.interrupt_enable {
            return Err(Fault::NoInterrupts);
        }

        let handler = self.space.read_u32(4u32 * vector as u32)?;

        if self.flags.swap_sp {
            let old_sp = self.regs.sp;
            self.regs.sp = self.regs.esp;
            operand::push(&mut self.space, &mut self.regs.sp, old_sp, Width::Word)?;
            operand::push(
                &mut self.space,
                &mut self.regs.sp,
                self.pointer_instr,
                Width::Word,
            )?;
            operand::push(
                &mut self.space,
                &mut self.regs.sp,
                self.flags.pack() as u32,
                Width::Byte,
            )?;
            self.flags.swap_sp = false;
        } else {
            operand::push(
                &mut self.space,
                &mut self.regs.sp,
                self.pointer_instr,
                Width::Word,
            )?;
            operand::push(
                &mut self.space,
                &mut self.regs.sp,
                self.flags.pack() as u32,
                Width::Byte,
            )?;
        }

        if vector >= 256 {
            let operand = self.exception_operand;
            operand::push(&mut self.space, &mut self.regs.sp, operand, Width::Word)?;
            self.exception_operand = 0;
        } else {
            operand::push(
                &mut self.space,
                &mut self.regs.sp,
                vector as u32,
                Width::Word,
            )?;
        }

        self.pointer_instr = handler;
        self.halted = true;
        self.soft_halted = false;
        self.flags.interrupt_enable = false;
        Ok(())
    }

    /// Converts a recoverable fault into its vector and re-enters via
    /// `raise`. Returns `CantRecover` for faults with no mapped vector.
    pub fn recover(&mut self, fault: Fault) -> VmResult<()> {
        self.exception_operand = fault.operand().unwrap_or(self.exception_operand);
        match fault.vector() {
            Some(vector) => {
                warn!(?fault, vector, "recovering fault into trap");
                self.raise(vector)
            }
            None => {
                error!(?fault, "fault has no mapped vector");
                Err(Fault::CantRecover)
            }
        }
    }

    /// `RETI`: pops flags, instruction pointer, and (if the popped
    /// `swap_sp` flag says so) the saved stack pointer, in that order.
    pub(crate) fn trap_return(&mut self) -> VmResult<()> {
        let flags_byte = operand::pop(&mut self.space, &mut self.regs.sp, Width::Byte)? as u8;
        self.flags = Flags::unpack(flags_byte);
        self.scratch_ip = operand::pop(&mut self.space, &mut self.regs.sp, Width::Word)?;
        if self.flags.swap_sp {
            self.regs.sp = operand::pop(&mut self.space, &mut self.regs.sp, Width::Word)?;
        }
        Ok(())
    }

    pub fn safe_push_byte(&mut self, value: u8) -> VmResult<()> {
        operand::push(&mut self.space, &mut self.regs.sp, value as u32, Width::Byte)
    }
    pub fn safe_push_half(&mut self, value: u16) -> VmResult<()> {
        operand::push(&mut self.space, &mut self.regs.sp, value as u32, Width::Half)
    }
    pub fn safe_push_word(&mut self, value: u32) -> VmResult<()> {
        operand::push(&mut self.space, &mut self.regs.sp, value, Width::Word)
    }
    pub fn safe_pop_byte(&mut self) -> VmResult<u8> {
        operand::pop(&mut self.space, &mut self.regs.sp, Width::Byte).map(|v| v as u8)
    }
    pub fn safe_pop_half(&mut self) -> VmResult<u16> {
        operand::pop(&mut self.space, &mut self.regs.sp, Width::Half).map(|v| v as u16)
    }
    pub fn safe_pop_word(&mut self) -> VmResult<u32> {
        operand::pop(&mut self.space, &mut self.regs.sp, Width::Word)
    }
}
