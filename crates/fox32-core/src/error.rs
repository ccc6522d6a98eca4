use thiserror::Error;

/// Everything that can abort an in-flight instruction.
///
/// Mirrors the `FOX32_ERR_*` taxonomy of the reference interpreter, but as a
/// typed `Result::Err` instead of a sentinel integer paired with a
/// `longjmp`. Each synchronous-fault variant carries the operand that
/// triggered it, matching `vm->exception_operand` in the source.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("io read callback failed on port {port:#x}")]
    IoRead { port: u32 },
    #[error("io write callback failed on port {port:#x}")]
    IoWrite { port: u32 },
    #[error("disk access failed at sector {sector}")]
    Disk { sector: u64 },
    #[error("read fault at {address:#x}")]
    FaultRead { address: u32 },
    #[error("write fault at {address:#x}")]
    FaultWrite { address: u32 },
    #[error("division by zero")]
    DivZero,
    #[error("bad opcode in instruction header {raw:#06x}")]
    BadOpcode { raw: u16 },
    #[error("bad condition code {condition:#x}")]
    BadCondition { condition: u8 },
    #[error("bad register index {register:#x}")]
    BadRegister { register: u8 },
    #[error("attempted write to an immediate operand")]
    BadImmediate,
    #[error("debugger breakpoint")]
    Debugger,
    #[error("raise() called with a maskable vector while interrupts are disabled")]
    NoInterrupts,
    #[error("error has no mapped vector and cannot be recovered")]
    CantRecover,
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl Fault {
    /// The address-space access this fault carries, if any — used to
    /// populate the exception-operand register before a trap is raised.
    pub fn operand(&self) -> Option<u32> {
        match *self {
            Fault::FaultRead { address } | Fault::FaultWrite { address } => Some(address),
            Fault::Disk { sector } => Some(sector as u32),
            Fault::BadOpcode { raw } => Some(raw as u32),
            Fault::BadCondition { condition } => Some(condition as u32),
            Fault::BadRegister { register } => Some(register as u32),
            _ => None,
        }
    }

    /// The synchronous-fault vector this error maps to, per §4.6.
    pub fn vector(&self) -> Option<u16> {
        match self {
            Fault::DivZero => Some(256),
            Fault::BadOpcode { .. }
            | Fault::BadCondition { .. }
            | Fault::BadRegister { .. }
            | Fault::BadImmediate => Some(257),
            Fault::FaultRead { .. } => Some(258),
            Fault::FaultWrite { .. } => Some(259),
            Fault::Debugger => Some(260),
            Fault::IoRead { .. } | Fault::IoWrite { .. } | Fault::Disk { .. } => Some(261),
            Fault::NoInterrupts | Fault::CantRecover | Fault::Internal(_) => None,
        }
    }
}

pub type VmResult<T> = Result<T, Fault>;
