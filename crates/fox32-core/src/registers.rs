use crate::error::{Fault, VmResult};

pub const REGISTER_COUNT: u8 = 32;
/// Conventionally used as the `LOOP` decrement target by `LOOP`/`RLOOP`.
pub const REGISTER_LOOP: u8 = 31;

const SP_INDEX: u8 = REGISTER_COUNT;
const ESP_INDEX: u8 = REGISTER_COUNT + 1;
const FP_INDEX: u8 = REGISTER_COUNT + 2;

/// The 32 general registers plus the three pseudo-registers addressable
/// the same way (`sp`, exception-stack pointer, frame pointer).
#[derive(Debug, Default, Clone)]
pub struct Registers {
    pub general: [u32; REGISTER_COUNT as usize],
    pub sp: u32,
    pub esp: u32,
    pub fp: u32,
}

impl Registers {
    pub fn read(&self, index: u8) -> VmResult<u32> {
        match index {
            i if i < REGISTER_COUNT => Ok(self.general[i as usize]),
            SP_INDEX => Ok(self.sp),
            ESP_INDEX => Ok(self.esp),
            FP_INDEX => Ok(self.fp),
            _ => Err(Fault::BadRegister { register: index }),
        }
    }

    pub fn write(&mut self, index: u8, value: u32) -> VmResult<()> {
        match index {
            i if i < REGISTER_COUNT => self.general[i as usize] = value,
            SP_INDEX => self.sp = value,
            ESP_INDEX => self.esp = value,
            FP_INDEX => self.fp = value,
            _ => return Err(Fault::BadRegister { register: index }),
        }
        Ok(())
    }
}
