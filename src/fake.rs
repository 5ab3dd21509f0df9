//! Register file behind a fake I2C bus, used by the unit tests

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::registers::{chip, regs};

pub struct FakeBus {
    pub regs: [u8; 256],
    /// Every write as (first register, payload), oldest first
    pub writes: Vec<(u8, Vec<u8>)>,
    /// Writes starting at this register fail
    pub fail_writes_to: Option<u8>,
    /// Reads of this many bytes starting at this register fail
    pub fail_reads: Option<(u8, usize)>,
    /// Every transaction fails
    pub offline: bool,
    pointer: u8,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            regs: [0; 256],
            writes: Vec::new(),
            fail_writes_to: None,
            fail_reads: None,
            offline: false,
            pointer: 0,
        }
    }

    /// A freshly powered chip with the right ID
    pub fn stc3115() -> Self {
        let mut bus = Self::new();
        bus.regs[regs::ID as usize] = chip::ID;
        bus
    }

    pub fn set_word(&mut self, register: u8, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs[register as usize] = lo;
        self.regs[register as usize + 1] = hi;
    }

    pub fn word(&self, register: u8) -> u16 {
        u16::from_le_bytes([self.regs[register as usize], self.regs[register as usize + 1]])
    }

    pub fn ram(&self) -> [u8; chip::RAM_SIZE] {
        let start = regs::RAM as usize;
        let mut ram = [0; chip::RAM_SIZE];
        ram.copy_from_slice(&self.regs[start..start + chip::RAM_SIZE]);
        ram
    }

    pub fn set_ram(&mut self, ram: &[u8; chip::RAM_SIZE]) {
        let start = regs::RAM as usize;
        self.regs[start..start + chip::RAM_SIZE].copy_from_slice(ram);
    }

    /// Payloads of all writes that started at `register`
    pub fn writes_to(&self, register: u8) -> Vec<&[u8]> {
        self.writes
            .iter()
            .filter(|(reg, _)| *reg == register)
            .map(|(_, data)| data.as_slice())
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), ErrorKind> {
        if self.offline || address != chip::I2C_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((register, data)) = bytes.split_first() else {
                        continue;
                    };

                    self.pointer = *register;

                    if data.is_empty() {
                        continue;
                    }

                    if self.fail_writes_to == Some(*register) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }

                    for (i, byte) in data.iter().enumerate() {
                        self.regs[register.wrapping_add(i as u8) as usize] = *byte;
                    }

                    self.writes.push((*register, data.to_vec()));
                }
                Operation::Read(buffer) => {
                    if self.fail_reads == Some((self.pointer, buffer.len())) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }

                    for (i, byte) in buffer.iter_mut().enumerate() {
                        *byte = self.regs[self.pointer.wrapping_add(i as u8) as usize];
                    }
                }
            }
        }

        Ok(())
    }
}
