//! Register level access to the gauge. The driver only talks to the chip through
//! [`RegisterInterface`], so anything that can move bytes to and from the register
//! file can stand in for the I2C bus.

use embedded_hal_async::i2c;

use crate::registers::chip;

/// Longest payload sent in one bus transaction
const MAX_WRITE: usize = 16;

/// Byte oriented register access. Multi-byte values are little endian, low byte first
#[allow(async_fn_in_trait)]
pub trait RegisterInterface {
    type Error;

    async fn read_byte(&mut self, register: u8) -> Result<u8, Self::Error>;

    /// Reads `buffer.len()` consecutive registers starting at `register`
    async fn read_bytes(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    async fn write_byte(&mut self, register: u8, value: u8) -> Result<(), Self::Error>;

    async fn write_word(&mut self, register: u8, value: u16) -> Result<(), Self::Error> {
        self.write_bytes(register, &value.to_le_bytes()).await
    }

    async fn write_bytes(&mut self, register: u8, values: &[u8]) -> Result<(), Self::Error>;
}

/// The STC3115 behind an I2C bus
pub struct I2cInterface<I> {
    i2c: I,
    addr: u8,
}

impl<I> I2cInterface<I> {
    pub fn new(i2c: I, addr: u8) -> Self {
        Self { i2c, addr }
    }

    /// Uses the factory address
    pub fn with_default_address(i2c: I) -> Self {
        Self::new(i2c, chip::I2C_ADDRESS)
    }

    pub fn release(self) -> I {
        self.i2c
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut I {
        &mut self.i2c
    }
}

impl<I, E> RegisterInterface for I2cInterface<I>
where
    I: i2c::I2c<Error = E>,
{
    type Error = E;

    async fn read_byte(&mut self, register: u8) -> Result<u8, E> {
        let mut response = [0];

        self.i2c
            .write_read(self.addr, &[register], &mut response)
            .await?;

        Ok(response[0])
    }

    async fn read_bytes(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), E> {
        self.i2c.write_read(self.addr, &[register], buffer).await
    }

    async fn write_byte(&mut self, register: u8, value: u8) -> Result<(), E> {
        self.i2c.write(self.addr, &[register, value]).await
    }

    async fn write_bytes(&mut self, register: u8, values: &[u8]) -> Result<(), E> {
        // Register address and payload have to go out in a single transaction
        let mut request = [0; MAX_WRITE + 1];
        let mut written = 0;

        for chunk in values.chunks(MAX_WRITE) {
            request[0] = register.wrapping_add(written as u8);
            request[1..=chunk.len()].copy_from_slice(chunk);

            self.i2c.write(self.addr, &request[..=chunk.len()]).await?;
            written += chunk.len();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBus;

    #[async_std::test]
    async fn words_are_written_low_byte_first() {
        let mut interface = I2cInterface::with_default_address(FakeBus::new());

        interface.write_word(0x0D, 0x1234).await.unwrap();

        let bus = interface.release();
        assert_eq!(bus.regs[0x0D], 0x34);
        assert_eq!(bus.regs[0x0E], 0x12);
    }

    #[async_std::test]
    async fn long_writes_are_split_without_losing_the_address() {
        let mut interface = I2cInterface::with_default_address(FakeBus::new());
        let data: [u8; 20] = core::array::from_fn(|i| i as u8 + 1);

        interface.write_bytes(0x20, &data).await.unwrap();

        let mut readback = [0; 20];
        interface.read_bytes(0x20, &mut readback).await.unwrap();
        assert_eq!(readback, data);
    }

    #[async_std::test]
    async fn reads_use_the_configured_address() {
        let mut bus = FakeBus::new();
        bus.regs[0x18] = 0x14;

        let mut interface = I2cInterface::new(bus, 0x71);
        assert!(interface.read_byte(0x18).await.is_err());

        let mut interface = I2cInterface::with_default_address(interface.release());
        assert_eq!(interface.read_byte(0x18).await.unwrap(), 0x14);
    }
}
