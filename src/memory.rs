//! The STC3115 has 16 bytes of RAM that survive as long as the battery is connected.
//! The driver keeps its own state there so it can resume after the host restarts
//! without losing the coulomb counter history.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::ChipConfig;
use crate::crc::crc8;
use crate::interface::RegisterInterface;
use crate::registers::{chip, regs};
use crate::{Error, Stc3115};

/// Marks the RAM contents as written by this driver
pub const TEST_WORD: u16 = 0x53A9;

const CHECKSUM_OFFSET: usize = chip::RAM_SIZE - 1;
const RESERVED_LEN: usize = 5;

/// Where the gauge is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecycleState {
    Uninitialized,
    /// Started, waiting for the first conversions to settle
    Init,
    Running,
    PoweredDown,
}

impl LifecycleState {
    fn tag(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Init => b'I',
            Self::Running => b'R',
            Self::PoweredDown => b'D',
        }
    }
}

impl From<u8> for LifecycleState {
    fn from(tag: u8) -> Self {
        match tag {
            b'I' => Self::Init,
            b'R' => Self::Running,
            b'D' => Self::PoweredDown,
            _ => Self::Uninitialized,
        }
    }
}

/// Typed view of the gauge RAM. Layout, little endian:
///
/// | offset | field |
/// |--------|-------|
/// | 0..2   | test word |
/// | 2..4   | high resolution SOC |
/// | 4..6   | coulomb counter gain |
/// | 6..8   | voltage mode gain |
/// | 8      | SOC, percent |
/// | 9      | lifecycle tag |
/// | 10..15 | reserved |
/// | 15     | CRC-8 of the bytes before it |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistedState {
    pub test_word: u16,
    pub high_resolution_soc: u16,
    pub cc_gain: u16,
    pub vm_gain: u16,
    pub soc: i8,
    pub state: LifecycleState,
    reserved: [u8; RESERVED_LEN],
    checksum: u8,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::from_bytes(&[0; chip::RAM_SIZE])
    }
}

impl PersistedState {
    /// Fresh block: zeroed, stamped with the test word and the gains in use
    pub fn initialize(config: &ChipConfig) -> Self {
        let mut state = Self {
            test_word: TEST_WORD,
            cc_gain: config.cc_gain,
            vm_gain: config.vm_gain,
            ..Default::default()
        };

        state.reseal();
        state
    }

    pub fn from_bytes(raw: &[u8; chip::RAM_SIZE]) -> Self {
        let mut reserved = [0; RESERVED_LEN];
        reserved.copy_from_slice(&raw[10..CHECKSUM_OFFSET]);

        Self {
            test_word: LittleEndian::read_u16(&raw[0..2]),
            high_resolution_soc: LittleEndian::read_u16(&raw[2..4]),
            cc_gain: LittleEndian::read_u16(&raw[4..6]),
            vm_gain: LittleEndian::read_u16(&raw[6..8]),
            soc: raw[8] as i8,
            state: LifecycleState::from(raw[9]),
            reserved,
            checksum: raw[CHECKSUM_OFFSET],
        }
    }

    pub fn to_bytes(&self) -> [u8; chip::RAM_SIZE] {
        let mut raw = [0; chip::RAM_SIZE];

        LittleEndian::write_u16(&mut raw[0..2], self.test_word);
        LittleEndian::write_u16(&mut raw[2..4], self.high_resolution_soc);
        LittleEndian::write_u16(&mut raw[4..6], self.cc_gain);
        LittleEndian::write_u16(&mut raw[6..8], self.vm_gain);
        raw[8] = self.soc as u8;
        raw[9] = self.state.tag();
        raw[10..CHECKSUM_OFFSET].copy_from_slice(&self.reserved);
        raw[CHECKSUM_OFFSET] = self.checksum;

        raw
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Recomputes the checksum. Required after every change before the block is saved
    pub fn reseal(&mut self) {
        self.checksum = crc8(&self.to_bytes()[..CHECKSUM_OFFSET]);
    }

    pub fn is_sealed(&self) -> bool {
        crc8(&self.to_bytes()) == 0
    }

    /// Written by us and not damaged since
    pub fn is_valid(&self) -> bool {
        self.test_word == TEST_WORD && self.is_sealed()
    }

    /// Clears the test word so the next start treats the RAM as garbage
    pub(crate) fn invalidate(&mut self) {
        self.test_word = 0;
        self.state = LifecycleState::Uninitialized;
        self.reseal();
    }
}

impl<T> Stc3115<T>
where
    T: RegisterInterface,
{
    pub(crate) async fn load_state(&mut self) -> Result<PersistedState, Error<T::Error>> {
        let mut raw = [0; chip::RAM_SIZE];
        self.read_bytes(regs::RAM, &mut raw).await?;

        Ok(PersistedState::from_bytes(&raw))
    }

    pub(crate) async fn save_state(&mut self, state: &PersistedState) -> Result<(), Error<T::Error>> {
        debug_assert!(state.is_sealed(), "persisted state saved without reseal");

        self.write_bytes(regs::RAM, &state.to_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GaugeConfig;

    fn config() -> ChipConfig {
        ChipConfig::derive(&GaugeConfig::default()).unwrap()
    }

    #[test]
    fn initialized_block_is_valid() {
        let state = PersistedState::initialize(&config());

        assert!(state.is_valid());
        assert_eq!(state.state, LifecycleState::Uninitialized);
        assert_eq!(state.cc_gain, 1513);
        assert_eq!(state.vm_gain, 307);
        assert_eq!(state.high_resolution_soc, 0);
    }

    #[test]
    fn sealed_block_folds_to_zero() {
        let mut state = PersistedState::initialize(&config());
        state.high_resolution_soc = 0x4000;
        state.soc = 32;
        state.state = LifecycleState::Running;
        state.reseal();

        assert_eq!(crc8(&state.to_bytes()), 0);
        assert!(state.is_valid());
    }

    #[test]
    fn mutation_without_reseal_is_detected() {
        let mut state = PersistedState::initialize(&config());
        state.high_resolution_soc = 1234;

        assert!(!state.is_sealed());
        assert!(!state.is_valid());
    }

    #[test]
    fn reseal_is_idempotent() {
        let mut state = PersistedState::initialize(&config());
        state.state = LifecycleState::Init;

        state.reseal();
        let first = state.checksum();
        state.reseal();

        assert_eq!(state.checksum(), first);
    }

    #[test]
    fn wrong_test_word_is_invalid_even_when_sealed() {
        let mut state = PersistedState::initialize(&config());
        state.test_word = 0x1234;
        state.reseal();

        assert!(state.is_sealed());
        assert!(!state.is_valid());
    }

    #[test]
    fn blank_ram_is_invalid() {
        assert!(!PersistedState::from_bytes(&[0; 16]).is_valid());
        assert!(!PersistedState::from_bytes(&[0xFF; 16]).is_valid());
    }

    #[test]
    fn parse_keeps_every_byte() {
        let mut raw = [
            0xA9, 0x53, 0x00, 0x40, 0xE9, 0x05, 0x33, 0x01, 0x20, b'R', 1, 2, 3, 4, 5, 0,
        ];
        raw[15] = crc8(&raw[..15]);

        let state = PersistedState::from_bytes(&raw);

        assert_eq!(state.test_word, TEST_WORD);
        assert_eq!(state.high_resolution_soc, 0x4000);
        assert_eq!(state.cc_gain, 1513);
        assert_eq!(state.vm_gain, 307);
        assert_eq!(state.soc, 32);
        assert_eq!(state.state, LifecycleState::Running);
        assert!(state.is_valid());
        assert_eq!(state.to_bytes(), raw);
    }

    #[test]
    fn lifecycle_tags() {
        for state in [
            LifecycleState::Uninitialized,
            LifecycleState::Init,
            LifecycleState::Running,
            LifecycleState::PoweredDown,
        ] {
            assert_eq!(LifecycleState::from(state.tag()), state);
        }

        assert_eq!(LifecycleState::Init.tag(), b'I');
        assert_eq!(LifecycleState::from(b'x'), LifecycleState::Uninitialized);
    }

    #[test]
    fn invalidate_clears_test_word_and_state() {
        let mut state = PersistedState::initialize(&config());
        state.state = LifecycleState::Running;
        state.invalidate();

        assert!(state.is_sealed());
        assert!(!state.is_valid());
        assert_eq!(state.state, LifecycleState::Uninitialized);
    }
}
