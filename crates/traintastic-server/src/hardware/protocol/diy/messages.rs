//! TraintasticDIY message set
//!
//! Each message is one opcode byte, a fixed or length-prefixed payload and a
//! trailing checksum byte (XOR of all preceding bytes). Addresses travel
//! big-endian; states are one byte.

use traintastic_core::{CoreError, Result, TriState};

// ----------------------------------------------------------------------------
// OpCode
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Heartbeat = 0x00,
    GetInfo = 0x01,
    Info = 0x02,
    GetFeatures = 0x03,
    Features = 0x04,
    GetInputState = 0x10,
    SetInputState = 0x11,
    GetOutputState = 0x12,
    SetOutputState = 0x13,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Heartbeat),
            0x01 => Ok(Self::GetInfo),
            0x02 => Ok(Self::Info),
            0x03 => Ok(Self::GetFeatures),
            0x04 => Ok(Self::Features),
            0x10 => Ok(Self::GetInputState),
            0x11 => Ok(Self::SetInputState),
            0x12 => Ok(Self::GetOutputState),
            0x13 => Ok(Self::SetOutputState),
            _ => Err(CoreError::malformed("unknown opcode")),
        }
    }
}

// ----------------------------------------------------------------------------
// IO States
// ----------------------------------------------------------------------------

/// Input state as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum InputState {
    #[default]
    Undefined = 0,
    False = 1,
    True = 2,
    /// The device knows the address but cannot read it.
    Invalid = 3,
}

impl InputState {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Undefined),
            1 => Ok(Self::False),
            2 => Ok(Self::True),
            3 => Ok(Self::Invalid),
            _ => Err(CoreError::malformed("unknown input state")),
        }
    }
}

/// Output state as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OutputState {
    #[default]
    Undefined = 0,
    False = 1,
    True = 2,
    Invalid = 3,
}

impl OutputState {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Undefined),
            1 => Ok(Self::False),
            2 => Ok(Self::True),
            3 => Ok(Self::Invalid),
            _ => Err(CoreError::malformed("unknown output state")),
        }
    }
}

/// Map a wire input state onto the domain tri-state.
pub const fn input_tri_state(value: InputState) -> TriState {
    match value {
        InputState::False => TriState::False,
        InputState::True => TriState::True,
        InputState::Undefined | InputState::Invalid => TriState::Undefined,
    }
}

/// Map a wire output state onto the domain tri-state.
pub const fn output_tri_state(value: OutputState) -> TriState {
    match value {
        OutputState::False => TriState::False,
        OutputState::True => TriState::True,
        OutputState::Undefined | OutputState::Invalid => TriState::Undefined,
    }
}

// ----------------------------------------------------------------------------
// Feature Flags
// ----------------------------------------------------------------------------

/// Four independent bitmask bytes reported by the `Features` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    bytes: [u8; 4],
}

impl FeatureFlags {
    const INPUT: u8 = 0x01;
    const OUTPUT: u8 = 0x02;

    pub const fn new(bytes: [u8; 4]) -> Self {
        Self { bytes }
    }

    pub const fn none() -> Self {
        Self { bytes: [0; 4] }
    }

    /// All capabilities this build understands.
    pub const fn full() -> Self {
        Self {
            bytes: [Self::INPUT | Self::OUTPUT, 0, 0, 0],
        }
    }

    pub const fn as_bytes(self) -> [u8; 4] {
        self.bytes
    }

    pub const fn has_input(self) -> bool {
        (self.bytes[0] & Self::INPUT) != 0
    }

    pub const fn has_output(self) -> bool {
        (self.bytes[0] & Self::OUTPUT) != 0
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One TraintasticDIY protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiyMessage {
    Heartbeat,
    GetInfo,
    Info(String),
    GetFeatures,
    Features(FeatureFlags),
    GetInputState(u16),
    SetInputState(u16, InputState),
    GetOutputState(u16),
    SetOutputState(u16, OutputState),
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

impl DiyMessage {
    pub fn op_code(&self) -> OpCode {
        match self {
            Self::Heartbeat => OpCode::Heartbeat,
            Self::GetInfo => OpCode::GetInfo,
            Self::Info(_) => OpCode::Info,
            Self::GetFeatures => OpCode::GetFeatures,
            Self::Features(_) => OpCode::Features,
            Self::GetInputState(_) => OpCode::GetInputState,
            Self::SetInputState(..) => OpCode::SetInputState,
            Self::GetOutputState(_) => OpCode::GetOutputState,
            Self::SetOutputState(..) => OpCode::SetOutputState,
        }
    }

    /// Encode opcode, payload and checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.op_code() as u8];
        match self {
            Self::Heartbeat | Self::GetInfo | Self::GetFeatures => {}
            Self::Info(text) => {
                let text = &text.as_bytes()[..text.len().min(u8::MAX as usize)];
                bytes.push(text.len() as u8);
                bytes.extend_from_slice(text);
            }
            Self::Features(flags) => bytes.extend_from_slice(&flags.as_bytes()),
            Self::GetInputState(address) | Self::GetOutputState(address) => {
                bytes.extend_from_slice(&address.to_be_bytes());
            }
            Self::SetInputState(address, state) => {
                bytes.extend_from_slice(&address.to_be_bytes());
                bytes.push(*state as u8);
            }
            Self::SetOutputState(address, state) => {
                bytes.extend_from_slice(&address.to_be_bytes());
                bytes.push(*state as u8);
            }
        }
        bytes.push(checksum(&bytes));
        bytes
    }

    /// Try to decode one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the message
    /// and the number of bytes consumed. A checksum mismatch or unknown
    /// opcode poisons the stream and is surfaced as a malformed-frame error.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(&op) = buf.first() else {
            return Ok(None);
        };
        let op = OpCode::from_u8(op)?;
        let payload_len = match op {
            OpCode::Heartbeat | OpCode::GetInfo | OpCode::GetFeatures => 0,
            OpCode::Features => 4,
            OpCode::GetInputState | OpCode::GetOutputState => 2,
            OpCode::SetInputState | OpCode::SetOutputState => 3,
            OpCode::Info => match buf.get(1) {
                Some(&len) => 1 + len as usize,
                None => return Ok(None),
            },
        };
        let total = 1 + payload_len + 1;
        if buf.len() < total {
            return Ok(None);
        }
        let (frame, check) = (&buf[..total - 1], buf[total - 1]);
        if checksum(frame) != check {
            return Err(CoreError::malformed("checksum mismatch"));
        }
        let payload = &frame[1..];
        let message = match op {
            OpCode::Heartbeat => Self::Heartbeat,
            OpCode::GetInfo => Self::GetInfo,
            OpCode::GetFeatures => Self::GetFeatures,
            OpCode::Info => {
                let text = core::str::from_utf8(&payload[1..])
                    .map_err(|_| CoreError::malformed("info text not utf-8"))?;
                Self::Info(text.to_owned())
            }
            OpCode::Features => Self::Features(FeatureFlags::new(payload.try_into().unwrap())),
            OpCode::GetInputState => Self::GetInputState(u16::from_be_bytes([payload[0], payload[1]])),
            OpCode::SetInputState => Self::SetInputState(
                u16::from_be_bytes([payload[0], payload[1]]),
                InputState::from_u8(payload[2])?,
            ),
            OpCode::GetOutputState => {
                Self::GetOutputState(u16::from_be_bytes([payload[0], payload[1]]))
            }
            OpCode::SetOutputState => Self::SetOutputState(
                u16::from_be_bytes([payload[0], payload[1]]),
                OutputState::from_u8(payload[2])?,
            ),
        };
        Ok(Some((message, total)))
    }
}

impl core::fmt::Display for DiyMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Heartbeat => write!(f, "Heartbeat"),
            Self::GetInfo => write!(f, "GetInfo"),
            Self::Info(text) => write!(f, "Info \"{text}\""),
            Self::GetFeatures => write!(f, "GetFeatures"),
            Self::Features(flags) => write!(
                f,
                "Features input={} output={}",
                flags.has_input(),
                flags.has_output()
            ),
            Self::GetInputState(address) => write!(f, "GetInputState {address}"),
            Self::SetInputState(address, state) => {
                write!(f, "SetInputState {address} {state:?}")
            }
            Self::GetOutputState(address) => write!(f, "GetOutputState {address}"),
            Self::SetOutputState(address, state) => {
                write!(f, "SetOutputState {address} {state:?}")
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: DiyMessage) {
        let bytes = message.encode();
        let (decoded, used) = DiyMessage::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_round_trip_all_ops() {
        round_trip(DiyMessage::Heartbeat);
        round_trip(DiyMessage::GetInfo);
        round_trip(DiyMessage::Info("diy v1".into()));
        round_trip(DiyMessage::GetFeatures);
        round_trip(DiyMessage::Features(FeatureFlags::full()));
        round_trip(DiyMessage::GetInputState(100));
        round_trip(DiyMessage::SetInputState(100, InputState::True));
        round_trip(DiyMessage::GetOutputState(513));
        round_trip(DiyMessage::SetOutputState(513, OutputState::False));
    }

    #[test]
    fn test_decode_needs_more_bytes() {
        let bytes = DiyMessage::SetInputState(100, InputState::True).encode();
        for len in 0..bytes.len() {
            assert!(DiyMessage::decode(&bytes[..len]).unwrap().is_none(), "len {len}");
        }
    }

    #[test]
    fn test_decode_two_messages_back_to_back() {
        let mut bytes = DiyMessage::Heartbeat.encode();
        bytes.extend(DiyMessage::GetFeatures.encode());
        let (first, used) = DiyMessage::decode(&bytes).unwrap().unwrap();
        assert_eq!(first, DiyMessage::Heartbeat);
        let (second, _) = DiyMessage::decode(&bytes[used..]).unwrap().unwrap();
        assert_eq!(second, DiyMessage::GetFeatures);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = DiyMessage::SetInputState(100, InputState::True).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(DiyMessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(DiyMessage::decode(&[0xEE, 0xEE]).is_err());
    }

    #[test]
    fn test_feature_flag_bits() {
        assert!(FeatureFlags::full().has_input());
        assert!(FeatureFlags::full().has_output());
        assert!(!FeatureFlags::none().has_input());
        let input_only = FeatureFlags::new([0x01, 0, 0, 0]);
        assert!(input_only.has_input());
        assert!(!input_only.has_output());
    }

    #[test]
    fn test_tri_state_mapping() {
        assert_eq!(input_tri_state(InputState::False), TriState::False);
        assert_eq!(input_tri_state(InputState::True), TriState::True);
        assert_eq!(input_tri_state(InputState::Undefined), TriState::Undefined);
        assert_eq!(input_tri_state(InputState::Invalid), TriState::Undefined);
    }
}
