//! Node-directed control protocol.
//!
//! A message whose onward route is empty has reached the node itself and its
//! payload is read as a control instruction. Both markers are single bytes and
//! must stay bit-for-bit compatible with peers.

use serde::{Deserialize, Serialize};

/// Liveness probe payload
pub const PING: u8 = 0x00;
/// Liveness answer payload
pub const PONG: u8 = 0x01;

/// Recognised control payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlInstruction {
    Ping,
    Pong,
}

impl ControlInstruction {
    /// Interpret a payload. Anything other than exactly one known byte is `None`.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [PING] => Some(Self::Ping),
            [PONG] => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ping => PING,
            Self::Pong => PONG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(PING, 0);
        assert_eq!(PONG, 1);
        assert_eq!(ControlInstruction::Ping.as_byte(), PING);
        assert_eq!(ControlInstruction::Pong.as_byte(), PONG);
    }

    #[test]
    fn test_from_payload() {
        assert_eq!(ControlInstruction::from_payload(&[0x00]), Some(ControlInstruction::Ping));
        assert_eq!(ControlInstruction::from_payload(&[0x01]), Some(ControlInstruction::Pong));
        assert_eq!(ControlInstruction::from_payload(&[0xff]), None);
        assert_eq!(ControlInstruction::from_payload(&[]), None);
        // Trailing bytes make it a different instruction entirely
        assert_eq!(ControlInstruction::from_payload(&[0x00, 0x00]), None);
    }
}
