mod codec;
mod transaction;

use num_derive::{FromPrimitive, ToPrimitive};
use std::{fmt::Display, time::Duration};
use thiserror::Error;

pub use codec::{
    decode_analog, decode_flag, decode_ir_message, decode_motor_power, encode_motor_power,
    encode_switch,
};
pub use transaction::{
    change_address, check_address, identify, read_command, scan, write_command,
    AddressChangeError, TransactionError,
};

pub const NORM_LEN: usize = 4;
pub const LONG_LEN: usize = 24;
pub const IR_MAX_BYTES: usize = LONG_LEN - 2;

/// Identifier byte reported by every board in reply to `GetId`.
pub const BOARD_ID: u8 = 0x40;
pub const DEFAULT_ADDRESS: u8 = 0x40;
pub const DEFAULT_BUS: u8 = 1;

pub const PWM_MAX: u8 = 255;
pub const ANALOG_MAX: u16 = 0x3FF;
pub const ANALOG_REFERENCE: f64 = 3.3;

/// Lowest and highest addresses a board may answer on; the rest are reserved.
pub const ADDRESS_MIN: u8 = 0x03;
pub const ADDRESS_MAX: u8 = 0x77;

/// Time the board needs to start answering on a freshly written address.
pub const ADDRESS_SETTLE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum CommandId {
    SetLed = 1,
    GetLed = 2,
    SetAFwd = 3,
    SetARev = 4,
    GetA = 5,
    SetBFwd = 6,
    SetBRev = 7,
    GetB = 8,
    SetCFwd = 9,
    SetCRev = 10,
    GetC = 11,
    SetDFwd = 12,
    SetDRev = 13,
    GetD = 14,
    AllOff = 15,
    SetAllFwd = 16,
    SetAllRev = 17,
    SetFailSafe = 18,
    GetFailSafe = 19,
    ResetEpo = 20,
    GetEpo = 21,
    SetEpoIgnore = 22,
    GetEpoIgnore = 23,
    GetNewIr = 24,
    GetLastIr = 25,
    SetLedIr = 26,
    GetLedIr = 27,
    GetAnalog1 = 28,
    GetAnalog2 = 29,
    GetId = 0x99,
    SetI2cAddress = 0xAA,
}

impl CommandId {
    /// Number of bytes the board answers with for this command.
    pub fn response_len(self) -> usize {
        match self {
            CommandId::GetLastIr => LONG_LEN,
            _ => NORM_LEN,
        }
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({:#04x})", self, *self as u8)
    }
}

/// Direction byte echoed back by the motor Get commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Direction {
    Forward = 1,
    Reverse = 2,
}

/// On/off byte used by every flag register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Switch {
    Off = 0,
    On = 1,
}

/// Something that can be driven: a single motor or all four at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drive {
    Motor1,
    Motor2,
    Motor3,
    Motor4,
    All,
}

impl Drive {
    pub const MOTORS: [Drive; 4] = [Drive::Motor1, Drive::Motor2, Drive::Motor3, Drive::Motor4];

    /// Motor by its 1-based number as printed on the board.
    pub fn motor(number: u8) -> Option<Drive> {
        match number {
            1 => Some(Drive::Motor1),
            2 => Some(Drive::Motor2),
            3 => Some(Drive::Motor3),
            4 => Some(Drive::Motor4),
            _ => None,
        }
    }

    pub fn forward(self) -> CommandId {
        match self {
            Drive::Motor1 => CommandId::SetAFwd,
            Drive::Motor2 => CommandId::SetBFwd,
            Drive::Motor3 => CommandId::SetCFwd,
            Drive::Motor4 => CommandId::SetDFwd,
            Drive::All => CommandId::SetAllFwd,
        }
    }

    /// Always the opcode right after [`Drive::forward`].
    pub fn reverse(self) -> CommandId {
        match self {
            Drive::Motor1 => CommandId::SetARev,
            Drive::Motor2 => CommandId::SetBRev,
            Drive::Motor3 => CommandId::SetCRev,
            Drive::Motor4 => CommandId::SetDRev,
            Drive::All => CommandId::SetAllRev,
        }
    }

    /// Read-back command; the board has none for all motors at once.
    pub fn read(self) -> Option<CommandId> {
        match self {
            Drive::Motor1 => Some(CommandId::GetA),
            Drive::Motor2 => Some(CommandId::GetB),
            Drive::Motor3 => Some(CommandId::GetC),
            Drive::Motor4 => Some(CommandId::GetD),
            Drive::All => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame too short: need {needed} bytes, got {actual}")]
    ShortFrame { needed: usize, actual: usize },
    #[error("unknown motor direction {0:#04x}")]
    BadDirection(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn reverse_follows_forward() {
        for drive in Drive::MOTORS.into_iter().chain([Drive::All]) {
            assert_eq!(drive.reverse() as u8, drive.forward() as u8 + 1);
        }
    }

    #[test]
    fn get_follows_reverse() {
        for drive in Drive::MOTORS {
            assert_eq!(drive.read().map(|c| c as u8), Some(drive.reverse() as u8 + 1));
        }
        assert_eq!(Drive::All.read(), None);
    }

    #[test]
    fn opcodes_round_trip() {
        assert_eq!(CommandId::from_u8(0x99), Some(CommandId::GetId));
        assert_eq!(CommandId::from_u8(0xAA), Some(CommandId::SetI2cAddress));
        assert_eq!(CommandId::from_u8(29), Some(CommandId::GetAnalog2));
        assert_eq!(CommandId::from_u8(30), None);
        assert_eq!(CommandId::from_u8(0), None);
    }

    #[test]
    fn only_ir_read_is_long() {
        assert_eq!(CommandId::GetLastIr.response_len(), 24);
        assert_eq!(CommandId::GetId.response_len(), 4);
        assert_eq!(CommandId::GetA.response_len(), 4);
    }

    #[test]
    fn motor_numbers() {
        assert_eq!(Drive::motor(1), Some(Drive::Motor1));
        assert_eq!(Drive::motor(4), Some(Drive::Motor4));
        assert_eq!(Drive::motor(0), None);
        assert_eq!(Drive::motor(5), None);
    }
}
