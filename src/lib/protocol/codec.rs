use num_traits::FromPrimitive;
use std::fmt::Write;

use super::{
    CommandId, Direction, Drive, ProtocolError, Switch, ANALOG_MAX, ANALOG_REFERENCE,
    IR_MAX_BYTES, PWM_MAX,
};

fn frame_byte(frame: &[u8], index: usize) -> Result<u8, ProtocolError> {
    frame.get(index).copied().ok_or(ProtocolError::ShortFrame {
        needed: index + 1,
        actual: frame.len(),
    })
}

/// Splits a power level in `[-1.0, 1.0]` into the command to send and its
/// PWM byte. Zero (and NaN) always goes out as forward.
pub fn encode_motor_power(drive: Drive, power: f64) -> (CommandId, u8) {
    let scaled = (power.abs() * f64::from(PWM_MAX)).round();
    let pwm = if scaled.is_nan() {
        0
    } else {
        scaled.min(f64::from(PWM_MAX)) as u8
    };

    if power < 0.0 {
        (drive.reverse(), pwm)
    } else {
        (drive.forward(), pwm)
    }
}

/// Power level from a motor Get reply: `[_, direction, pwm, _]`.
pub fn decode_motor_power(frame: &[u8]) -> Result<f64, ProtocolError> {
    let direction = frame_byte(frame, 1)?;
    let power = f64::from(frame_byte(frame, 2)?) / f64::from(PWM_MAX);

    match Direction::from_u8(direction) {
        Some(Direction::Forward) => Ok(power),
        Some(Direction::Reverse) => Ok(-power),
        None => Err(ProtocolError::BadDirection(direction)),
    }
}

pub fn encode_switch(state: bool) -> u8 {
    if state {
        Switch::On as u8
    } else {
        Switch::Off as u8
    }
}

/// Anything but `Off` reads as set.
pub fn decode_flag(frame: &[u8]) -> Result<bool, ProtocolError> {
    Ok(frame_byte(frame, 1)? != Switch::Off as u8)
}

/// Voltage on an analog input, 10-bit big-endian reading against 3.3 V.
pub fn decode_analog(frame: &[u8]) -> Result<f64, ProtocolError> {
    let raw = (u16::from(frame_byte(frame, 1)?) << 8) | u16::from(frame_byte(frame, 2)?);
    Ok(f64::from(raw) / f64::from(ANALOG_MAX) * ANALOG_REFERENCE)
}

/// Hex dump of the IR payload with trailing `'0'` characters removed.
///
/// The strip works on characters, not bytes, so `...80 00` comes out as
/// `...8`. Remote-control tools built for this board expect that form.
pub fn decode_ir_message(frame: &[u8]) -> Result<String, ProtocolError> {
    let payload = frame
        .get(1..=IR_MAX_BYTES)
        .ok_or(ProtocolError::ShortFrame {
            needed: IR_MAX_BYTES + 1,
            actual: frame.len(),
        })?;

    let mut message = String::with_capacity(2 * IR_MAX_BYTES);
    for byte in payload {
        // writing into a String cannot fail
        let _ = write!(message, "{:02X}", byte);
    }

    let trimmed = message.trim_end_matches('0').len();
    message.truncate(trimmed);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LONG_LEN, NORM_LEN};

    fn motor_frame(command: CommandId, drive: Drive, pwm: u8) -> [u8; NORM_LEN] {
        let direction = if command == drive.forward() {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        [0, direction as u8, pwm, 0]
    }

    #[test]
    fn encode_zero_is_forward() {
        assert_eq!(
            encode_motor_power(Drive::Motor1, 0.0),
            (CommandId::SetAFwd, 0)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor1, -0.0),
            (CommandId::SetAFwd, 0)
        );
        assert_eq!(encode_motor_power(Drive::All, 0.0), (CommandId::SetAllFwd, 0));
    }

    #[test]
    fn encode_direction_and_magnitude() {
        assert_eq!(
            encode_motor_power(Drive::Motor2, 0.75),
            (CommandId::SetBFwd, 191)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor3, -0.5),
            (CommandId::SetCRev, 128)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor4, 1.0),
            (CommandId::SetDFwd, 255)
        );
        assert_eq!(
            encode_motor_power(Drive::All, -1.0),
            (CommandId::SetAllRev, 255)
        );
    }

    #[test]
    fn encode_clamps_out_of_range() {
        assert_eq!(
            encode_motor_power(Drive::Motor1, 1.5),
            (CommandId::SetAFwd, 255)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor1, -7.0),
            (CommandId::SetARev, 255)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor1, f64::INFINITY),
            (CommandId::SetAFwd, 255)
        );
        assert_eq!(
            encode_motor_power(Drive::Motor1, f64::NAN),
            (CommandId::SetAFwd, 0)
        );
    }

    #[test]
    fn motor_power_round_trip() {
        for step in -100..=100 {
            let power = f64::from(step) / 100.0;
            let (command, pwm) = encode_motor_power(Drive::Motor1, power);
            let decoded = decode_motor_power(&motor_frame(command, Drive::Motor1, pwm)).unwrap();
            assert!(
                (decoded - power).abs() <= 1.0 / 255.0,
                "{} decoded as {}",
                power,
                decoded
            );
        }
    }

    #[test]
    fn decode_motor_directions() {
        assert_eq!(decode_motor_power(&[5, 1, 255, 0]), Ok(1.0));
        assert_eq!(decode_motor_power(&[5, 2, 255, 0]), Ok(-1.0));
        assert_eq!(decode_motor_power(&[5, 1, 0, 0]), Ok(0.0));
        assert_eq!(
            decode_motor_power(&[5, 0, 10, 0]),
            Err(ProtocolError::BadDirection(0))
        );
        assert_eq!(
            decode_motor_power(&[5, 3, 10, 0]),
            Err(ProtocolError::BadDirection(3))
        );
        assert_eq!(
            decode_motor_power(&[5, 1]),
            Err(ProtocolError::ShortFrame {
                needed: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn flags() {
        assert_eq!(decode_flag(&[2, 0, 0, 0]), Ok(false));
        for value in [1u8, 2, 0x7F, 255] {
            assert_eq!(decode_flag(&[2, value, 0, 0]), Ok(true));
        }
        assert!(decode_flag(&[2]).is_err());
        assert_eq!(encode_switch(true), 1);
        assert_eq!(encode_switch(false), 0);
    }

    #[test]
    fn analog_voltage() {
        assert_eq!(decode_analog(&[28, 0x00, 0x00, 0]), Ok(0.0));
        assert_eq!(decode_analog(&[28, 0x03, 0xFF, 0]), Ok(3.3));

        let half = decode_analog(&[29, 0x02, 0x00, 0]).unwrap();
        assert!((half - 512.0 / 1023.0 * 3.3).abs() < 1e-12);
    }

    #[test]
    fn ir_message_strips_trailing_nibbles() {
        let mut frame = [0u8; LONG_LEN];
        frame[0] = CommandId::GetLastIr as u8;
        frame[1..6].copy_from_slice(&[0xF7, 0x5A, 0xD5, 0xAA, 0x80]);

        assert_eq!(decode_ir_message(&frame).unwrap(), "F75AD5AA8");
    }

    #[test]
    fn ir_message_keeps_interior_zeros() {
        let mut frame = [0u8; LONG_LEN];
        frame[1..5].copy_from_slice(&[0x10, 0x00, 0x00, 0x01]);
        assert_eq!(decode_ir_message(&frame).unwrap(), "10000001");

        // last payload byte is frame[22]; frame[23] is outside the message
        let mut frame = [0u8; LONG_LEN];
        frame[22] = 0xAB;
        frame[23] = 0xCD;
        assert_eq!(
            decode_ir_message(&frame).unwrap(),
            format!("{}AB", "00".repeat(21))
        );
    }

    #[test]
    fn ir_message_empty_and_short() {
        assert_eq!(decode_ir_message(&[0u8; LONG_LEN]).unwrap(), "");
        assert_eq!(
            decode_ir_message(&[0u8; NORM_LEN]),
            Err(ProtocolError::ShortFrame {
                needed: 23,
                actual: 4
            })
        );
    }
}
