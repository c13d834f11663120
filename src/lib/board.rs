//! One ZeroBorg board on one I²C bus.
//!
//! Every call is a single blocking bus transaction. A failed transaction is
//! reported through the session's [`Sink`] and comes back as
//! [`Error::Unavailable`]; the session stays usable afterwards. Transfers
//! cancelled by the host ([`crate::port::cancelled`]) are never reported,
//! they come back as [`Error::Interrupted`] so the caller can stop.
//!
//! A session is not synchronised. Callers sharing one between threads
//! must serialise access themselves.

use std::io;
use thiserror::Error;

use crate::diag::{self, Sink};
use crate::port::{self, Transport};
use crate::protocol::{
    self, check_address, decode_analog, decode_flag, decode_ir_message, decode_motor_power,
    encode_motor_power, encode_switch, AddressChangeError, CommandId, Drive, ProtocolError,
    TransactionError, DEFAULT_ADDRESS, DEFAULT_BUS,
};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transaction failed; the reason went to the diagnostic sink.
    #[error("board unavailable")]
    Unavailable,
    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Opens a bus by number.
pub type Opener = Box<dyn FnMut(u8) -> io::Result<Box<dyn Transport>>>;

/// On/off settings the board can both store and report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Led,
    EpoIgnore,
    LedIr,
    CommsFailSafe,
}

impl Flag {
    fn set_command(self) -> CommandId {
        match self {
            Flag::Led => CommandId::SetLed,
            Flag::EpoIgnore => CommandId::SetEpoIgnore,
            Flag::LedIr => CommandId::SetLedIr,
            Flag::CommsFailSafe => CommandId::SetFailSafe,
        }
    }

    fn get_command(self) -> CommandId {
        match self {
            Flag::Led => CommandId::GetLed,
            Flag::EpoIgnore => CommandId::GetEpoIgnore,
            Flag::LedIr => CommandId::GetLedIr,
            Flag::CommsFailSafe => CommandId::GetFailSafe,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Flag::Led => "LED state",
            Flag::EpoIgnore => "EPO ignore state",
            Flag::LedIr => "LED IR state",
            Flag::CommsFailSafe => "communications failsafe state",
        }
    }
}

fn other_bus(number: u8) -> u8 {
    if number == 0 {
        1
    } else {
        0
    }
}

fn not_open() -> TransactionError {
    TransactionError::Transport(io::Error::new(
        io::ErrorKind::NotConnected,
        "bus not open, call init first",
    ))
}

pub struct ZeroBorg {
    bus_number: u8,
    address: u8,
    found_chip: bool,
    bus: Option<Box<dyn Transport>>,
    open: Opener,
    sink: Sink,
}

impl ZeroBorg {
    pub fn new<F>(open: F) -> Self
    where
        F: FnMut(u8) -> io::Result<Box<dyn Transport>> + 'static,
    {
        Self {
            bus_number: DEFAULT_BUS,
            address: DEFAULT_ADDRESS,
            found_chip: false,
            bus: None,
            open: Box::new(open),
            sink: diag::stdout_sink(),
        }
    }

    pub fn with_bus(mut self, number: u8) -> Self {
        self.bus_number = number;
        self
    }

    pub fn with_address(mut self, address: u8) -> std::result::Result<Self, AddressChangeError> {
        self.address = check_address(address)?;
        Ok(self)
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Sink) {
        self.sink = sink;
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Result of the last [`ZeroBorg::init`]; not refreshed by other calls.
    pub fn found_chip(&self) -> bool {
        self.found_chip
    }

    pub fn print(&self, message: &str) {
        (self.sink)(message)
    }

    /// Opens the bus and looks for the board. If it is missing and
    /// `try_other_bus` is set, switches to the other bus (0 or 1) and
    /// tries exactly once more.
    pub fn init(&mut self, try_other_bus: bool) -> Result<bool> {
        let attempts = if try_other_bus { 2 } else { 1 };
        self.found_chip = false;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.bus_number = other_bus(self.bus_number);
                self.print(&format!("Trying bus number {} instead.", self.bus_number));
            }

            self.found_chip = self.probe()?;
            if self.found_chip {
                break;
            }
            self.print("ZeroBorg not found.");
        }

        Ok(self.found_chip)
    }

    fn probe(&mut self) -> Result<bool> {
        self.print(&format!(
            "Loading ZeroBorg on bus {}, address {:#04x}.",
            self.bus_number, self.address
        ));

        self.bus = match (self.open)(self.bus_number) {
            Ok(bus) => Some(bus),
            Err(e) if port::is_cancelled(&e) => return Err(Error::Interrupted),
            Err(e) => {
                self.print(&format!("Cannot open bus {}: {}", self.bus_number, e));
                None
            }
        };

        let address = self.address;
        let identity = match self.bus.as_mut() {
            Some(bus) => protocol::identify(bus.as_mut(), address),
            None => return Ok(false),
        };

        match identity {
            Ok(()) => {
                self.print(&format!("Found ZeroBorg at {:#04x}.", address));
                Ok(true)
            }
            Err(TransactionError::Interrupted) => Err(Error::Interrupted),
            Err(e @ TransactionError::WrongDevice { .. }) => {
                self.print(&format!("{}.", e));
                Ok(false)
            }
            Err(e) => {
                self.print(&format!("Missing ZeroBorg at {:#04x} ({}).", address, e));
                Ok(false)
            }
        }
    }

    fn settle<T>(&self, what: &str, res: std::result::Result<T, TransactionError>) -> Result<T> {
        match res {
            Ok(v) => Ok(v),
            Err(TransactionError::Interrupted) => Err(Error::Interrupted),
            Err(e) => {
                self.print(&format!("Failed {}: {}", what, e));
                Err(Error::Unavailable)
            }
        }
    }

    fn write(&mut self, command: CommandId, value: u8, what: &str) -> Result<()> {
        let address = self.address;
        let res = match self.bus.as_mut() {
            Some(bus) => protocol::write_command(bus.as_mut(), address, command, value),
            None => Err(not_open()),
        };
        self.settle(what, res)
    }

    fn read<T>(
        &mut self,
        command: CommandId,
        what: &str,
        decode: fn(&[u8]) -> std::result::Result<T, ProtocolError>,
    ) -> Result<T> {
        let address = self.address;
        let res = match self.bus.as_mut() {
            Some(bus) => {
                protocol::read_command(bus.as_mut(), address, command, command.response_len())
            }
            None => Err(not_open()),
        }
        .and_then(|frame| decode(&frame).map_err(TransactionError::from));
        self.settle(what, res)
    }

    /// Sets a drive level from -1.0 (full reverse) to +1.0 (full forward).
    pub fn set_motor(&mut self, drive: Drive, power: f64) -> Result<()> {
        let (command, pwm) = encode_motor_power(drive, power);
        self.write(command, pwm, "setting motor drive level")
    }

    pub fn set_motor1(&mut self, power: f64) -> Result<()> {
        self.set_motor(Drive::Motor1, power)
    }

    pub fn set_motor2(&mut self, power: f64) -> Result<()> {
        self.set_motor(Drive::Motor2, power)
    }

    pub fn set_motor3(&mut self, power: f64) -> Result<()> {
        self.set_motor(Drive::Motor3, power)
    }

    pub fn set_motor4(&mut self, power: f64) -> Result<()> {
        self.set_motor(Drive::Motor4, power)
    }

    /// Same level on all four motors in one transaction.
    pub fn set_motors(&mut self, power: f64) -> Result<()> {
        self.set_motor(Drive::All, power)
    }

    pub fn motors_off(&mut self) -> Result<()> {
        self.write(CommandId::AllOff, 0, "sending motors off command")
    }

    /// Drive level as last set, from -1.0 to +1.0.
    pub fn motor(&mut self, drive: Drive) -> Result<f64> {
        match drive.read() {
            Some(command) => self.read(command, "reading motor drive level", decode_motor_power),
            None => {
                self.print("Failed reading motor drive level: read each motor separately");
                Err(Error::Unavailable)
            }
        }
    }

    pub fn motor1(&mut self) -> Result<f64> {
        self.motor(Drive::Motor1)
    }

    pub fn motor2(&mut self) -> Result<f64> {
        self.motor(Drive::Motor2)
    }

    pub fn motor3(&mut self) -> Result<f64> {
        self.motor(Drive::Motor3)
    }

    pub fn motor4(&mut self) -> Result<f64> {
        self.motor(Drive::Motor4)
    }

    /// All four drive levels, one transaction each.
    pub fn motors(&mut self) -> Result<[f64; 4]> {
        let mut levels = [0.0; 4];
        for (level, drive) in levels.iter_mut().zip(Drive::MOTORS) {
            *level = self.motor(drive)?;
        }
        Ok(levels)
    }

    pub fn set_flag(&mut self, flag: Flag, state: bool) -> Result<()> {
        let what = format!("sending {}", flag.describe());
        self.write(flag.set_command(), encode_switch(state), &what)
    }

    pub fn flag(&mut self, flag: Flag) -> Result<bool> {
        let what = format!("reading {}", flag.describe());
        self.read(flag.get_command(), &what, decode_flag)
    }

    pub fn set_led(&mut self, state: bool) -> Result<()> {
        self.set_flag(Flag::Led, state)
    }

    pub fn led(&mut self) -> Result<bool> {
        self.flag(Flag::Led)
    }

    /// Clears a tripped EPO latch so the motors can run again.
    pub fn reset_epo(&mut self) -> Result<()> {
        self.write(CommandId::ResetEpo, 0, "resetting EPO")
    }

    /// True once the EPO has tripped; motors stay off until
    /// [`ZeroBorg::reset_epo`] unless the EPO is ignored.
    pub fn epo(&mut self) -> Result<bool> {
        self.read(CommandId::GetEpo, "reading EPO latch state", decode_flag)
    }

    /// Set when no EPO switch is fitted.
    pub fn set_epo_ignore(&mut self, state: bool) -> Result<()> {
        self.set_flag(Flag::EpoIgnore, state)
    }

    /// Decodes the byte the board returns, so this reports the real state.
    pub fn epo_ignore(&mut self) -> Result<bool> {
        self.flag(Flag::EpoIgnore)
    }

    /// When set, incoming IR messages blink the LED.
    pub fn set_led_ir(&mut self, state: bool) -> Result<()> {
        self.set_flag(Flag::LedIr, state)
    }

    pub fn led_ir(&mut self) -> Result<bool> {
        self.flag(Flag::LedIr)
    }

    pub fn has_new_ir_message(&mut self) -> Result<bool> {
        self.read(
            CommandId::GetNewIr,
            "reading new IR message received flag",
            decode_flag,
        )
    }

    /// Last IR message as hex, e.g. `F75AD5AA8`. Clears the new message flag.
    pub fn ir_message(&mut self) -> Result<String> {
        self.read(CommandId::GetLastIr, "reading IR message", decode_ir_message)
    }

    /// Voltage on port #1 (pin 2).
    pub fn analog1(&mut self) -> Result<f64> {
        self.read(CommandId::GetAnalog1, "reading analog level", decode_analog)
    }

    /// Voltage on port #2 (pin 4).
    pub fn analog2(&mut self) -> Result<f64> {
        self.read(CommandId::GetAnalog2, "reading analog level", decode_analog)
    }

    /// When enabled the board stops the motors unless commanded at least
    /// every quarter second. Disabled at power on.
    pub fn set_comms_failsafe(&mut self, state: bool) -> Result<()> {
        self.set_flag(Flag::CommsFailSafe, state)
    }

    pub fn comms_failsafe(&mut self) -> Result<bool> {
        self.flag(Flag::CommsFailSafe)
    }
}
