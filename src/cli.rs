use anyhow::Result;
use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

use zeroborg::protocol::{ADDRESS_MAX, ADDRESS_MIN};

#[derive(Error, Debug)]
pub enum ArgError {
    #[error("invalid address '{0}'")]
    BadAddress(String),
    #[error("invalid range '{0}'")]
    BadRange(String),
    #[error("invalid state '{0}', expected on or off")]
    BadState(String),
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_address(input: &str) -> Result<u8, ArgError> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| ArgError::BadAddress(input.to_string()))
}

#[derive(Debug, Clone)]
pub struct AddressRange(RangeInclusive<u8>);

impl AddressRange {
    pub fn full() -> Self {
        AddressRange(ADDRESS_MIN..=ADDRESS_MAX)
    }

    pub fn range(&self) -> RangeInclusive<u8> {
        self.0.clone()
    }
}

impl FromStr for AddressRange {
    type Err = ArgError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^((?:0[xX])?[[:xdigit:]]+)(?:-((?:0[xX])?[[:xdigit:]]+))?$")
                    .unwrap();
        }

        let bad = || ArgError::BadRange(input.to_string());
        let c = RE.captures(input).ok_or_else(bad)?;

        let first = c
            .get(1)
            .map(|m| parse_address(m.as_str()))
            .ok_or_else(bad)?
            .map_err(|_| bad())?;
        let second = match c.get(2) {
            Some(m) => parse_address(m.as_str()).map_err(|_| bad())?,
            None => first,
        };

        Ok(AddressRange(
            cmp::min(first, second)..=cmp::max(first, second),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State(pub bool);

impl FromStr for State {
    type Err = ArgError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(State(true)),
            "off" | "false" | "0" => Ok(State(false)),
            _ => Err(ArgError::BadState(input.to_string())),
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Open the bus even if another process holds it
    #[clap(long, short)]
    pub force: bool,

    /// Enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Suppress board diagnostics
    #[clap(long, short)]
    pub quiet: bool,

    /// I2C bus number
    #[clap(long, short, default_value_t = 1)]
    pub bus: u8,

    /// Board address (decimal or 0x hex)
    #[clap(long, short, default_value = "0x40", parse(try_from_str = parse_address))]
    pub address: u8,

    /// Do not retry on the other bus if the board is missing
    #[clap(long)]
    pub no_fallback: bool,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List i2c buses present on this machine
    Buses,

    /// Scan the bus for boards
    Scan {
        /// Address or address range, e.g. 0x10-0x20 (default: all usable)
        range: Option<AddressRange>,
    },

    /// Check that a board answers at the configured address
    Identify,

    /// Move a board to a new address
    SetAddress {
        #[clap(parse(try_from_str = parse_address))]
        new: u8,

        /// Current address; the first board found is used if omitted
        #[clap(long, parse(try_from_str = parse_address))]
        old: Option<u8>,
    },

    /// Read every setting and input
    Status,

    /// Read or set one motor's drive level (-1.0 .. 1.0)
    Motor {
        number: u8,
        #[clap(allow_hyphen_values = true)]
        power: Option<f64>,
    },

    /// Read all motors or set them to the same level
    Motors {
        #[clap(allow_hyphen_values = true)]
        power: Option<f64>,
    },

    /// Stop all motors
    Off,

    /// Read or set the LED
    Led { state: Option<State> },

    /// Read the EPO latch or reset it
    Epo {
        #[clap(long)]
        reset: bool,
    },

    /// Read or set whether the EPO is ignored
    EpoIgnore { state: Option<State> },

    /// Read or set whether IR messages blink the LED
    LedIr { state: Option<State> },

    /// Read or set the communications failsafe
    Failsafe { state: Option<State> },

    /// Read the last IR message
    Ir,

    /// Read both analog inputs
    Analog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("64").unwrap(), 0x40);
        assert_eq!(parse_address("0x40").unwrap(), 0x40);
        assert_eq!(parse_address("0X7f").unwrap(), 0x7F);
        assert!(parse_address("0x100").is_err());
        assert!(parse_address("forty").is_err());
    }

    #[test]
    fn ranges() {
        assert_eq!("0x03-0x77".parse::<AddressRange>().unwrap().range(), 3..=0x77);
        assert_eq!("20-10".parse::<AddressRange>().unwrap().range(), 10..=20);
        assert_eq!("0x40".parse::<AddressRange>().unwrap().range(), 0x40..=0x40);
        assert!("3-".parse::<AddressRange>().is_err());
        assert!("0x03-0x177".parse::<AddressRange>().is_err());
        assert_eq!(AddressRange::full().range(), 3..=0x77);
    }

    #[test]
    fn states() {
        assert_eq!("on".parse::<State>().unwrap(), State(true));
        assert_eq!("OFF".parse::<State>().unwrap(), State(false));
        assert_eq!("1".parse::<State>().unwrap(), State(true));
        assert!("maybe".parse::<State>().is_err());
    }

    #[test]
    fn negative_power() {
        let cli = Cli::try_parse_from(["zeroborg-tool", "-a", "0x10", "motor", "2", "-0.5"]).unwrap();
        assert_eq!(cli.address, 0x10);
        match cli.command {
            Commands::Motor { number, power } => {
                assert_eq!(number, 2);
                assert_eq!(power, Some(-0.5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
