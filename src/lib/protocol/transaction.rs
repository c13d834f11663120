use log::{debug, error, info, warn};
use std::{io, ops::RangeInclusive, thread};

use super::{
    CommandId, ProtocolError, ADDRESS_MAX, ADDRESS_MIN, ADDRESS_SETTLE, BOARD_ID, NORM_LEN,
};
use crate::port::{self, Transport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error(
        "address {0:#04x} is reserved, use an address between {min:#04x} and {max:#04x}",
        min = ADDRESS_MIN,
        max = ADDRESS_MAX
    )]
    BadAddress(u8),
    #[error("i2c transfer failed: {0}")]
    Transport(#[source] io::Error),
    #[error("expected {expected} byte reply, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error(
        "found a device at {address:#04x}, but it is not a ZeroBorg (id {id:#04x} instead of {expected:#04x})",
        expected = BOARD_ID
    )]
    WrongDevice { address: u8, id: u8 },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The host cancelled the operation, see [`port::cancelled`].
    #[error("interrupted")]
    Interrupted,
}

impl From<io::Error> for TransactionError {
    fn from(e: io::Error) -> Self {
        if port::is_cancelled(&e) {
            TransactionError::Interrupted
        } else {
            TransactionError::Transport(e)
        }
    }
}

#[derive(Error, Debug)]
pub enum AddressChangeError {
    #[error(
        "address {0:#04x} is reserved, use an address between {min:#04x} and {max:#04x}",
        min = ADDRESS_MIN,
        max = ADDRESS_MAX
    )]
    OutOfRange(u8),
    #[error("no ZeroBorg boards found, cannot set a new address")]
    NoBoard,
    #[error("missing ZeroBorg at {address:#04x}: {source}")]
    NotFound {
        address: u8,
        source: TransactionError,
    },
    #[error("failed to send new address to {address:#04x}: {source}")]
    Write {
        address: u8,
        source: TransactionError,
    },
    #[error("failed to set new address: board at {old:#04x} took the write but does not answer at {new:#04x} ({source})")]
    Ambiguous {
        old: u8,
        new: u8,
        source: TransactionError,
    },
    #[error("interrupted")]
    Interrupted,
}

/// Rejects addresses the board cannot be given.
pub fn check_address(address: u8) -> Result<u8, AddressChangeError> {
    if (ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
        Ok(address)
    } else {
        Err(AddressChangeError::OutOfRange(address))
    }
}

fn usable(address: u8) -> Result<(), TransactionError> {
    if (ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
        Ok(())
    } else {
        Err(TransactionError::BadAddress(address))
    }
}

pub fn write_command(
    bus: &mut dyn Transport,
    address: u8,
    command: CommandId,
    value: u8,
) -> Result<(), TransactionError> {
    usable(address)?;
    debug!("send {:#04x} {} {}", address, command, value);
    bus.write_byte(address, command as u8, value)?;
    Ok(())
}

/// Issues `command` and returns the reply, which is always exactly
/// `length` bytes long.
pub fn read_command(
    bus: &mut dyn Transport,
    address: u8,
    command: CommandId,
    length: usize,
) -> Result<Vec<u8>, TransactionError> {
    usable(address)?;
    debug!("read {:#04x} {} len {}", address, command, length);
    let frame = bus.read_block(address, command as u8, length)?;
    debug!("recv {:02X?}", frame);

    if frame.len() != length {
        return Err(TransactionError::LengthMismatch {
            expected: length,
            actual: frame.len(),
        });
    }
    Ok(frame)
}

/// Succeeds only if a ZeroBorg answers at `address`.
pub fn identify(bus: &mut dyn Transport, address: u8) -> Result<(), TransactionError> {
    let frame = read_command(bus, address, CommandId::GetId, NORM_LEN)?;

    if frame[1] == BOARD_ID {
        Ok(())
    } else {
        Err(TransactionError::WrongDevice {
            address,
            id: frame[1],
        })
    }
}

/// Addresses within `range` (clipped to the usable ones) that answer as a
/// ZeroBorg. A failed transfer only skips its address; cancellation
/// stops the scan early.
pub fn scan(
    bus: &mut dyn Transport,
    range: RangeInclusive<u8>,
) -> Result<Vec<u8>, TransactionError> {
    let start = (*range.start()).max(ADDRESS_MIN);
    let end = (*range.end()).min(ADDRESS_MAX);
    let mut found = Vec::new();

    for address in start..=end {
        match identify(bus, address) {
            Ok(()) => {
                info!("Found ZeroBorg at {:#04x}", address);
                found.push(address);
            }
            Err(TransactionError::Interrupted) => return Err(TransactionError::Interrupted),
            Err(e) => debug!("{:#04x}: {}", address, e),
        }
    }

    match found.len() {
        0 => warn!("No ZeroBorg boards found, is the bus number correct?"),
        1 => info!("1 ZeroBorg board found"),
        n => info!("{} ZeroBorg boards found", n),
    }
    Ok(found)
}

fn interrupted_or(
    e: TransactionError,
    f: impl FnOnce(TransactionError) -> AddressChangeError,
) -> AddressChangeError {
    match e {
        TransactionError::Interrupted => AddressChangeError::Interrupted,
        e => f(e),
    }
}

/// Moves a board from `old` (or the first board a scan finds) to `new`,
/// then checks it answers there. Returns the address it was moved from.
///
/// Nothing is rolled back if the final check fails.
pub fn change_address(
    bus: &mut dyn Transport,
    new: u8,
    old: Option<u8>,
) -> Result<u8, AddressChangeError> {
    check_address(new)?;

    let old = match old {
        Some(old) => check_address(old)?,
        None => scan(bus, ADDRESS_MIN..=ADDRESS_MAX)
            .map_err(|e| interrupted_or(e, |_| AddressChangeError::NoBoard))?
            .first()
            .copied()
            .ok_or(AddressChangeError::NoBoard)?,
    };

    info!("Changing address from {:#04x} to {:#04x}", old, new);

    identify(bus, old).map_err(|e| {
        interrupted_or(e, |source| AddressChangeError::NotFound {
            address: old,
            source,
        })
    })?;
    info!("Found ZeroBorg at {:#04x}", old);

    write_command(bus, old, CommandId::SetI2cAddress, new).map_err(|e| {
        interrupted_or(e, |source| AddressChangeError::Write {
            address: old,
            source,
        })
    })?;

    thread::sleep(ADDRESS_SETTLE);
    info!(
        "Address changed to {:#04x}, attempting to communicate on new address",
        new
    );

    match identify(bus, new) {
        Ok(()) => {
            info!("New address of {:#04x} set successfully", new);
            Ok(old)
        }
        Err(e) => {
            let e = interrupted_or(e, |source| AddressChangeError::Ambiguous { old, new, source });
            error!("{}", e);
            Err(e)
        }
    }
}
