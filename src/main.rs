mod cli;

use std::{fmt::Display, io, process};

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use json::JsonValue;
use log::error;

use zeroborg::board::{self, Flag, ZeroBorg};
use zeroborg::diag;
use zeroborg::port::{self, OpenBusError};
use zeroborg::protocol::{self, Drive};

use cli::{AddressRange, Cli, Commands, State};

#[derive(Clone, Copy)]
enum OutputFormat {
    Plain,
    Json,
}

fn slice_to_line<T>(data: &[T]) -> String
where
    T: Display,
{
    data.iter()
        .map(|x| x.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

fn slice_to_column<T>(data: &[T]) -> String
where
    T: Display,
{
    data.iter()
        .map(|x| x.to_string())
        .collect::<Vec<String>>()
        .join("\n")
}

fn on_off(state: bool) -> &'static str {
    if state {
        "on"
    } else {
        "off"
    }
}

/// Keeps unavailable readings as `None` but lets an interruption through.
fn available<T>(reading: board::Result<T>) -> Result<Option<T>> {
    match reading {
        Ok(v) => Ok(Some(v)),
        Err(board::Error::Unavailable) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn open_board(cli: &Cli) -> Result<ZeroBorg> {
    let force = cli.force;
    let sink = if cli.quiet {
        diag::no_print()
    } else {
        diag::log_sink()
    };

    let mut board = ZeroBorg::new(move |number| port::open_bus(number, force))
        .with_bus(cli.bus)
        .with_address(cli.address)?
        .with_sink(sink);

    if !board.init(!cli.no_fallback)? {
        return Err(anyhow!("ZeroBorg not found at {:#04x}", board.address()));
    }
    Ok(board)
}

fn cmd_buses(fmt: OutputFormat) -> Result<String> {
    let buses = port::available_buses();
    if buses.is_empty() {
        return Err(OpenBusError::NoBus.into());
    }

    Ok(match fmt {
        OutputFormat::Plain => slice_to_column(&buses),
        OutputFormat::Json => json::stringify(buses),
    })
}

fn cmd_scan(cli: &Cli, range: &Option<AddressRange>, fmt: OutputFormat) -> Result<String> {
    let range = range.clone().unwrap_or_else(AddressRange::full);
    let mut bus = port::open_bus(cli.bus, cli.force)
        .with_context(|| format!("Can't open bus {}", cli.bus))?;

    let found = protocol::scan(bus.as_mut(), range.range())?;

    Ok(match fmt {
        OutputFormat::Plain => slice_to_column(
            &found
                .iter()
                .map(|address| format!("{:#04x}", address))
                .collect::<Vec<_>>(),
        ),
        OutputFormat::Json => json::stringify(found),
    })
}

fn cmd_set_address(cli: &Cli, new: u8, old: Option<u8>) -> Result<String> {
    let mut bus = port::open_bus(cli.bus, cli.force)
        .with_context(|| format!("Can't open bus {}", cli.bus))?;

    let old = protocol::change_address(bus.as_mut(), new, old)?;
    Ok(format!("{:#04x} -> {:#04x}", old, new))
}

fn cmd_identify(board: &ZeroBorg, fmt: OutputFormat) -> Result<String> {
    Ok(match fmt {
        OutputFormat::Plain => format!(
            "ZeroBorg on bus {} at {:#04x}",
            board.bus_number(),
            board.address()
        ),
        OutputFormat::Json => {
            let mut info = JsonValue::new_object();
            info["bus"] = board.bus_number().into();
            info["address"] = board.address().into();
            json::stringify(info)
        }
    })
}

fn cmd_motor(
    board: &mut ZeroBorg,
    number: u8,
    power: Option<f64>,
    fmt: OutputFormat,
) -> Result<String> {
    let drive = Drive::motor(number).ok_or_else(|| anyhow!("No motor {}, use 1 to 4", number))?;

    match power {
        Some(power) => {
            board
                .set_motor(drive, power)
                .with_context(|| format!("Failed to set motor {}", number))?;
            Ok(String::new())
        }
        None => {
            let level = board
                .motor(drive)
                .with_context(|| format!("Failed to read motor {}", number))?;
            Ok(match fmt {
                OutputFormat::Plain => format!("{:.3}", level),
                OutputFormat::Json => json::stringify(level),
            })
        }
    }
}

fn cmd_motors(board: &mut ZeroBorg, power: Option<f64>, fmt: OutputFormat) -> Result<String> {
    match power {
        Some(power) => {
            board.set_motors(power).context("Failed to set motors")?;
            Ok(String::new())
        }
        None => {
            let levels = board.motors().context("Failed to read motors")?;
            Ok(match fmt {
                OutputFormat::Plain => slice_to_line(
                    &levels
                        .iter()
                        .map(|level| format!("{:.3}", level))
                        .collect::<Vec<_>>(),
                ),
                OutputFormat::Json => json::stringify(levels.to_vec()),
            })
        }
    }
}

fn cmd_flag(
    board: &mut ZeroBorg,
    flag: Flag,
    state: Option<State>,
    fmt: OutputFormat,
) -> Result<String> {
    match state {
        Some(State(state)) => {
            board
                .set_flag(flag, state)
                .with_context(|| format!("Failed to set {:?}", flag))?;
            Ok(String::new())
        }
        None => {
            let state = board
                .flag(flag)
                .with_context(|| format!("Failed to read {:?}", flag))?;
            Ok(match fmt {
                OutputFormat::Plain => on_off(state).to_string(),
                OutputFormat::Json => json::stringify(state),
            })
        }
    }
}

fn cmd_epo(board: &mut ZeroBorg, reset: bool, fmt: OutputFormat) -> Result<String> {
    if reset {
        board.reset_epo().context("Failed to reset EPO")?;
        return Ok(String::new());
    }

    let tripped = board.epo().context("Failed to read EPO")?;
    Ok(match fmt {
        OutputFormat::Plain => (if tripped { "tripped" } else { "clear" }).to_string(),
        OutputFormat::Json => json::stringify(tripped),
    })
}

fn cmd_ir(board: &mut ZeroBorg, fmt: OutputFormat) -> Result<String> {
    // reading the message clears the flag
    let new = board
        .has_new_ir_message()
        .context("Failed to read new IR message flag")?;
    let message = board.ir_message().context("Failed to read IR message")?;

    Ok(match fmt {
        OutputFormat::Plain => format!("{}{}", message, if new { " (new)" } else { "" }),
        OutputFormat::Json => {
            let mut ir = JsonValue::new_object();
            ir["new"] = new.into();
            ir["message"] = message.into();
            json::stringify(ir)
        }
    })
}

fn cmd_analog(board: &mut ZeroBorg, fmt: OutputFormat) -> Result<String> {
    let volts = [
        board.analog1().context("Failed to read analog input 1")?,
        board.analog2().context("Failed to read analog input 2")?,
    ];

    Ok(match fmt {
        OutputFormat::Plain => slice_to_line(
            &volts
                .iter()
                .map(|v| format!("{:.3}", v))
                .collect::<Vec<_>>(),
        ),
        OutputFormat::Json => json::stringify(volts.to_vec()),
    })
}

fn cmd_status(board: &mut ZeroBorg, fmt: OutputFormat) -> Result<String> {
    let mut fields: Vec<(String, JsonValue)> = vec![
        ("bus".to_string(), board.bus_number().into()),
        ("address".to_string(), format!("{:#04x}", board.address()).into()),
    ];

    for (n, drive) in Drive::MOTORS.into_iter().enumerate() {
        fields.push((format!("motor{}", n + 1), available(board.motor(drive))?.into()));
    }
    for (name, flag) in [
        ("led", Flag::Led),
        ("epo_ignore", Flag::EpoIgnore),
        ("led_ir", Flag::LedIr),
        ("comms_failsafe", Flag::CommsFailSafe),
    ] {
        fields.push((name.to_string(), available(board.flag(flag))?.into()));
    }
    fields.push(("epo".to_string(), available(board.epo())?.into()));
    fields.push((
        "new_ir".to_string(),
        available(board.has_new_ir_message())?.into(),
    ));
    fields.push(("analog1".to_string(), available(board.analog1())?.into()));
    fields.push(("analog2".to_string(), available(board.analog2())?.into()));

    Ok(match fmt {
        OutputFormat::Plain => fields
            .iter()
            .map(|(name, value)| {
                let shown = if value.is_null() {
                    "unavailable".to_string()
                } else if let Some(s) = value.as_str() {
                    s.to_string()
                } else if let Some(b) = value.as_bool() {
                    on_off(b).to_string()
                } else {
                    value.dump()
                };
                format!("{:<15} {}", name, shown)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let mut status = JsonValue::new_object();
            for (name, value) in fields {
                status[name.as_str()] = value;
            }
            json::stringify(status)
        }
    })
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "zeroborg-tool", &mut io::stdout());

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    match &cli.command {
        Commands::Buses => cmd_buses(fmt),
        Commands::Scan { range } => cmd_scan(&cli, range, fmt),
        Commands::SetAddress { new, old } => cmd_set_address(&cli, *new, *old),
        command => {
            let mut board = open_board(&cli)?;

            match command {
                Commands::Identify => cmd_identify(&board, fmt),
                Commands::Status => cmd_status(&mut board, fmt),
                Commands::Motor { number, power } => cmd_motor(&mut board, *number, *power, fmt),
                Commands::Motors { power } => cmd_motors(&mut board, *power, fmt),
                Commands::Off => board
                    .motors_off()
                    .map(|_| String::new())
                    .context("Failed to stop motors"),
                Commands::Led { state } => cmd_flag(&mut board, Flag::Led, *state, fmt),
                Commands::Epo { reset } => cmd_epo(&mut board, *reset, fmt),
                Commands::EpoIgnore { state } => {
                    cmd_flag(&mut board, Flag::EpoIgnore, *state, fmt)
                }
                Commands::LedIr { state } => cmd_flag(&mut board, Flag::LedIr, *state, fmt),
                Commands::Failsafe { state } => {
                    cmd_flag(&mut board, Flag::CommsFailSafe, *state, fmt)
                }
                Commands::Ir => cmd_ir(&mut board, fmt),
                Commands::Analog => cmd_analog(&mut board, fmt),
                _ => Err(anyhow!("unexpected command (this is a bug!)")),
            }
        }
    }
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => (),
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
