//! # Exoskeleton developer console
//!
//! Interactive shell for talking to the CANopen daemon directly. Lines starting with a node id
//! are sent as they are typed (`2 read 0x6063 0 i32`), other lines are shortcuts, see `help`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::path::PathBuf;
use structopt::{clap::AppSettings, StructOpt};

use comms_if::{
    eqpt::{
        co::Command,
        joint::{JointId, RawPosition},
    },
    net::{DeviceLink, LinkParams, Transport, DEFAULT_SOCKET_PATH},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Exo $ ";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "exo_console", about = "Send commands to the CANopen daemon")]
struct Args {
    /// Path to the daemon's command socket
    #[structopt(short, long, parse(from_os_str), default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// CAN bus tag prefixed to every command
    #[structopt(short, long, default_value = "1")]
    bus: u8,

    /// File the command history is kept in
    #[structopt(long, parse(from_os_str), default_value = "data/history.txt")]
    history: PathBuf,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Shortcuts accepted by the console.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(
    name = "",
    setting = AppSettings::NoBinaryName,
    setting = AppSettings::DisableVersion
)]
enum Shortcut {
    /// Read the actual position of a joint (lhip, lknee, rhip, rknee)
    #[structopt(name = "pos")]
    Pos { joint: JointId },

    /// Put a joint's node into operational
    #[structopt(name = "start")]
    Start { joint: JointId },

    /// Put a joint's node into pre-operational, disabling motion
    #[structopt(name = "preop")]
    Preop { joint: JointId },

    /// Move a joint to a raw position
    #[structopt(name = "move", setting = AppSettings::AllowNegativeNumbers)]
    Move { joint: JointId, position: i32 },

    /// Put every joint into pre-operational
    #[structopt(name = "stop")]
    Stop,

    /// Leave the console
    #[structopt(name = "exit")]
    Exit,
}

/// What a line typed into the console asks for.
#[derive(Debug, PartialEq)]
enum Input {
    Send(Vec<Command>),
    Exit,
    Nothing,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::from_args();

    let mut link = DeviceLink::connect(LinkParams {
        socket_path: args.socket.clone(),
        bus: args.bus,
        ..Default::default()
    })
    .wrap_err_with(|| format!("Could not connect to the daemon at {:?}", args.socket))?;

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(&args.history).is_err() {
        println!("No history detected");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                rl.add_history_entry(line.as_str()).ok();

                match parse(&line) {
                    Ok(Input::Send(cmds)) => {
                        for cmd in cmds.iter() {
                            send(&mut link, cmd)?;
                        }
                    }
                    Ok(Input::Exit) => break,
                    Ok(Input::Nothing) => (),
                    Err(msg) => println!("{}", msg),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(dir) = args.history.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    rl.save_history(&args.history)
        .wrap_err("Could not save the history")?;

    println!("Exiting...");
    link.close();

    Ok(())
}

/// Turn a line into the commands it asks for, or a message to show the user.
fn parse(line: &str) -> Result<Input, String> {
    let first = match line.split_whitespace().next() {
        Some(t) => t,
        None => return Ok(Input::Nothing),
    };

    // Lines starting with a node id are raw commands
    if first.parse::<u8>().is_ok() {
        return line
            .parse::<Command>()
            .map(|c| Input::Send(vec![c]))
            .map_err(|e| e.to_string());
    }

    let shortcut =
        Shortcut::from_iter_safe(line.split_whitespace()).map_err(|e| e.message)?;

    Ok(match shortcut {
        Shortcut::Pos { joint } => Input::Send(vec![joint.read_position()]),
        Shortcut::Start { joint } => Input::Send(vec![joint.start()]),
        Shortcut::Preop { joint } => Input::Send(vec![joint.preop()]),
        Shortcut::Move { joint, position } => {
            Input::Send(joint.move_burst(RawPosition(position)).to_vec())
        }
        Shortcut::Stop => Input::Send(JointId::ALL.iter().map(|j| j.preop()).collect()),
        Shortcut::Exit => Input::Exit,
    })
}

/// Send one command and print the response.
///
/// Only a lost link is an error, daemon errors are printed like any other response.
fn send(link: &mut DeviceLink, cmd: &Command) -> Result<()> {
    let response = link
        .request(cmd)
        .wrap_err_with(|| format!("Lost the link sending \"{}\"", cmd))?;

    println!("{} -> {}", cmd, response.raw());

    Ok(())
}
