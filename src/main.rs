//! destra-rs - command-line entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use destra_rs::{
    config::{DestraConfig, CONFIG_FILE},
    logging,
    protocol::{channel, TransportSession, TypeCodec, TypeTag},
    SymbolResolver, Variable, VariableTable,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "destra-rs", version, about = "Serial peek/poke debugger")]
struct Args {
    /// Config file (defaults apply when missing)
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports, likely targets first
    Ports,
    /// List variables resolved from an ELF image
    List {
        elf: PathBuf,
        /// Case-insensitive glob, e.g. "*pin*"
        pattern: Option<String>,
        /// Print the full table as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Read a variable from the target
    Peek {
        elf: PathBuf,
        variable: String,
        port: Option<String>,
    },
    /// Write a variable on the target
    Poke {
        elf: PathBuf,
        variable: String,
        value: String,
        port: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DestraConfig::load_or_default(&args.config);
    let _log_guard = logging::init(&config.logging).context("Failed to initialise logging")?;

    match args.command {
        Command::Ports => ports(),
        Command::List { elf, pattern, json } => list(&elf, pattern.as_deref(), json),
        Command::Peek {
            elf,
            variable,
            port,
        } => {
            let table = load(&elf)?;
            let var = lookup(&table, &variable)?;
            let mut session = connect(&config, port)?;
            let value = session.peek_variable(var)?;
            println!("{} = {}", var.name, value);
            Ok(())
        }
        Command::Poke {
            elf,
            variable,
            value,
            port,
        } => {
            let table = load(&elf)?;
            let var = lookup(&table, &variable)?;
            let tag: TypeTag = var
                .base_type
                .parse()
                .with_context(|| format!("{} cannot be poked as a value", var.name))?;
            let value = TypeCodec::parse_value(&value, tag)?;
            let mut session = connect(&config, port)?;
            session.poke_variable(var, &value)?;
            println!("{} <- {}", var.name, value);
            Ok(())
        }
    }
}

fn ports() -> Result<()> {
    let detected = channel::detect_ports()?;
    if detected.candidates.is_empty() && detected.others.is_empty() {
        println!("No serial ports found");
    }
    for port in &detected.candidates {
        println!("* {}  {}", port.name, port.description);
    }
    for port in &detected.others {
        println!("  {}  {}", port.name, port.description);
    }
    Ok(())
}

fn list(elf: &Path, pattern: Option<&str>, json: bool) -> Result<()> {
    let table = load(elf)?;
    if json {
        println!("{}", table.to_json()?);
        return Ok(());
    }
    for name in table.list(pattern) {
        if let Some(var) = table.get(name) {
            println!("{}", var);
        }
    }
    Ok(())
}

fn load(elf: &Path) -> Result<VariableTable> {
    SymbolResolver::build(elf).with_context(|| format!("Failed to load {}", elf.display()))
}

fn lookup<'t>(table: &'t VariableTable, name: &str) -> Result<&'t Variable> {
    match table.get(name) {
        Some(var) => Ok(var),
        None => bail!("No variable named '{}'", name),
    }
}

fn connect(config: &DestraConfig, port: Option<String>) -> Result<TransportSession> {
    let port = match port.or_else(|| config.serial.port.clone()) {
        Some(port) => port,
        None => channel::auto_detect_port()?,
    };
    let mut session = TransportSession::new(config.serial.clone());
    session
        .connect(&port, config.serial.baud_rate)
        .with_context(|| format!("Failed to connect to {}", port))?;
    Ok(session)
}
