mod loader;

use clap::Parser;
use loader::Image;
use log::{error, info};
use phobos_core::observer::InstructionLogger;
use phobos_core::{Config, Simulator, WordWidth};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stderrlog::LogLevelNum;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// ELF file to execute.
    elf: PathBuf,
    /// Base integer width (32 or 64). Defaults to the class of the ELF file.
    #[arg(long, value_parser = parse_xlen)]
    xlen: Option<WordWidth>,
    /// Stop after this many retired instructions.
    #[arg(long)]
    ilimit: Option<u64>,
    /// Number of ticks run between checks of the stop condition.
    #[arg(long, default_value_t = Config::default().quantum)]
    quantum: u64,
    /// Width of a vector register in bits.
    #[arg(long, default_value_t = Config::default().vlen)]
    vlen: u32,
    /// Stop when a `wfi` instruction retires.
    #[arg(long)]
    stop_on_wfi: bool,
    /// Address of the `tohost` word. Defaults to the `tohost` symbol of the ELF file.
    #[arg(long, value_parser = parse_address)]
    tohost: Option<u64>,
    /// Write the `begin_signature..end_signature` region to this file after the run.
    #[arg(long)]
    signature: Option<PathBuf>,
    /// Log every retired instruction (implies -v).
    #[arg(long)]
    trace: bool,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_xlen(value: &str) -> Result<WordWidth, String> {
    match value {
        "32" => Ok(WordWidth::W32),
        "64" => Ok(WordWidth::W64),
        _ => Err(format!("expected 32 or 64, got {value}")),
    }
}

fn parse_address(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|error| format!("invalid address {value}: {error}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose.max(args.trace as u8) {
        0 => LogLevelNum::Warn,
        1 => LogLevelNum::Info,
        2 => LogLevelNum::Debug,
        _ => LogLevelNum::Trace,
    };
    if let Err(error) = stderrlog::new()
        .verbosity(level)
        .modules([module_path!(), "phobos_core"])
        .init()
    {
        eprintln!("cannot initialize logging: {error}");
    }

    match run(args) {
        Ok(exit_code) => {
            info!("Exit code {exit_code}");
            ExitCode::from(exit_status(exit_code))
        }
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

/// Process exit status for a simulated exit code. Codes a process cannot report fail with 1
/// rather than wrapping, which could turn them into success.
fn exit_status(exit_code: i64) -> u8 {
    u8::try_from(exit_code).unwrap_or(1)
}

fn run(args: Args) -> Result<i64, Box<dyn Error>> {
    let bytes = fs::read(&args.elf)?;
    let image = Image::parse(&bytes)?;

    let xlen = args.xlen.unwrap_or(if image.is_64 {
        WordWidth::W64
    } else {
        WordWidth::W32
    });
    let config = Config {
        xlen,
        reset_vector: image.entry,
        vlen: args.vlen,
        quantum: args.quantum,
        ilimit: args.ilimit,
        stop_on_wfi: args.stop_on_wfi,
        tohost: args.tohost.or(image.tohost),
        ..Config::default()
    };

    let mut simulator = Simulator::new(config)?;
    image.load(&mut simulator)?;
    if args.trace {
        simulator.add_observer(Box::new(InstructionLogger))?;
    }

    while !simulator.is_stopped() {
        simulator.run_quantum()?;
    }
    let exit_code = simulator.hart().sim.exit_code;

    if let Some(path) = &args.signature {
        match image.signature {
            Some((begin, end)) => write_signature(&simulator, path, begin, end)?,
            None => error!("No signature symbols in {}", args.elf.display()),
        }
    }
    Ok(exit_code)
}

/// Dumps the signature region as one 32-bit hex word per line.
fn write_signature(
    simulator: &Simulator,
    path: &Path,
    begin: u64,
    end: u64,
) -> Result<(), Box<dyn Error>> {
    let mut file = fs::File::create(path)?;
    let memory = &simulator.hart().memory;
    for address in (begin..end).step_by(4) {
        writeln!(file, "{:08x}", memory.read_word(address)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        assert_eq!(0, exit_status(0));
        assert_eq!(3, exit_status(3));
        assert_eq!(255, exit_status(255));
        assert_eq!(1, exit_status(256));
        assert_eq!(1, exit_status(-1));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(Ok(0x8000_1000), parse_address("0x80001000"));
        assert_eq!(Ok(4096), parse_address("4096"));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_parse_xlen() {
        assert_eq!(Ok(WordWidth::W64), parse_xlen("64"));
        assert!(parse_xlen("128").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["phobos", "--xlen", "32", "--trace", "-vv", "prog.elf"])
            .unwrap();
        assert_eq!(Some(WordWidth::W32), args.xlen);
        assert_eq!(2, args.verbose);
        assert!(args.trace);
        assert_eq!(Config::default().quantum, args.quantum);
    }
}
