use std::fs::File;
use std::io::Write as _;
use std::net::TcpListener;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{info, warn};
use thiserror::Error;

use rvsim_core::hart::{format_commit, Hart, StepEvent};
use rvsim_core::loader::{self, LoaderError};
use rvsim_core::memory::{DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE};
use rvsim_core::signature::{self, Granularity, SignatureError};

use rvsim_cli::gdb::run_server;
use rvsim_cli::target::SimTarget;
use rvsim_cli::tcp::TcpStream;

/// The instruction set this core executes. Only RV32I + M + A (+ the Zicsr CSR access
/// instructions, always present) is implemented; anything else is rejected before any execution
/// begins, per §7's "operator errors are fatal before execution" rule.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Isa {
    #[value(name = "rv32ima")]
    Rv32ima,
    #[value(name = "rv32ima_zicsr")]
    Rv32imaZicsr,
}

#[derive(Parser, Debug)]
#[command(version, about = "A cycle-approximate RV32IMA + Zicsr interpreter with a GDB stub")]
struct Args {
    /// Instruction set to execute.
    #[arg(long, value_enum, default_value_t = Isa::Rv32imaZicsr)]
    isa: Isa,

    /// Enable the guest-architected commit trace.
    #[arg(long = "log-commits", visible_alias = "trace")]
    log_commits: bool,

    /// Commit trace output path.
    #[arg(long = "log", default_value = "sim_trace.txt")]
    log_path: String,

    /// Enable signature extraction to the given file, for architectural compliance testing.
    #[arg(long = "signature")]
    signature: Option<String>,

    /// Bytes per signature word.
    #[arg(long = "signature-granularity", default_value_t = 4)]
    signature_granularity: u32,

    /// Physical memory window as `base:size`, both hexadecimal (e.g. `80000000:200000`).
    #[arg(short = 'm', value_parser = parse_mem_range)]
    mem: Option<(u32, u32)>,

    /// Instruction cap; 0 means unlimited.
    #[arg(long, default_value_t = 0)]
    instructions: u64,

    /// Start a GDB Remote Serial Protocol server instead of free-running.
    #[arg(long)]
    gdb: bool,

    /// TCP port for the GDB server.
    #[arg(long = "gdb-port", default_value_t = 3333)]
    gdb_port: u16,

    /// Increase host diagnostic verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease host diagnostic verbosity; only warnings and errors are logged.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Program image to load (ELF or raw binary).
    program: String,
}

fn parse_mem_range(s: &str) -> Result<(u32, u32), String> {
    let (base, size) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `base:size`, got {s:?}"))?;
    let base = u32::from_str_radix(base.trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid hex base {base:?}: {e}"))?;
    let size = u32::from_str_radix(size.trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid hex size {size:?}: {e}"))?;
    Ok((base, size))
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("invalid signature granularity {0}; must be 1, 2 or 4")]
    InvalidGranularity(u32),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("failed to open commit trace file {path}: {source}")]
    TraceFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind GDB listener on port {port}: {source}")]
    GdbBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept GDB connection: {source}")]
    GdbAccept { source: std::io::Error },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose, args.quiet);

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(args: Args) -> Result<u8, CliError> {
    // Both `Isa` variants execute identically: the interpreter always traps the C extension as
    // an illegal instruction (see SPEC_FULL.md §9), so the flag exists for operator documentation
    // rather than to switch decode behavior.
    let _ = args.isa;

    let (mem_base, mem_size) = args.mem.unwrap_or((DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE));
    let granularity = match args.signature.as_ref() {
        Some(_) => Some(
            Granularity::from_bytes(args.signature_granularity)
                .ok_or(CliError::InvalidGranularity(args.signature_granularity))?,
        ),
        None => None,
    };

    let mut hart = Hart::new(mem_base, mem_size, mem_base);
    if args.instructions > 0 {
        hart.set_instruction_limit(args.instructions);
    }
    let image = loader::load(&mut hart, mem_base, &args.program)?;
    info!(
        "loaded {:?}: entry {:#010x}, tohost {:?}",
        args.program, image.entry, image.tohost
    );

    let (exit_code, mut hart) = if args.gdb {
        run_gdb(hart, args.gdb_port)?
    } else {
        run_free(hart, args.log_commits, &args.log_path)?
    };

    if let Some(path) = &args.signature {
        let granularity = granularity.expect("validated above when --signature is present");
        match (image.begin_signature, image.end_signature) {
            (Some(begin), Some(end)) => {
                signature::write_signature(&mut hart, path, begin, end, granularity)?;
            }
            _ => warn!("signature extraction requested but tohost symbols were not fully resolved"),
        }
    }

    Ok(exit_code)
}

fn run_free(mut hart: Hart, log_commits: bool, log_path: &str) -> Result<(u8, Hart), CliError> {
    let mut trace_file = if log_commits {
        Some(File::create(log_path).map_err(|source| CliError::TraceFile {
            path: log_path.to_string(),
            source,
        })?)
    } else {
        None
    };

    loop {
        let (event, record) = hart.step_with_trace();
        if let (Some(file), Some(record)) = (trace_file.as_mut(), record.as_ref()) {
            let _ = writeln!(file, "{}", format_commit(record));
        }
        let mut output = hart.take_console_output();
        output.extend(hart.take_uart_output());
        if !output.is_empty() {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&output);
            let _ = stdout.flush();
        }
        match event {
            StepEvent::Exit(code) => return Ok((code as u8, hart)),
            StepEvent::UnsupportedInstruction(raw) => {
                eprintln!("unsupported instruction encoding {raw:#010x} at {:#010x}", hart.pc());
                return Ok((1, hart));
            }
            StepEvent::Retired | StepEvent::Breakpoint | StepEvent::Watchpoint(..) => {}
        }
    }
}

fn run_gdb(hart: Hart, port: u16) -> Result<(u8, Hart), CliError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).map_err(|source| CliError::GdbBind {
        port,
        source,
    })?;
    info!("waiting for a GDB connection on 127.0.0.1:{port}...");
    let (stream, addr) = listener
        .accept()
        .map_err(|source| CliError::GdbAccept { source })?;
    info!("debugger connected from {addr}");

    let connection = TcpStream::new(stream).map_err(|source| CliError::GdbAccept { source })?;
    let mut target = SimTarget::new(hart);

    let code = match run_server(connection, &mut target) {
        Ok(gdbstub::stub::DisconnectReason::TargetExited(code)) => code,
        Ok(gdbstub::stub::DisconnectReason::TargetTerminated(signal)) => {
            warn!("target terminated by signal {signal}");
            1
        }
        Ok(gdbstub::stub::DisconnectReason::Disconnect) => {
            info!("GDB client disconnected");
            0
        }
        Ok(gdbstub::stub::DisconnectReason::Kill) => {
            info!("GDB client sent a kill command");
            0
        }
        Err(err) => {
            warn!("GDB session ended with an error: {err}");
            1
        }
    };
    Ok((code, target.into_hart()))
}
