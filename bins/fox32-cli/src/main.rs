//! fox32 runner binary
mod command;
mod pretty_print;

use std::fs::OpenOptions;

use clap::Parser;
use command::{Cli, Commands, RunArgs, StepArgs};
use eyre::{Context, Result};
use fox32_core::{Disk, FileDisk, MemoryDisk, Rom, Vm, VmConfig};
use pretty_print::{print_startup_banner, print_state};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fox32_core=debug"));
    fmt::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_vm(args: &RunArgs) -> Result<Vm> {
    let rom_bytes = std::fs::read(&args.rom).wrap_err_with(|| format!("reading ROM image {}", args.rom))?;
    let disk: Box<dyn Disk> = match &args.disk {
        Some(path) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .wrap_err_with(|| format!("opening disk image {path}"))?;
            Box::new(FileDisk::new(file))
        }
        None => Box::new(MemoryDisk::new(2048)),
    };
    let config = VmConfig::new(Rom::new(rom_bytes), disk);
    Ok(Vm::new(config))
}

fn run(args: RunArgs) -> Result<()> {
    print_startup_banner(&args.rom);
    let mut vm = load_vm(&args)?;
    let mut executed: u64 = 0;
    loop {
        if args.max_steps != 0 && executed >= args.max_steps {
            warn!(executed, "instruction budget exhausted");
            break;
        }
        match vm.resume(1) {
            Ok(n) => executed += n as u64,
            Err(fault) => {
                info!(?fault, ip = vm.pointer_instr(), "halted on fault");
                break;
            }
        }
        if vm.soft_halted {
            info!(executed, "halted");
            break;
        }
    }
    print_state(&vm);
    Ok(())
}

fn step(args: StepArgs) -> Result<()> {
    print_startup_banner(&args.run.rom);
    let mut vm = load_vm(&args.run)?;
    match vm.resume(args.count) {
        Ok(n) => info!(executed = n, "ran to completion or budget"),
        Err(fault) => info!(?fault, ip = vm.pointer_instr(), "halted on fault"),
    }
    print_state(&vm);
    Ok(())
}

fn inspect(args: RunArgs) -> Result<()> {
    let vm = load_vm(&args)?;
    print_state(&vm);
    Ok(())
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(args)) => run(args)?,
        Some(Commands::Step(args)) => step(args)?,
        Some(Commands::Inspect(args)) => inspect(args)?,
        None => {
            println!("Usage: fox32 <COMMAND>");
            println!("\nFor more information try 'fox32 --help'");
        }
    }

    Ok(())
}
