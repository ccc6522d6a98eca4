//! CLI commands for the fox32 runner.
use clap::{Args, Parser, Subcommand};

/// fox32 virtual machine runner
#[derive(Parser)]
#[clap(name = "fox32", version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a ROM image to completion or until it halts
    Run(RunArgs),
    /// Execute a fixed number of instructions and print machine state
    Step(StepArgs),
    /// Print the current VM configuration without running anything
    Inspect(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the ROM image loaded at the firmware entry point
    pub rom: String,

    /// Path to a disk image backing the byte store's swap region
    #[clap(long)]
    pub disk: Option<String>,

    /// Maximum instructions to execute before giving up (0 = unbounded)
    #[clap(long, default_value_t = 0)]
    pub max_steps: u64,
}

#[derive(Args)]
pub struct StepArgs {
    #[clap(flatten)]
    pub run: RunArgs,

    /// Number of instructions to execute
    #[clap(long, default_value_t = 1)]
    pub count: u32,
}
