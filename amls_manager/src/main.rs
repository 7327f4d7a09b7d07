use amls_manager::commands;
use amls_manager::commands::run::RunOptions;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "amls")]
#[command(about = "AMLS - Autonomous Multirotor Landing System flight loop")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the 40 Hz flight loop against simulated hardware
    Run {
        /// Stop after this many cycles (default: run until Ctrl-C)
        #[arg(short = 'n', long = "cycles")]
        cycles: Option<u64>,

        /// Loop config TOML (default: built-in timing)
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Busy time spent in every control step
        #[arg(long = "simulated-load-us", value_name = "US", default_value_t = 5_000)]
        simulated_load_us: u64,

        /// Make every Nth control step take --spike-us instead
        #[arg(long = "spike-every", value_name = "N")]
        spike_every: Option<u64>,

        /// Duration of a spiking control step
        #[arg(long = "spike-us", value_name = "US", default_value_t = 27_000)]
        spike_us: u64,

        /// Run the loop thread under SCHED_FIFO at this priority (1-99)
        #[arg(long = "realtime-priority", value_name = "PRIO")]
        realtime_priority: Option<i32>,

        /// Pin the loop thread to this CPU core
        #[arg(long = "cpu", value_name = "CORE")]
        cpu: Option<usize>,

        /// Lock process memory to avoid page faults
        #[arg(long = "lock-memory")]
        lock_memory: bool,

        /// Print the final summary as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Print the default loop config as TOML
    Config {
        /// Write to a file instead of stdout
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Validate a loop config file
    Check {
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amls_manager=info,amls_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli.command) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            cycles,
            config,
            simulated_load_us,
            spike_every,
            spike_us,
            realtime_priority,
            cpu,
            lock_memory,
            json,
        } => commands::run::execute_run(RunOptions {
            cycles,
            config,
            simulated_load_us,
            spike_every,
            spike_us,
            realtime_priority,
            cpu,
            lock_memory,
            json,
        }),

        Commands::Config { output } => commands::config::execute_config(output.as_deref()),

        Commands::Check { config } => commands::config::execute_check(&config),

        Commands::Version => {
            println!("{} {}", "amls".bold(), env!("CARGO_PKG_VERSION").cyan());
            println!("  {} amls_core {}", "core:".dimmed(), amls_core::VERSION);
            Ok(())
        }
    }
}
