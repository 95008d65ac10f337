mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_RUNTIME_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dbsnap",
    version,
    about = "Reusable, migration-populated database snapshots for integration tests"
)]
struct Cli {
    /// Path to the project file.
    #[arg(long, default_value = "dbsnap.toml", global = true)]
    config: PathBuf,

    /// Runtime backend, overriding `[runtime] backend` (docker, mock).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Return connection parameters for the migrated snapshot, building it on a cache miss.
    Provision,
    /// Print the snapshot tag for the current migrations.
    Fingerprint,
    /// Look up the current snapshot in the registry.
    Inspect,
    /// Remove snapshots of older migration sets.
    Prune {
        /// Remove the current snapshot as well.
        #[arg(long, default_value_t = false)]
        all: bool,
        /// Only report what would be removed.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Run diagnostic checks on the system and project.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DBSNAP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let backend = cli.backend.as_deref();

    let result = match cli.command {
        Commands::Provision => commands::provision::run(&cli.config, backend, json_output),
        Commands::Fingerprint => commands::fingerprint::run(&cli.config, backend, json_output),
        Commands::Inspect => commands::inspect::run(&cli.config, backend, json_output),
        Commands::Prune { all, dry_run } => {
            commands::prune::run(&cli.config, backend, !all, dry_run, json_output)
        }
        Commands::Doctor => commands::doctor::run(&cli.config, backend, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("migration set error:")
                || msg.starts_with("configuration error:")
                || msg.starts_with("failed to load")
            {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("runtime error:") || msg.starts_with("missing prerequisites")
            {
                EXIT_RUNTIME_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
