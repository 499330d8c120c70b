use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use datareg_core::{DataLayout, FetchSettings, RunConfig};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod exit;
mod output;
mod pipeline;

#[derive(Parser)]
#[command(
    name = "datareg",
    version,
    about = "Download research datasets reproducibly and record their provenance"
)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: output::OutputFormat,

    /// Project root containing data/ and secrets/
    #[arg(long, global = true, env = "DATAREG_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: commands::Commands,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let layout = DataLayout::new(&cli.root);
    let fetch = match &cli.command {
        commands::Commands::Download(args) => args.network.settings(),
        _ => FetchSettings::default(),
    };
    let config = RunConfig::new(layout, fetch)?;

    match &cli.command {
        commands::Commands::Init => commands::init::run(&config),
        commands::Commands::Download(args) => commands::download::run(args, &config, cli.format),
        commands::Commands::Register(args) => commands::register::run(args, &config, cli.format),
        commands::Commands::Log(args) => commands::log::run(args, &config, cli.format),
        commands::Commands::Verify(args) => commands::verify::run(args, &config, cli.format),
        commands::Commands::Clean(args) => commands::clean::run(args, &config),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit::USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit::code_for(&err))
        }
    }
}
