use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use params::HarnessConfig;
use serde::Serialize;
use tools::WebGpuSim;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for URL-synced harness parameters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the parameter values a page would load with `--query`.
    Resolve {
        /// Harness config JSON; the built-in panel when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Run one renderer selection against simulated backends.
    Select {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "")]
        query: String,
        /// ok, fail or absent
        #[arg(long, default_value = "fail")]
        webgpu: WebGpuSim,
    },
    /// Apply `id=value` edits and print the share query.
    Edit {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long = "set", value_name = "ID=VALUE")]
        set: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    match Cli::parse().command {
        Command::Resolve { config, query } => {
            let config = load_config(config)?;
            print_json(&tools::resolve(&config, &query)?)
        }
        Command::Select {
            config,
            query,
            webgpu,
        } => {
            let config = load_config(config)?;
            print_json(&tools::select(&config, &query, webgpu)?)
        }
        Command::Edit { config, query, set } => {
            let config = load_config(config)?;
            let assignments = set
                .iter()
                .map(|raw| tools::parse_assignment(raw))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&tools::edit(&config, &query, &assignments)?)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<HarnessConfig, String> {
    let Some(path) = path else {
        return Ok(HarnessConfig::default());
    };
    let raw = fs::read_to_string(&path).map_err(|e| format!("read {path:?}: {e}"))?;
    HarnessConfig::from_json(&raw).map_err(|e| format!("{path:?}: {e}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("serialize: {e}"))?;
    println!("{out}");
    Ok(())
}
