use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use oodviz::{logging, Config};

/// Command line overrides
#[derive(Default)]
struct Args {
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
    export: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("oodviz {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            flag @ ("--config" | "-c" | "--output" | "-o" | "--export" | "--log-dir") => {
                if i + 1 >= args.len() {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                }
                let value = Some(PathBuf::from(&args[i + 1]));
                match flag {
                    "--config" | "-c" => parsed.config_path = value,
                    "--output" | "-o" => parsed.output = value,
                    "--export" => parsed.export = value,
                    _ => parsed.log_dir = value,
                }
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"oodviz - t-SNE scatter plot of CLIP embeddings, in-distribution vs OOD

USAGE:
    oodviz [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --output, -o PATH   Output PNG (overrides plot.output)
    --export PATH       Also write projected points (.csv or .json)
    --log-dir PATH      Also write logs to a daily file in PATH
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    OODVIZ_CONFIG       Path to config file (overrides default location)
    OODVIZ_LOG          Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/oodviz/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init(args.log_dir.clone())?;

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(output) = args.output {
        config.plot.output = output;
    }
    if let Some(export) = args.export {
        config.export.path = Some(export);
    }

    let summary = oodviz::run(&config)?;

    info!(
        in_distribution = summary.in_distribution_samples,
        ood = summary.ood_samples,
        rows = summary.rows,
        dim = summary.dim,
        plot = ?summary.plot,
        "Done"
    );
    if let Some((path, count)) = &summary.exported {
        info!(path = ?path, count, "Points exported");
    }

    Ok(())
}
