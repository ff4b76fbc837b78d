use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use poliz::token::format_tokens;
use poliz::vm::{MachineConfig, DEFAULT_INSTRUCTION_LIMIT};

/// Compile a program to postfix code and run it.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// The file to run
    #[clap(value_parser)]
    file: PathBuf,

    /// Print the token sequence
    #[clap(long)]
    tokens: bool,

    /// Print the identifier and number tables
    #[clap(long)]
    tables: bool,

    /// Print the postfix program
    #[clap(long)]
    postfix: bool,

    /// Stop after compiling
    #[clap(long)]
    check_only: bool,

    /// Executed instructions after which a run is aborted
    #[clap(long, default_value_t = DEFAULT_INSTRUCTION_LIMIT)]
    limit: usize,

    /// More log output on stderr; repeat for more
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = MachineConfig {
        instruction_limit: args.limit,
    };
    if !(args.tokens || args.tables || args.postfix || args.check_only) {
        return poliz::run(&args.file, config);
    }

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("could not read `{}`", args.file.display()))?;
    let compiled = poliz::compile(&source)?;
    if args.tokens {
        println!("{}", format_tokens(&compiled.scanned.tokens));
    }
    if args.tables {
        println!("identifiers:");
        for entry in &compiled.scanned.identifiers {
            println!("{entry}");
        }
        println!("numbers:");
        for entry in &compiled.scanned.numbers {
            println!("{entry}");
        }
    }
    if args.postfix {
        println!("{}", compiled.program);
    }
    if args.check_only {
        return Ok(());
    }
    compiled.execute_stdio(config)?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
