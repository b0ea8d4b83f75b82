//! xmldom CLI - Main entry point

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xmldom::{ParseSession, ParserConfig};

mod outline;

#[derive(Parser)]
#[command(name = "xmldom")]
#[command(version)]
#[command(about = "Parse an XML document and print its element outline", long_about = None)]
struct Cli {
    /// Input file, or '-' for standard input
    input: String,

    /// How the input is handed to the parser
    #[arg(long, value_enum, default_value_t = Mode::File)]
    mode: Mode,

    /// Substitute xi:include elements
    #[arg(long)]
    xinclude: bool,

    /// Don't mark where included content starts and ends
    #[arg(long)]
    no_xinclude_nodes: bool,

    /// Don't add xml:base to included elements
    #[arg(long)]
    no_base_fixup: bool,

    /// Drop whitespace-only text
    #[arg(long)]
    no_blanks: bool,

    /// TOML file with parser settings
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Let the parser read the file itself
    File,
    /// Read the whole input, then parse the buffer
    Memory,
    /// Feed the input line by line
    Stream,
}

fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xmldom=info,xmldom_engine=info,xmldom_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    run(&cli)
}

fn build_session(cli: &Cli) -> Result<ParseSession> {
    let mut config = match &cli.config {
        Some(path) => ParserConfig::from_file(path)?,
        None => ParserConfig::default(),
    };

    if cli.xinclude {
        config.xinclude.process = true;
    }
    if cli.no_xinclude_nodes {
        config.xinclude.generate_nodes = false;
    }
    if cli.no_base_fixup {
        config.xinclude.fixup_base_uris = false;
    }
    if cli.no_blanks {
        config.keep_blanks = false;
    }

    Ok(ParseSession::with_config(&config)?)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let mut session = build_session(cli)?;
    tracing::debug!(input = %cli.input, mode = ?cli.mode, "parsing");

    let outcome = match (cli.mode, cli.input.as_str()) {
        (Mode::Memory, "-") => {
            let mut buffer = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buffer)
                .context("failed to read standard input")?;
            session.parse_memory(&buffer)
        }
        (Mode::Memory, path) => {
            let buffer = std::fs::read(path).with_context(|| format!("failed to read {}", path))?;
            session.parse_memory(&buffer)
        }
        (_, "-") => session.parse_stream(io::stdin().lock()),
        (Mode::Stream, path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            session.parse_stream(BufReader::new(file))
        }
        (Mode::File, path) => session.parse_file(path),
    };

    match outcome {
        Ok(doc) => {
            print!("{}", outline::render(doc));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error ({}): {}", err.category(), err.diagnostic());
            Ok(ExitCode::FAILURE)
        }
    }
}
