//! `lexicon`: stream a dictionary lookup to stdout.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexicon lookup <term>` | Live lookup against the configured upstream |
//! | `lexicon replay <capture> <term>` | Feed a recorded SSE capture through the same pipeline |
//!
//! Configuration comes from `LEXICON_*` variables (a `.env` file is read
//! first); flags override them. Persistence uses in-memory backends, so the
//! printed version id is only meaningful for the lifetime of the process.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::{LookupOptions, OutputFormat};

#[derive(Parser)]
#[command(
    name = "lexicon",
    version,
    about = "Stream dictionary entries from an LLM backend"
)]
struct Cli {
    /// Print caller items as SSE blocks instead of plain text.
    #[arg(long, global = true)]
    sse: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look a term up against the live upstream.
    Lookup(LookupArgs),

    /// Replay a recorded SSE capture as if it came from the upstream.
    Replay {
        /// Capture file containing raw upstream SSE bytes.
        capture: PathBuf,

        /// Bytes per replayed chunk; small values exercise split code points.
        #[arg(long, default_value_t = 7)]
        chunk_size: usize,

        #[command(flatten)]
        lookup: LookupArgs,
    },
}

#[derive(Args)]
struct LookupArgs {
    /// Term to look up.
    term: String,

    #[arg(long, default_value = "en")]
    language: String,

    /// Entry style, e.g. `standard`, `simple`, `academic`.
    #[arg(long, default_value = "standard")]
    flavor: String,

    /// Overrides `LEXICON_MODEL`.
    #[arg(long)]
    model: Option<String>,

    /// Do not record the result in search history.
    #[arg(long)]
    no_history: bool,

    /// Learner's native language, for personalization.
    #[arg(long)]
    native_language: Option<String>,

    /// Learner's proficiency level, for personalization.
    #[arg(long)]
    level: Option<String>,

    /// Learner interest; repeatable.
    #[arg(long = "interest")]
    interests: Vec<String>,
}

impl LookupArgs {
    fn into_options(self, format: OutputFormat) -> LookupOptions {
        LookupOptions {
            term: self.term,
            language: self.language,
            flavor: self.flavor,
            model: self.model,
            capture_history: !self.no_history,
            native_language: self.native_language,
            level: self.level,
            interests: self.interests,
            format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lexicon_core::config::load_dotenv();
    lexicon_core::init_observability();

    let cli = Cli::parse();
    let format = if cli.sse {
        OutputFormat::Sse
    } else {
        OutputFormat::Text
    };
    let config = lexicon_core::LexiconConfig::from_env()?;
    let mut stdout = std::io::stdout();

    let summary = match cli.command {
        Commands::Lookup(args) => {
            commands::lookup(&config, args.into_options(format), &mut stdout).await?
        }
        Commands::Replay {
            capture,
            chunk_size,
            lookup,
        } => {
            commands::replay(
                &config,
                &capture,
                chunk_size,
                lookup.into_options(format),
                &mut stdout,
            )
            .await?
        }
    };
    eprintln!("{summary}");
    Ok(())
}
