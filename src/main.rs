use asin_images::app::{self, CacheAction};
use asin_images::{config, logging};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "asin-images")]
#[command(about = "Resolve product images by ASIN with a persistent local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/asin-images/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Image backend base URL (overrides api.base_url)
  #[arg(short, long)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve many ASINs at once, cache first, then in batches
  Resolve {
    #[arg(required = true)]
    asins: Vec<String>,
  },
  /// Resolve ASINs one at a time, waiting while the backend processes them
  Watch {
    #[arg(required = true)]
    asins: Vec<String>,
  },
  /// Inspect or clear the local image cache
  Cache {
    #[command(subcommand)]
    action: CacheCommand,
  },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// List every entry with its validity
  Show,
  /// Show the entry for one ASIN
  Get { asin: String },
  /// Remove every entry
  Clear,
}

impl From<CacheCommand> for CacheAction {
  fn from(command: CacheCommand) -> Self {
    match command {
      CacheCommand::Show => CacheAction::Show,
      CacheCommand::Get { asin } => CacheAction::Get(asin),
      CacheCommand::Clear => CacheAction::Clear,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(base_url) = args.base_url {
    config.api.base_url = Some(base_url);
  }

  let _log_guard = logging::init(&config.logging)?;

  let app = app::App::new(&config)?;
  match args.command {
    Command::Resolve { asins } => app.resolve(asins).await?,
    Command::Watch { asins } => app.watch(asins).await?,
    Command::Cache { action } => app.cache(action.into())?,
  }

  Ok(())
}
