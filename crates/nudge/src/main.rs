use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use nudge::batch::BatchFlavor;
use nudge::model::{Mode, RunCategory};
use nudge::NudgeConfig;

mod commands;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(about = "Nudge - Intervention Recommendation Engine\nNext-day diet, sleep and exercise recommendations for IBS patients")]
#[command(version)]
struct Cli {
  /// Config file (defaults to nudge.yaml, .nudge/config.yaml, then the user config dir)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Show debug output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Only show errors
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  quiet: bool,

  #[command(subcommand)]
  command: Commands,
}

/// How recommendations are produced
#[derive(Args)]
struct ModeArgs {
  #[arg(short, long, value_enum, default_value = "rule", ignore_case = true)]
  mode: Mode,
}

#[derive(Subcommand)]
enum Commands {
  /// Generate artifacts for every qualifying user
  Batch {
    /// Which records are required and what is produced
    #[arg(short, long, value_enum, default_value = "minimal")]
    flavor: BatchFlavor,
    #[command(flatten)]
    mode: ModeArgs,
    /// Record date to evaluate (defaults to yesterday)
    #[arg(long, conflicts_with = "target_date")]
    date: Option<NaiveDate>,
    /// Date the recommendation is for
    #[arg(long)]
    target_date: Option<NaiveDate>,
    /// Only process this user
    #[arg(short, long)]
    user: Option<String>,
    /// Users processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,
    /// Per-user time limit in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
  },
  /// Compute one recommendation from a JSON input file without storing it
  Recommend {
    /// File with `window`, `allergies` and `restrictions`
    input: PathBuf,
    #[command(flatten)]
    mode: ModeArgs,
    #[arg(long, value_enum, default_value = "all")]
    category: RunCategory,
  },
  /// Show stored artifacts for a user
  Show {
    #[arg(short, long)]
    user: String,
    /// Record date; lists every artifact when omitted
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, value_enum, default_value = "all")]
    category: RunCategory,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  herald::set_quiet(cli.quiet);
  herald::init_tracing(cli.verbose);

  let config = NudgeConfig::load(cli.config.as_deref())?;

  match cli.command {
    Commands::Batch { flavor, mode, date, target_date, user, concurrency, deadline_secs, json } => {
      let command = commands::BatchCommand {
        flavor,
        mode: mode.mode,
        date,
        target_date,
        user,
        concurrency,
        deadline_secs,
        json,
      };
      commands::run_batch(&config, command).await?;
    }
    Commands::Recommend { input, mode, category } => {
      commands::recommend(&config, &input, mode.mode, category).await?;
    }
    Commands::Show { user, date, category } => {
      commands::show(&config, &user, date, category).await?;
    }
  }

  Ok(())
}
