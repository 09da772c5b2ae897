use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use profiledir::directory::{AnalyticsChart, ProfileData};
use profiledir::engine::ProfileFilters;
use profiledir::{logging, Config, DirectoryError, ListQuery, ProfileDirectory};

#[derive(Parser, Debug)]
#[command(name = "profiledir")]
#[command(about = "A cached social profile directory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/profiledir/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create the store and print where it lives
  Init,
  /// List one page of profiles
  List {
    /// Query parameters, e.g. zone=North sort_by=name cursor=40 cursor_value='"Asha"' limit=20
    #[arg(value_name = "KEY=VALUE")]
    params: Vec<String>,
  },
  /// Show one profile
  Get { id: i64 },
  /// Create a profile from JSON (argument or stdin)
  Create {
    #[arg(long)]
    data: Option<String>,
  },
  /// Update the given fields of a profile from JSON (argument or stdin)
  Update {
    id: i64,
    #[arg(long)]
    data: Option<String>,
  },
  Delete { id: i64 },
  /// Delete several profiles at once
  BulkDelete {
    #[arg(required = true)]
    ids: Vec<i64>,
  },
  /// Dashboard summary, or named metrics with --metric
  Stats {
    /// e.g. facebook_active, twitter_verified, instagram_followers
    #[arg(long = "metric")]
    metrics: Vec<String>,
    #[command(flatten)]
    filters: FilterArgs,
  },
  /// One dashboard chart
  Analytics {
    /// platform-comparison, top-profiles, active-status, verified-status,
    /// zone-followers or designation-count
    chart: String,
    #[command(flatten)]
    filters: FilterArgs,
  },
  /// Distinct values for each categorical filter
  FilterOptions,
  /// Write matching profiles as CSV
  Export {
    #[command(flatten)]
    filters: FilterArgs,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[derive(ClapArgs, Debug, Default)]
struct FilterArgs {
  /// Substring match over names, places, email and handles
  #[arg(long)]
  search: Option<String>,
  #[arg(long)]
  zone: Option<String>,
  #[arg(long)]
  party_district: Option<String>,
  #[arg(long)]
  constituency: Option<String>,
  #[arg(long)]
  designation: Option<String>,
  /// Active on at least one platform
  #[arg(long)]
  active_only: bool,
  /// Verified on at least one platform
  #[arg(long)]
  verified_only: bool,
}

impl From<FilterArgs> for ProfileFilters {
  fn from(args: FilterArgs) -> Self {
    ProfileFilters {
      search: args.search,
      zone: args.zone,
      party_district: args.party_district,
      constituency: args.constituency,
      designation: args.designation,
      active_only: args.active_only,
      verified_only: args.verified_only,
    }
  }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init(&config.log);

  match run(args.command, &config).await {
    Ok(()) => Ok(ExitCode::SUCCESS),
    Err(report) => match report.downcast_ref::<DirectoryError>() {
      // Bad input gets a one-line message, not a report with a backtrace.
      Some(err) if err.is_client_error() => {
        eprintln!("error: {}", err);
        Ok(ExitCode::from(2))
      }
      _ => Err(report),
    },
  }
}

async fn run(command: Command, config: &Config) -> Result<()> {
  let directory = ProfileDirectory::open(config).await?;

  match command {
    Command::Init => {
      println!("{}", config.store_path()?.display());
    }
    Command::List { params } => {
      let pairs = params
        .iter()
        .map(|p| {
          p.split_once('=')
            .ok_or_else(|| eyre!("Expected KEY=VALUE, got '{}'", p))
        })
        .collect::<Result<Vec<_>>>()?;
      let query = ListQuery::from_pairs(pairs)?;
      print_json(&directory.list_profiles(&query).await?)?;
    }
    Command::Get { id } => print_json(&directory.get_profile(id).await?)?,
    Command::Create { data } => {
      let data = read_payload(data)?;
      print_json(&directory.create_profile(&data).await?)?;
    }
    Command::Update { id, data } => {
      let patch = read_payload(data)?;
      print_json(&directory.update_profile(id, &patch).await?)?;
    }
    Command::Delete { id } => {
      directory.delete_profile(id).await?;
      print_json(&serde_json::json!({ "deleted": id }))?;
    }
    Command::BulkDelete { ids } => {
      let deleted = directory.bulk_delete(&ids).await?;
      print_json(&serde_json::json!({ "deleted": deleted }))?;
    }
    Command::Stats { metrics, filters } => {
      if metrics.is_empty() {
        print_json(&directory.stats().await?)?;
      } else {
        print_json(&directory.compute_stats(&metrics, &filters.into()).await?)?;
      }
    }
    Command::Analytics { chart, filters } => {
      let chart: AnalyticsChart = chart.parse()?;
      print_json(&directory.analytics(chart, &filters.into()).await?)?;
    }
    Command::FilterOptions => print_json(&directory.filter_options().await?)?,
    Command::Export { filters, output } => {
      let filters: ProfileFilters = filters.into();
      let rows = match output {
        Some(path) => {
          let file = std::fs::File::create(&path)
            .map_err(|e| eyre!("Failed to create {}: {}", path.display(), e))?;
          let mut writer = std::io::BufWriter::new(file);
          directory.export_csv(&filters, &mut writer).await?
        }
        None => {
          let mut writer = std::io::BufWriter::new(std::io::stdout().lock());
          directory.export_csv(&filters, &mut writer).await?
        }
      };
      eprintln!("exported {} profiles", rows);
    }
  }

  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let out = serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode output: {}", e))?;
  println!("{}", out);
  Ok(())
}

/// Profile JSON from `--data`, or from stdin when absent.
fn read_payload(data: Option<String>) -> Result<ProfileData> {
  let raw = match data {
    Some(raw) => raw,
    None => {
      let mut buf = String::new();
      std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| eyre!("Failed to read stdin: {}", e))?;
      buf
    }
  };
  serde_json::from_str(&raw).map_err(|e| eyre!("Invalid profile JSON: {}", e))
}
