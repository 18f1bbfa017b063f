use anyhow::Result;
use clap::{ArgAction, Parser};
use dash_tidy::{rewrite_dashboard, NormalizeOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dash-tidy",
    version,
    about = "Normalize Grafana dashboard JSON files in place"
)]
struct Cli {
    /// Path to dashboard JSON file to be changed
    #[arg(value_name = "DASHBOARD", required = true)]
    dashboards: Vec<PathBuf>,
    /// Apply consistent layout automatically - this is allowed variance in x dimension (percent)
    #[arg(long, env = "DASH_TIDY_PERCENT_X")]
    autolayout_percent_x: Option<u32>,
    /// Apply consistent layout automatically - this is allowed variance in y dimension (percent)
    #[arg(long, env = "DASH_TIDY_PERCENT_Y")]
    autolayout_percent_y: Option<u32>,
    /// Try coercing heights to this first, then fall back to the most common heights
    #[arg(long, env = "DASH_TIDY_PREFER_H")]
    autolayout_prefer_h: Option<u32>,
    /// Only re-indent the files (skip all fixes)
    #[arg(long, action = ArgAction::SetTrue)]
    indent: bool,
    /// Report files that would change without writing them
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Print one JSON report line per file
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Log every applied fix to stderr
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> NormalizeOptions {
        NormalizeOptions {
            autolayout_percent_x: self.autolayout_percent_x,
            autolayout_percent_y: self.autolayout_percent_y,
            autolayout_prefer_h: self.autolayout_prefer_h,
            indent_only: self.indent,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = cli.options();
    for path in &cli.dashboards {
        let outcome = rewrite_dashboard(path, &options, cli.dry_run)?;
        if cli.json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else if outcome.rewritten {
            println!("Rewrote {}", path.display());
        } else if outcome.changed {
            println!("Would rewrite {}", path.display());
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
