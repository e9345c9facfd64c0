use analytics::PerformanceMetrics;
use anyhow::Context;
use api_client::{HttpUpstreamClient, Session, UpstreamApi};
use backtester::{BacktestRequest, BacktestRunner, parse_loose_date};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use configuration::{SettlementMode, init_logging, load_config};
use core_types::Instrument;
use serde_json::Value;
use std::path::PathBuf;
use strategies::{StrategyOverrides, StrategyResolver};

/// The main entry point for the QuantLink backtest client.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; everything can come from config.toml or the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if let Some(settlement) = cli.settlement {
        config.simulation.settlement = settlement;
    }
    let _log_guard = init_logging(&config.logging)?;

    let session = Session::from_config(&config.upstream);
    let api = HttpUpstreamClient::new(&config.upstream, &session)?;

    match cli.command {
        Commands::Backtest(args) => {
            let table = args.table;
            let request = args.into_request();
            let result = BacktestRunner::new(&api, &config).run(&request).await;

            print_json(&result)?;
            if table {
                if let Some(metrics) = &result.metrics {
                    println!("{}", metrics_table(metrics));
                }
            }
            if !result.success {
                anyhow::bail!(result.error.unwrap_or_else(|| "backtest failed".to_string()));
            }
        }
        Commands::Klines(args) => {
            let instrument = Instrument::parse(&args.instrument).with_context(|| {
                format!("'{}' is not a SYMBOL.EXCHANGE instrument", args.instrument)
            })?;
            let from = parse_loose_date(&args.from)
                .with_context(|| format!("invalid --from date '{}'", args.from))?;
            let to = parse_loose_date(&args.to)
                .with_context(|| format!("invalid --to date '{}'", args.to))?;
            let resolution = args
                .resolution
                .unwrap_or_else(|| config.simulation.resolution.clone());

            let klines = api.fetch_klines(&instrument, from, to, &resolution).await?;
            tracing::info!(%instrument, bars = klines.len(), "K-lines fetched.");
            print_json(&klines)?;
        }
        Commands::Strategy(args) => {
            let resolved = StrategyResolver::new(&api)
                .resolve(&args.strategy_id, &args.overrides.into())
                .await?;
            print_json(&resolved)?;
        }
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Runs strategies on the broker's remote backtest engine and analyses the results.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the configured settlement mode.
    #[arg(long, global = true, value_enum)]
    settlement: Option<SettlementMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a backtest, wait for its results and reconstruct trades and metrics.
    Backtest(BacktestArgs),
    /// Print historical K-lines for one instrument.
    Klines(KlineArgs),
    /// Print a strategy after applying overrides and extracting its instruments.
    Strategy(StrategyArgs),
}

/// Field-by-field replacements for the stored strategy.
#[derive(Args)]
struct OverrideArgs {
    #[arg(long)]
    indicator: Option<String>,

    #[arg(long)]
    timing: Option<String>,

    #[arg(long)]
    control_risk: Option<String>,

    /// A full selection function, or a bare list such as "000001.SZSE&600000.XSHG".
    #[arg(long)]
    choose_stock: Option<String>,
}

impl From<OverrideArgs> for StrategyOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            indicator: args.indicator,
            timing: args.timing,
            control_risk: args.control_risk,
            choose_stock: args.choose_stock,
        }
    }
}

#[derive(Args)]
struct BacktestArgs {
    #[arg(long)]
    strategy_id: String,

    /// Start date, e.g. 2024-01-01. Defaults to one year before today.
    #[arg(long)]
    from: Option<String>,

    /// End date. Defaults to today.
    #[arg(long)]
    to: Option<String>,

    /// Instrument whose listing dates bound the range (SYMBOL.EXCHANGE).
    #[arg(long)]
    instrument_id: Option<String>,

    /// Upper bound on how long to wait for results.
    #[arg(long)]
    max_seconds: Option<u64>,

    /// Also print the metrics as a table.
    #[arg(long)]
    table: bool,

    #[command(flatten)]
    overrides: OverrideArgs,
}

impl BacktestArgs {
    fn into_request(self) -> BacktestRequest {
        BacktestRequest {
            strategy_id: self.strategy_id,
            instrument_id: self.instrument_id,
            from: self.from,
            to: self.to,
            overrides: self.overrides.into(),
            max_seconds: self.max_seconds,
        }
    }
}

#[derive(Args)]
struct KlineArgs {
    /// SYMBOL.EXCHANGE, e.g. 600000.XSHG.
    #[arg(long)]
    instrument: String,

    #[arg(long)]
    from: String,

    #[arg(long)]
    to: String,

    /// Bar resolution; defaults to the configured simulation resolution.
    #[arg(long)]
    resolution: Option<String>,
}

#[derive(Args)]
struct StrategyArgs {
    #[arg(long)]
    strategy_id: String,

    #[command(flatten)]
    overrides: OverrideArgs,
}

// ==============================================================================
// Output
// ==============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let value: Value = serde_json::to_value(value)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn metrics_table(metrics: &PerformanceMetrics) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Total return".to_string(), format!("{}%", metrics.total_return)]);
    table.add_row(vec!["Annual return".to_string(), format!("{}%", metrics.annual_return)]);
    table.add_row(vec!["Max drawdown".to_string(), format!("{}%", metrics.max_drawdown)]);
    table.add_row(vec!["Trades".to_string(), metrics.trade_count.to_string()]);
    table.add_row(vec!["Win rate".to_string(), format!("{}%", metrics.win_rate)]);
    table.add_row(vec!["Sharpe ratio".to_string(), metrics.sharpe_ratio.to_string()]);
    table.add_row(vec!["Avg trade".to_string(), metrics.avg_trade.to_string()]);
    table
}
