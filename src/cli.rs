use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::coordinator::Orchestrator;
use crate::domain::TradingPair;
use crate::error::SwapdError;
use crate::saga::{Resolution, ResumeOutcome};

#[derive(Parser, Debug)]
#[command(name = "swapd")]
#[command(version)]
#[command(about = "Unattended prediction-driven cross-chain exchange daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and {SWAPD_ENV}.toml
    #[arg(short, long, default_value = "config", global = true)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the scheduled daemon (default)
    Run,
    /// Fetch and merge every configured price series once
    SaveHistory,
    /// Refit every predictor on the persisted history
    Retrain,
    /// Run one decision cycle per pair without executing exchanges
    Predict,
    /// List journaled transfers that have not been settled
    Pending,
    /// Settle or drop a transfer that needs reconciliation
    Resolve {
        /// Pair as BASE-QUOTE, e.g. WAVES-ETH
        pair: String,
        /// Exchange id of the journaled transfer
        quote_id: String,
        /// `sent` records the settlement, `not-sent` drops the entry
        resolution: String,
    },
}

pub async fn save_history(orchestrator: &Orchestrator) -> Result<()> {
    let added = orchestrator
        .refresh_datasets()
        .await
        .context("dataset refresh failed")?;
    println!("Trading history saved ({} new candles)", added);
    Ok(())
}

pub async fn retrain(orchestrator: &Orchestrator) -> Result<()> {
    orchestrator.retrain().await.context("retrain failed")?;
    println!("Models trained");
    Ok(())
}

pub async fn predict(orchestrator: &Orchestrator) -> Result<()> {
    orchestrator
        .retrain()
        .await
        .context("models must be trained before predicting")?;
    for pair_config in &orchestrator.config().trading.pairs {
        let report = orchestrator.trade_cycle(pair_config, false).await;
        println!("{}: {}", report.pair, serde_json::to_string(&report.outcome)?);
    }
    Ok(())
}

pub async fn pending(orchestrator: &Orchestrator) -> Result<()> {
    let saga = orchestrator
        .saga()
        .ok_or_else(|| SwapdError::CapabilityUnavailable("exchange saga".to_string()))?;

    let mut total = 0;
    for pair_config in &orchestrator.config().trading.pairs {
        let pair = pair_config.pair();
        let entries = saga
            .journal()
            .entries(&pair)
            .await
            .with_context(|| format!("cannot read the transfer journal of {}", pair))?;
        for entry in entries {
            total += 1;
            println!(
                "{} {} {} {} → {} tx={} stage={} attempts={}{}",
                pair,
                entry.quote.id,
                entry.quote.amount,
                entry.quote.from_currency,
                entry.quote.to_currency,
                entry.tx_ref,
                entry.stage,
                entry.attempts,
                entry
                    .note
                    .as_deref()
                    .map(|n| format!(" note={}", n))
                    .unwrap_or_default()
            );
        }
    }
    if total == 0 {
        println!("No pending transfers");
    }
    Ok(())
}

pub async fn resolve(
    orchestrator: &Orchestrator,
    pair: &str,
    quote_id: &str,
    resolution: &str,
) -> Result<()> {
    let resolution = parse_resolution(resolution)?;
    let pair: TradingPair = pair.parse()?;
    match orchestrator
        .resolve(&pair, quote_id, resolution)
        .await
        .with_context(|| format!("cannot resolve {} on {}", quote_id, pair))?
    {
        ResumeOutcome::Settled { record, .. } => println!(
            "Settled {}: {} {} → {} (fee {})",
            record.exchange_transaction_id,
            record.amount,
            record.from_coin,
            record.to_coin,
            record.network_fee
        ),
        ResumeOutcome::Dropped { quote_id, .. } => println!("Dropped {}", quote_id),
        other => println!("{:?}", other),
    }
    Ok(())
}

fn parse_resolution(raw: &str) -> Result<Resolution> {
    raw.parse::<Resolution>()
        .with_context(|| format!("invalid resolution {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resolve_arguments() {
        let cli = Cli::parse_from([
            "swapd",
            "--config",
            "/etc/swapd",
            "resolve",
            "WAVES-ETH",
            "abc123",
            "not-sent",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/swapd"));
        assert_eq!(
            cli.command,
            Some(Commands::Resolve {
                pair: "WAVES-ETH".into(),
                quote_id: "abc123".into(),
                resolution: "not-sent".into(),
            })
        );
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["swapd"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn bad_resolution_becomes_a_crate_error_with_context() {
        assert_eq!(parse_resolution("not-sent").unwrap(), Resolution::NotSent);

        let err: SwapdError = parse_resolution("maybe").unwrap_err().into();
        assert!(matches!(err, SwapdError::Other(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("invalid resolution \"maybe\""));
    }

    #[test]
    fn kebab_case_subcommands() {
        let cli = Cli::parse_from(["swapd", "save-history"]);
        assert_eq!(cli.command, Some(Commands::SaveHistory));
    }
}
