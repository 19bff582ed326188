//! Balance Monitor
//!
//! On every tick: read each wallet's balance, compare it with the last and
//! first recorded snapshot, log a summary and append a new snapshot.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{BalanceSnapshot, Coin};
use crate::error::Result;
use crate::market::MarketDataSource;
use crate::persistence::BalanceHistory;
use crate::wallet::Wallet;

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub coin: Coin,
    pub amount: Decimal,
    /// Change since the previous snapshot, `None` on the first run
    pub since_last: Option<Decimal>,
    /// Change since the first snapshot, `None` on the first run
    pub since_first: Option<Decimal>,
    /// Value in the fiat currency when a price was available
    pub fiat_value: Option<f64>,
}

fn signed(delta: Decimal) -> String {
    if delta > Decimal::ZERO {
        format!("+{}", delta.normalize())
    } else {
        delta.normalize().to_string()
    }
}

impl BalanceReport {
    pub fn summary(&self, fiat: Coin) -> String {
        let mut line = format!("You have {} {}", self.amount.normalize(), self.coin);
        if let Some(value) = self.fiat_value {
            let _ = write!(line, " (~{:.2} {})", value, fiat);
        }
        line.push_str(" in your wallet. ");

        match (self.since_last, self.since_first) {
            (Some(last), Some(first)) => {
                let _ = write!(
                    line,
                    "({}) since last check. ({}) since beginning.",
                    signed(last),
                    signed(first)
                );
            }
            _ => line.push_str("No history found"),
        }
        line
    }
}

pub struct BalanceMonitor {
    wallets: Vec<Arc<dyn Wallet>>,
    history: Arc<BalanceHistory>,
    market: Option<Arc<dyn MarketDataSource>>,
    fiat: Coin,
}

impl BalanceMonitor {
    pub fn new(
        wallets: Vec<Arc<dyn Wallet>>,
        history: Arc<BalanceHistory>,
        market: Option<Arc<dyn MarketDataSource>>,
    ) -> Self {
        Self {
            wallets,
            history,
            market,
            fiat: Coin::Usd,
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Report every wallet; one failing wallet does not stop the others.
    pub async fn report_all(&self) -> Vec<BalanceReport> {
        let mut reports = Vec::with_capacity(self.wallets.len());
        for wallet in &self.wallets {
            match self.report(wallet.as_ref()).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(coin = %wallet.coin(), "Balance report failed: {}", e),
            }
        }
        reports
    }

    pub async fn report(&self, wallet: &dyn Wallet) -> Result<BalanceReport> {
        let coin = wallet.coin();
        let amount = wallet.balance().await?;
        let snapshots = self.history.snapshots(coin).await?;

        let since_last = snapshots.last().map(|s| amount - s.amount);
        let since_first = snapshots.first().map(|s| amount - s.amount);
        let fiat_value = self.fiat_value(coin, amount).await;

        let report = BalanceReport {
            coin,
            amount,
            since_last,
            since_first,
            fiat_value,
        };
        info!(coin = %coin, "{}", report.summary(self.fiat));

        self.history
            .append(
                coin,
                BalanceSnapshot {
                    timestamp: Utc::now().timestamp_millis(),
                    amount,
                },
            )
            .await?;
        Ok(report)
    }

    async fn fiat_value(&self, coin: Coin, amount: Decimal) -> Option<f64> {
        let market = self.market.as_ref()?;
        match market.current_price(coin, self.fiat).await {
            Ok(price) => amount.to_f64().map(|a| a * price),
            Err(e) => {
                warn!(coin = %coin, "No {} price for balance valuation: {}", self.fiat, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwapdError;
    use crate::market::MockMarketDataSource;
    use crate::persistence::MemoryObjectStore;
    use crate::wallet::MockWallet;
    use rust_decimal_macros::dec;

    fn wallet(coin: Coin, balance: Decimal) -> MockWallet {
        let mut wallet = MockWallet::new();
        wallet.expect_coin().return_const(coin);
        wallet.expect_balance().returning(move || Ok(balance));
        wallet
    }

    #[tokio::test]
    async fn first_run_reports_no_history_and_appends_one_snapshot() {
        let history = Arc::new(BalanceHistory::new(Arc::new(MemoryObjectStore::new())));
        let monitor = BalanceMonitor::new(Vec::new(), history.clone(), None);

        let report = monitor.report(&wallet(Coin::Waves, dec!(14.5))).await.unwrap();
        assert_eq!(report.since_last, None);
        assert!(report.summary(Coin::Usd).ends_with("No history found"));
        assert_eq!(history.snapshots(Coin::Waves).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deltas_against_last_and_first_snapshot() {
        let history = Arc::new(BalanceHistory::new(Arc::new(MemoryObjectStore::new())));
        for (timestamp, amount) in [(1, dec!(1.0)), (2, dec!(0.8))] {
            history
                .append(Coin::Eth, BalanceSnapshot { timestamp, amount })
                .await
                .unwrap();
        }

        let mut market = MockMarketDataSource::new();
        market
            .expect_current_price()
            .returning(|_, _| Ok(2000.0));
        let monitor = BalanceMonitor::new(Vec::new(), history.clone(), Some(Arc::new(market)));

        let report = monitor.report(&wallet(Coin::Eth, dec!(0.9))).await.unwrap();
        assert_eq!(report.since_last, Some(dec!(0.1)));
        assert_eq!(report.since_first, Some(dec!(-0.1)));
        assert_eq!(report.fiat_value, Some(1800.0));
        assert_eq!(
            report.summary(Coin::Usd),
            "You have 0.9 ETH (~1800.00 USD) in your wallet. (+0.1) since last check. (-0.1) since beginning."
        );
        assert_eq!(history.snapshots(Coin::Eth).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failing_wallet_does_not_stop_the_others() {
        let history = Arc::new(BalanceHistory::new(Arc::new(MemoryObjectStore::new())));
        let mut broken = MockWallet::new();
        broken.expect_coin().return_const(Coin::Eth);
        broken
            .expect_balance()
            .returning(|| Err(SwapdError::Wallet("rpc down".into())));

        let monitor = BalanceMonitor::new(
            vec![Arc::new(broken), Arc::new(wallet(Coin::Waves, dec!(3)))],
            history.clone(),
            None,
        );
        let reports = monitor.report_all().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].coin, Coin::Waves);
        assert!(history.snapshots(Coin::Eth).await.unwrap().is_empty());
    }
}
