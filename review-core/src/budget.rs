//! Budget enforcer: daily/monthly/per-PR/per-repo cost gates.
//!
//! Spend queries failing (persistence error) return 0 rather than
//! propagating — the enforcer never blocks a review on its own plumbing.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};

use crate::types::{BudgetKind, BudgetStatus};

/// Read-only view over the cost ledger. The billing recorder (outside this
/// crate) is the only writer; every other component only queries spend.
pub trait CostLedger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sum of `cost_usd` for entries with `timestamp` in `[since, until)`,
    /// optionally filtered to one repo slug (`"owner/name"`).
    fn spend_since(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        repo: Option<&str>,
    ) -> impl std::future::Future<Output = Result<f64, Self::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub daily_budget_usd: f64,
    pub per_pr_budget_usd: f64,
    pub monthly_budget_usd: f64,
    pub warning_threshold: f64,
    pub repo_daily_budgets: HashMap<String, f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: 50.0,
            per_pr_budget_usd: 5.0,
            monthly_budget_usd: 1000.0,
            warning_threshold: 0.8,
            repo_daily_budgets: HashMap::new(),
        }
    }
}

pub struct BudgetEnforcer<L: CostLedger> {
    cfg: BudgetConfig,
    ledger: L,
}

impl<L: CostLedger> BudgetEnforcer<L> {
    pub fn new(cfg: BudgetConfig, ledger: L) -> Self {
        Self { cfg, ledger }
    }

    fn status(&self, kind: BudgetKind, limit: f64, spent: f64) -> BudgetStatus {
        let percentage = if limit > 0.0 {
            100.0 * spent / limit
        } else {
            0.0
        };
        let exceeded = spent >= limit;
        let warning = percentage / 100.0 >= self.cfg.warning_threshold;
        BudgetStatus {
            kind,
            limit_usd: limit,
            spent_usd: spent,
            remaining_usd: (limit - spent).max(0.0),
            percentage,
            exceeded,
            warning,
            can_proceed: !exceeded,
        }
    }

    /// Checks today's UTC-day spend against the daily budget, optionally
    /// scoped to a repo with an override in `repo_daily_budgets`.
    pub async fn check_daily_budget(&self, repo: Option<&str>) -> BudgetStatus {
        let now = Utc::now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let spent = self
            .ledger
            .spend_since(day_start, now, repo)
            .await
            .unwrap_or(0.0);
        let limit = repo
            .and_then(|r| self.cfg.repo_daily_budgets.get(r).copied())
            .unwrap_or(self.cfg.daily_budget_usd);
        self.status(BudgetKind::Daily, limit, spent)
    }

    /// Checks the projected per-PR spend: `current + estimated >= limit`.
    /// `current` is read from the ledger filtered to `repo`; a ledger
    /// failure is treated as zero current spend (fail-open to zero), and
    /// `estimated_cost` still participates in the projected total.
    pub async fn check_pr_budget(
        &self,
        _pr_number: u64,
        repo: &str,
        estimated_cost: f64,
    ) -> BudgetStatus {
        let now = Utc::now();
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let current = self
            .ledger
            .spend_since(epoch, now, Some(repo))
            .await
            .unwrap_or(0.0);
        let projected = current + estimated_cost;
        self.status(BudgetKind::PerPr, self.cfg.per_pr_budget_usd, projected)
    }

    /// Checks current-UTC-month spend against the monthly budget.
    pub async fn check_monthly_budget(&self) -> BudgetStatus {
        let now = Utc::now();
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let spent = self
            .ledger
            .spend_since(month_start, now, None)
            .await
            .unwrap_or(0.0);
        self.status(BudgetKind::Monthly, self.cfg.monthly_budget_usd, spent)
    }

    /// Logical AND of the three checks' `can_proceed`.
    pub async fn can_review_pr(&self, pr_number: u64, repo: &str, estimated_cost: f64) -> bool {
        let daily = self.check_daily_budget(Some(repo)).await;
        let pr = self.check_pr_budget(pr_number, repo, estimated_cost).await;
        let monthly = self.check_monthly_budget().await;
        daily.can_proceed && pr.can_proceed && monthly.can_proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLedger(f64);

    impl CostLedger for FixedLedger {
        type Error = std::convert::Infallible;

        async fn spend_since(
            &self,
            _since: DateTime<Utc>,
            _until: DateTime<Utc>,
            _repo: Option<&str>,
        ) -> Result<f64, Self::Error> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn zero_limit_is_always_exceeded() {
        let cfg = BudgetConfig {
            daily_budget_usd: 0.0,
            ..Default::default()
        };
        let enforcer = BudgetEnforcer::new(cfg, FixedLedger(0.0));
        let status = enforcer.check_daily_budget(None).await;
        assert_eq!(status.percentage, 0.0);
        assert!(status.exceeded);
        assert!(!status.can_proceed);
    }

    #[tokio::test]
    async fn warning_fires_before_exceeded() {
        let cfg = BudgetConfig {
            daily_budget_usd: 50.0,
            warning_threshold: 0.8,
            ..Default::default()
        };
        let enforcer = BudgetEnforcer::new(cfg, FixedLedger(49.50));
        let status = enforcer.check_daily_budget(None).await;
        assert!(status.warning);
        assert!(!status.exceeded);
        assert!(status.can_proceed);
    }

    #[tokio::test]
    async fn per_pr_projection_adds_estimated_cost() {
        let cfg = BudgetConfig {
            per_pr_budget_usd: 5.0,
            ..Default::default()
        };
        let enforcer = BudgetEnforcer::new(cfg, FixedLedger(4.5));
        let status = enforcer.check_pr_budget(1, "o/r", 1.0).await;
        assert!(status.exceeded);

        let enforcer2 = BudgetEnforcer::new(
            BudgetConfig {
                per_pr_budget_usd: 5.0,
                ..Default::default()
            },
            FixedLedger(1.0),
        );
        let status2 = enforcer2.check_pr_budget(1, "o/r", 1.0).await;
        assert!(!status2.exceeded);
    }

    #[tokio::test]
    async fn ledger_failure_is_treated_as_zero_spend() {
        #[derive(Debug, thiserror::Error)]
        #[error("ledger unavailable")]
        struct LedgerDown;

        struct FailingLedger;
        impl CostLedger for FailingLedger {
            type Error = LedgerDown;
            async fn spend_since(
                &self,
                _since: DateTime<Utc>,
                _until: DateTime<Utc>,
                _repo: Option<&str>,
            ) -> Result<f64, Self::Error> {
                Err(LedgerDown)
            }
        }

        let enforcer = BudgetEnforcer::new(
            BudgetConfig {
                daily_budget_usd: 50.0,
                ..Default::default()
            },
            FailingLedger,
        );
        let status = enforcer.check_daily_budget(None).await;
        assert_eq!(status.spent_usd, 0.0);
        assert!(!status.exceeded);
    }
}
