//! Periodic maintenance: rule extension, standalone templates and balance repair.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use kitamo_domain::{Transaction, TransactionKind, TransactionStatus};

use crate::{
    balance::{BalanceAdjuster, Direction},
    materializer::{Materializer, DEFAULT_HORIZON_MONTHS},
    storage::{LedgerStore, TransactionFilter},
    CoreError,
};

/// Runs allowed per template per call when catching up on missed days.
pub const MAX_TEMPLATE_CATCH_UP: usize = 366;

/// A rule the job could not extend.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionReport {
    pub rules_processed: usize,
    pub transactions_created: usize,
    pub failures: Vec<RuleFailure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateReport {
    pub templates_run: usize,
    pub transactions_created: usize,
    pub templates_finished: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyReport {
    pub extension: ExtensionReport,
    pub templates: TemplateReport,
}

/// A cached balance that disagreed with its transactions and was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCorrection {
    pub account_id: Uuid,
    pub previous: Decimal,
    pub corrected: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduledJobs {
    horizon_months: u32,
}

impl Default for ScheduledJobs {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_MONTHS)
    }
}

impl ScheduledJobs {
    pub fn new(horizon_months: u32) -> Self {
        Self { horizon_months }
    }

    /// Extends every active rule that has not ended before `today`.
    ///
    /// Each rule is processed on its own: a failure is recorded in the report
    /// and the remaining rules still run.
    pub fn extend_all_rules<S>(
        &self,
        store: &S,
        today: NaiveDate,
    ) -> Result<ExtensionReport, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let mut report = ExtensionReport::default();
        let rule_ids: Vec<Uuid> = store
            .rules()?
            .into_iter()
            .filter(|rule| rule.active && rule.end_date.map_or(true, |end| end >= today))
            .map(|rule| rule.id)
            .collect();

        for rule_id in rule_ids {
            report.rules_processed += 1;
            match Materializer::extend(store, rule_id, self.horizon_months, today) {
                Ok(created) => report.transactions_created += created,
                Err(err) => {
                    warn!(rule = %rule_id, error = %err, "rule extension failed");
                    report.failures.push(RuleFailure {
                        rule_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            rules = report.rules_processed,
            created = report.transactions_created,
            failed = report.failures.len(),
            "rule extension finished"
        );
        Ok(report)
    }

    /// Fires every standalone template whose next run is due.
    ///
    /// Income is booked as received and expenses as pending. Missed runs are
    /// caught up, at most [`MAX_TEMPLATE_CATCH_UP`] per template.
    pub fn apply_standalone_templates<S>(
        &self,
        store: &S,
        today: NaiveDate,
    ) -> Result<TemplateReport, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let mut report = TemplateReport::default();
        for mut template in store.templates()? {
            if !template.is_due(today) {
                continue;
            }
            report.templates_run += 1;

            let mut runs = 0;
            while template.active && template.next_run <= today && runs < MAX_TEMPLATE_CATCH_UP
            {
                let run_date = template.next_run;
                if template.end_date.is_some_and(|end| run_date > end) {
                    template.active = false;
                    break;
                }

                let mut txn = Transaction::new(
                    template.account_id,
                    template.kind,
                    template.amount,
                    template.description.clone(),
                    run_date,
                );
                txn.category_id = template.category_id;
                txn.tags = template.tags.clone();
                if template.kind == TransactionKind::Income {
                    txn.settle(run_date);
                } else {
                    txn.status = TransactionStatus::Pending;
                }
                let txn = store.create_transaction(txn)?;
                BalanceAdjuster::adjust_stored(store, &txn, Direction::Apply)?;
                report.transactions_created += 1;
                runs += 1;

                template.next_run = template.frequency.next_date(run_date);
                if template.end_date.is_some_and(|end| template.next_run > end) {
                    template.active = false;
                }
            }
            if !template.active {
                report.templates_finished += 1;
            }
            store.save_template(&template)?;
        }

        if report.templates_run > 0 {
            info!(
                templates = report.templates_run,
                created = report.transactions_created,
                "standalone templates applied"
            );
        }
        Ok(report)
    }

    /// Rewrites any cached balance that differs from initial balance plus
    /// effective transactions.
    pub fn recalculate_balances<S>(&self, store: &S) -> Result<Vec<BalanceCorrection>, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let mut corrections = Vec::new();
        for account in store.accounts()? {
            let txns =
                store.find_transactions(&TransactionFilter::for_accounts(vec![account.id]))?;
            let expected = BalanceAdjuster::recompute(&account, &txns);
            if expected == account.current_balance {
                continue;
            }
            store.update_account(account.id, &mut |stored| stored.current_balance = expected)?;
            warn!(
                account = %account.id,
                previous = %account.current_balance,
                corrected = %expected,
                "cached balance drifted; corrected"
            );
            corrections.push(BalanceCorrection {
                account_id: account.id,
                previous: account.current_balance,
                corrected: expected,
            });
        }
        Ok(corrections)
    }

    /// The daily trigger: extend rules, then fire due templates.
    pub fn run_daily<S>(&self, store: &S, today: NaiveDate) -> Result<DailyReport, CoreError>
    where
        S: LedgerStore + ?Sized,
    {
        let extension = self.extend_all_rules(store, today)?;
        let templates = self.apply_standalone_templates(store, today)?;
        Ok(DailyReport {
            extension,
            templates,
        })
    }
}
