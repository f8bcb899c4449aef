use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dataset::{parse_timestamp, ReferenceData};
use crate::models::{round_to, FlaggedTransaction, FlaggedView, RiskSummary, RiskTier};

/// Answers per-user risk questions from the read-only reference data.
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    data: Arc<ReferenceData>,
}

impl RiskAggregator {
    pub fn new(data: Arc<ReferenceData>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }

    pub fn summarize(&self, user_id: &str) -> RiskSummary {
        let Some(scores) = self.data.fraud_scores() else {
            return RiskSummary::NoData;
        };

        let mut count = 0usize;
        let mut score_total = 0.0;
        let mut flagged = 0usize;
        for record in scores.iter().filter(|r| r.user_id == user_id) {
            count += 1;
            score_total += record.fraud_score;
            if record.fraud_label {
                flagged += 1;
            }
        }

        if count == 0 {
            return RiskSummary::NoData;
        }

        let mean_score = round_to(score_total / count as f64, 3);
        let flagged_pct = round_to(flagged as f64 / count as f64 * 100.0, 1);

        RiskSummary::Profile {
            tier: RiskTier::from_mean_score(mean_score),
            mean_score,
            flagged_pct,
            record_count: count,
        }
    }

    /// Positive fraud-score records for the user, joined onto their
    /// transactions and ordered newest first. Rows whose timestamp is missing
    /// or unparseable come last.
    pub fn flagged_transactions(&self, user_id: &str) -> FlaggedView {
        let columns = self.data.transaction_columns().to_vec();
        let Some(scores) = self.data.fraud_scores() else {
            return FlaggedView {
                columns,
                rows: Vec::new(),
            };
        };

        let by_txn: HashMap<&str, _> = self
            .data
            .transactions()
            .unwrap_or_default()
            .iter()
            .map(|txn| (txn.txn_id.as_str(), txn))
            .collect();

        let mut rows: Vec<FlaggedTransaction> = scores
            .iter()
            .filter(|r| r.user_id == user_id && r.fraud_label)
            .map(|record| {
                let transaction = by_txn.get(record.txn_id.as_str()).map(|txn| (*txn).clone());
                let occurred_at = transaction
                    .as_ref()
                    .and_then(|txn| parse_timestamp(&txn.timestamp));
                FlaggedTransaction {
                    txn_id: record.txn_id.clone(),
                    user_id: record.user_id.clone(),
                    fraud_score: record.fraud_score,
                    occurred_at,
                    transaction,
                }
            })
            .collect();

        rows.sort_by(|a, b| match (a.occurred_at, b.occurred_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        FlaggedView { columns, rows }
    }
}
