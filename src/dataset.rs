use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Account, FraudScoreRecord, TransactionRecord, TRANSACTION_COLUMNS};

/// Reference datasets loaded once at startup and never mutated afterwards.
/// A dataset whose file was absent is `None`, which downstream readers treat
/// as "no data" rather than an error.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    transactions: Option<Vec<TransactionRecord>>,
    transaction_columns: Vec<String>,
    fraud_scores: Option<Vec<FraudScoreRecord>>,
}

impl ReferenceData {
    pub fn load(transactions_path: &Path, fraud_scores_path: &Path) -> anyhow::Result<Self> {
        let (transactions, header) = match read_optional_csv::<TransactionRecord>(transactions_path)? {
            Some((rows, header)) => (Some(rows), Some(header)),
            None => (None, None),
        };
        let fraud_scores =
            read_optional_csv::<FraudScoreRecord>(fraud_scores_path)?.map(|(rows, _)| rows);

        if fraud_scores.is_none() {
            warn!(
                path = %fraud_scores_path.display(),
                "fraud score dataset missing, running without risk context"
            );
        }
        if transactions.is_none() {
            warn!(
                path = %transactions_path.display(),
                "transaction dataset missing, flagged views will be empty"
            );
        }

        Ok(Self {
            transaction_columns: header.unwrap_or_else(canonical_columns),
            transactions,
            fraud_scores,
        })
    }

    #[cfg(test)]
    pub fn from_records(
        transactions: Option<Vec<TransactionRecord>>,
        fraud_scores: Option<Vec<FraudScoreRecord>>,
    ) -> Self {
        Self {
            transactions,
            transaction_columns: canonical_columns(),
            fraud_scores,
        }
    }

    pub fn transactions(&self) -> Option<&[TransactionRecord]> {
        self.transactions.as_deref()
    }

    pub fn fraud_scores(&self) -> Option<&[FraudScoreRecord]> {
        self.fraud_scores.as_deref()
    }

    pub fn transaction_columns(&self) -> &[String] {
        &self.transaction_columns
    }

    pub fn transactions_for_user(&self, user_id: &str) -> Vec<&TransactionRecord> {
        self.transactions()
            .unwrap_or_default()
            .iter()
            .filter(|txn| txn.user_id == user_id)
            .collect()
    }
}

fn canonical_columns() -> Vec<String> {
    TRANSACTION_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn read_optional_csv<T: DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<(Vec<T>, Vec<String>)>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let header = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                tracing::debug!(path = %path.display(), error = %e, "skipping undecodable row");
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "some rows could not be decoded");
    }
    info!(path = %path.display(), rows = rows.len(), "loaded reference dataset");

    Ok(Some((rows, header)))
}

/// Normalizes a raw timestamp to UTC. Offset-less values are taken as UTC;
/// anything unrecognized is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn load_accounts(path: &Path) -> anyhow::Result<BTreeMap<String, Account>> {
    if !path.exists() {
        warn!(path = %path.display(), "accounts file missing, using built-in accounts");
        return Ok(builtin_accounts());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let accounts: Vec<Account> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    Ok(accounts
        .into_iter()
        .map(|account| (account.user_id.clone(), account))
        .collect())
}

fn builtin_accounts() -> BTreeMap<String, Account> {
    let accounts = vec![
        ("user_001", "Alex Johnson", 2350.21, "Active"),
        ("user_002", "Jamie Patel", 542.87, "Frozen"),
        ("user_003", "Riley Chen", 7129.42, "Active"),
    ];

    accounts
        .into_iter()
        .map(|(user_id, name, balance, status)| {
            (
                user_id.to_string(),
                Account {
                    user_id: user_id.to_string(),
                    name: name.to_string(),
                    account_balance: Some(balance),
                    card_status: Some(status.to_string()),
                    opened_at: None,
                    reported_priority: None,
                    chargeback_history: 0,
                    last_login_ip_country: None,
                },
            )
        })
        .collect()
}

/// Demo maintenance utility: appends `count` synthetic flagged transactions
/// for `user_id` to both reference files. Running servers keep their loaded
/// snapshot until restarted.
pub fn inject_synthetic_fraud(
    transactions_path: &Path,
    fraud_scores_path: &Path,
    user_id: &str,
    count: usize,
    score: f64,
) -> anyhow::Result<usize> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&score),
        "fraud score must be within [0, 1], got {score}"
    );

    let mut txn_writer = append_writer(transactions_path, &TRANSACTION_COLUMNS)?;
    let mut score_writer = append_writer(
        fraud_scores_path,
        &["txn_id", "user_id", "fraud_score", "fraud_label"],
    )?;

    let now = Utc::now();
    for index in 0..count {
        let txn_id = format!("synthetic-{}", Uuid::new_v4());
        let record = TransactionRecord {
            txn_id: txn_id.clone(),
            user_id: user_id.to_string(),
            timestamp: (now - Duration::hours(index as i64)).to_rfc3339(),
            amount: Some(950.0 + 125.0 * index as f64),
            currency: "USD".to_string(),
            merchant: "Unknown Online Merchant".to_string(),
            merchant_category: "electronics".to_string(),
            city: "Lagos".to_string(),
            country: "NG".to_string(),
            channel: "online".to_string(),
            is_foreign: true,
            is_high_amount: true,
            velocity_24h: Some((count + 3) as u32),
            device_fingerprint: format!("dev-{}", &txn_id[10..18]),
            ip_country: "NG".to_string(),
            merchant_risk_score: Some(0.9),
            label_fraud: Some(true),
            user_reported_issue: String::new(),
        };
        txn_writer.write_record(record.values())?;
        score_writer.write_record([
            txn_id.as_str(),
            user_id,
            score.to_string().as_str(),
            "1",
        ])?;
    }

    txn_writer.flush()?;
    score_writer.flush()?;
    info!(user_id, count, score, "injected synthetic fraud records");
    Ok(count)
}

fn append_writer(path: &Path, header: &[&str]) -> anyhow::Result<csv::Writer<std::fs::File>> {
    let is_new = !path.exists() || std::fs::metadata(path)?.len() == 0;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(header)?;
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskAggregator;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01"), Some(expected));
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn missing_files_load_as_absent() {
        let dir = TempDir::new().unwrap();
        let data = ReferenceData::load(
            &dir.path().join("transactions.csv"),
            &dir.path().join("fraud_scores.csv"),
        )
        .unwrap();
        assert!(data.transactions().is_none());
        assert!(data.fraud_scores().is_none());
        assert_eq!(data.transaction_columns().len(), TRANSACTION_COLUMNS.len());
    }

    #[test]
    fn loads_csv_and_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let fraud_path = dir.path().join("fraud_scores.csv");
        std::fs::write(
            &fraud_path,
            "txn_id,user_id,fraud_score,fraud_label\nt1,u1,0.95,1\nt2,u1,oops,0\n",
        )
        .unwrap();
        let txn_path = dir.path().join("transactions.csv");
        std::fs::write(
            &txn_path,
            "txn_id,user_id,timestamp,amount\nt1,u1,2024-01-01T00:00:00Z,500\n",
        )
        .unwrap();

        let data = ReferenceData::load(&txn_path, &fraud_path).unwrap();
        assert_eq!(data.fraud_scores().unwrap().len(), 1);
        assert_eq!(data.transactions().unwrap()[0].amount, Some(500.0));
        assert_eq!(
            data.transaction_columns(),
            &["txn_id", "user_id", "timestamp", "amount"]
        );
    }

    #[test]
    fn blank_numeric_cells_do_not_drop_transactions() {
        let dir = TempDir::new().unwrap();
        let txn_path = dir.path().join("transactions.csv");
        std::fs::write(
            &txn_path,
            "txn_id,user_id,timestamp,amount,velocity_24h,label_fraud\n\
             t1,u1,2024-01-01T00:00:00Z,500,,\n\
             t2,u1,2024-02-01T00:00:00Z,,3.0,1\n",
        )
        .unwrap();
        let fraud_path = dir.path().join("fraud_scores.csv");
        std::fs::write(
            &fraud_path,
            "txn_id,user_id,fraud_score,fraud_label\nt1,u1,0.9,1\nt2,u1,0.8,1\n",
        )
        .unwrap();

        let data = Arc::new(ReferenceData::load(&txn_path, &fraud_path).unwrap());
        assert_eq!(data.transactions().unwrap().len(), 2);

        let view = RiskAggregator::new(data).flagged_transactions("u1");
        let ids: Vec<&str> = view.rows.iter().map(|r| r.txn_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
        assert!(view.rows.iter().all(|r| r.transaction.is_some() && r.occurred_at.is_some()));
    }

    #[test]
    fn builtin_accounts_used_without_file() {
        let dir = TempDir::new().unwrap();
        let accounts = load_accounts(&dir.path().join("accounts.json")).unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts["user_002"].card_status.as_deref(), Some("Frozen"));
    }

    #[test]
    fn injected_records_are_readable() {
        let dir = TempDir::new().unwrap();
        let txn_path = dir.path().join("data/transactions.csv");
        let fraud_path = dir.path().join("data/fraud_scores.csv");

        inject_synthetic_fraud(&txn_path, &fraud_path, "u9", 2, 0.9).unwrap();
        inject_synthetic_fraud(&txn_path, &fraud_path, "u9", 1, 0.8).unwrap();

        let data = ReferenceData::load(&txn_path, &fraud_path).unwrap();
        assert_eq!(data.transactions().unwrap().len(), 3);
        let scores = data.fraud_scores().unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.user_id == "u9" && s.fraud_label));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let dir = TempDir::new().unwrap();
        let result = inject_synthetic_fraud(
            &dir.path().join("t.csv"),
            &dir.path().join("f.csv"),
            "u1",
            1,
            1.5,
        );
        assert!(result.is_err());
    }
}
