use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Canonical column set of the transaction dataset.
pub const TRANSACTION_COLUMNS: [&str; 18] = [
    "txn_id",
    "user_id",
    "timestamp",
    "amount",
    "currency",
    "merchant",
    "merchant_category",
    "city",
    "country",
    "channel",
    "is_foreign",
    "is_high_amount",
    "velocity_24h",
    "device_fingerprint",
    "ip_country",
    "merchant_risk_score",
    "label_fraud",
    "user_reported_issue",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txn_id: String,
    pub user_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub merchant_category: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, deserialize_with = "deserialize_lenient_flag")]
    pub is_foreign: bool,
    #[serde(default, deserialize_with = "deserialize_lenient_flag")]
    pub is_high_amount: bool,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    pub velocity_24h: Option<u32>,
    #[serde(default)]
    pub device_fingerprint: String,
    #[serde(default)]
    pub ip_country: String,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    pub merchant_risk_score: Option<f64>,
    /// `None` when the dataset leaves the label blank.
    #[serde(default, deserialize_with = "deserialize_opt_flag")]
    pub label_fraud: Option<bool>,
    #[serde(default)]
    pub user_reported_issue: String,
}

impl TransactionRecord {
    /// Field values in [`TRANSACTION_COLUMNS`] order, flags rendered as 0/1
    /// and absent values as empty cells.
    pub fn values(&self) -> Vec<String> {
        vec![
            self.txn_id.clone(),
            self.user_id.clone(),
            self.timestamp.clone(),
            opt_str(self.amount),
            self.currency.clone(),
            self.merchant.clone(),
            self.merchant_category.clone(),
            self.city.clone(),
            self.country.clone(),
            self.channel.clone(),
            flag_str(self.is_foreign).to_string(),
            flag_str(self.is_high_amount).to_string(),
            opt_str(self.velocity_24h),
            self.device_fingerprint.clone(),
            self.ip_country.clone(),
            opt_str(self.merchant_risk_score),
            self.label_fraud.map(flag_str).unwrap_or_default().to_string(),
            self.user_reported_issue.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudScoreRecord {
    pub txn_id: String,
    pub user_id: String,
    pub fraud_score: f64,
    #[serde(deserialize_with = "deserialize_flag")]
    pub fraud_label: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Strict inequalities on both boundaries: 0.75 is Medium, 0.40 is Low.
    pub fn from_mean_score(score: f64) -> Self {
        if score > 0.75 {
            RiskTier::High
        } else if score > 0.4 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        };
        f.write_str(label)
    }
}

/// Risk picture for one user, derived on every request.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskSummary {
    NoData,
    Profile {
        tier: RiskTier,
        mean_score: f64,
        flagged_pct: f64,
        record_count: usize,
    },
}

impl RiskSummary {
    pub fn tier(&self) -> Option<RiskTier> {
        match self {
            RiskSummary::NoData => None,
            RiskSummary::Profile { tier, .. } => Some(*tier),
        }
    }
}

impl fmt::Display for RiskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskSummary::NoData => f.write_str("No fraud risk data available."),
            RiskSummary::Profile {
                tier,
                mean_score,
                flagged_pct,
                ..
            } => write!(
                f,
                "User fraud risk: {} (avg score {}, {}% of recent transactions flagged).",
                tier,
                decimal(*mean_score),
                decimal(*flagged_pct)
            ),
        }
    }
}

/// One row of the flagged-transaction view: a positive fraud-score record
/// left-joined onto its transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedTransaction {
    pub txn_id: String,
    pub user_id: String,
    pub fraud_score: f64,
    pub occurred_at: Option<DateTime<Utc>>,
    pub transaction: Option<TransactionRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedView {
    pub columns: Vec<String>,
    pub rows: Vec<FlaggedTransaction>,
}

impl FlaggedView {
    /// Transaction columns followed by `fraud_score`.
    pub fn header(&self) -> Vec<String> {
        let mut header = self.columns.clone();
        header.push("fraud_score".to_string());
        header
    }

    /// Cells of `row` in `header()` order. Unknown columns are blank, and a row
    /// with no joined transaction only fills `txn_id` and `user_id`.
    pub fn record(&self, row: &FlaggedTransaction) -> Vec<String> {
        let values = row.transaction.as_ref().map(TransactionRecord::values);
        let mut record: Vec<String> = self
            .columns
            .iter()
            .map(|column| match &values {
                Some(values) => TRANSACTION_COLUMNS
                    .iter()
                    .position(|c| *c == column.as_str())
                    .map(|i| values[i].clone())
                    .unwrap_or_default(),
                None => match column.as_str() {
                    "txn_id" => row.txn_id.clone(),
                    "user_id" => row.user_id.clone(),
                    _ => String::new(),
                },
            })
            .collect();
        record.push(row.fraud_score.to_string());
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Priority::High),
            "MEDIUM" => Some(Priority::Medium),
            "LOW" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: Priority,
    pub response: String,
    pub confidence: f64,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            priority: Priority::Low,
            response: "Default response.".to_string(),
            confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub account_balance: Option<f64>,
    #[serde(default)]
    pub card_status: Option<String>,
    #[serde(default)]
    pub opened_at: Option<String>,
    #[serde(default)]
    pub reported_priority: Option<String>,
    #[serde(default)]
    pub chargeback_history: u32,
    #[serde(default)]
    pub last_login_ip_country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub user: String,
    pub priority: Priority,
    pub response: String,
    pub confidence: f64,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

/// Renders a float the way a report reader expects: whole values keep one
/// decimal (`90.0`), everything else uses the shortest exact form (`0.82`).
pub fn decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Half-to-even, so 0.7505 rounds to 0.75 at three digits.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round_ties_even() / factor
}

fn flag_str(flag: bool) -> &'static str {
    if flag {
        "1"
    } else {
        "0"
    }
}

fn opt_str<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" => Some(true),
        "0" | "0.0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Raw cell as CSV or JSON hands it over.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    fn as_flag(&self) -> Option<bool> {
        match self {
            Cell::Bool(flag) => Some(*flag),
            Cell::Number(n) if *n == 1.0 => Some(true),
            Cell::Number(n) if *n == 0.0 => Some(false),
            Cell::Number(_) => None,
            Cell::Text(raw) => parse_flag(raw),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Bool(_) => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(raw) => raw.trim().parse().ok(),
        }
    }
}

/// Strict: blank means false, anything unrecognized rejects the row.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Cell>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Cell::Text(raw)) if raw.trim().is_empty() => Ok(false),
        Some(cell) => cell
            .as_flag()
            .ok_or_else(|| serde::de::Error::custom("invalid flag value")),
    }
}

fn deserialize_lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_opt_flag(deserializer)?.unwrap_or(false))
}

fn deserialize_opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Cell>::deserialize(deserializer)?.and_then(|cell| cell.as_flag()))
}

fn deserialize_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Cell>::deserialize(deserializer)?.and_then(|cell| cell.as_number()))
}

/// Accepts float-formatted counts such as `3.0`.
fn deserialize_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_opt_f64(deserializer)?
        .filter(|n| n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(n))
        .map(|n| n as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_exclusive() {
        assert_eq!(RiskTier::from_mean_score(0.76), RiskTier::High);
        assert_eq!(RiskTier::from_mean_score(0.75), RiskTier::Medium);
        assert_eq!(RiskTier::from_mean_score(0.41), RiskTier::Medium);
        assert_eq!(RiskTier::from_mean_score(0.4), RiskTier::Low);
        assert_eq!(RiskTier::from_mean_score(0.0), RiskTier::Low);
    }

    #[test]
    fn summary_text_keeps_trailing_decimal() {
        let summary = RiskSummary::Profile {
            tier: RiskTier::High,
            mean_score: 0.82,
            flagged_pct: 90.0,
            record_count: 10,
        };
        assert_eq!(
            summary.to_string(),
            "User fraud risk: High (avg score 0.82, 90.0% of recent transactions flagged)."
        );
        assert_eq!(RiskSummary::NoData.to_string(), "No fraud risk data available.");
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!(Priority::parse(" high "), Some(Priority::High));
        assert_eq!(Priority::parse("Medium"), Some(Priority::Medium));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn priority_serializes_uppercase() {
        let json = serde_json::to_string(&Classification::fallback()).unwrap();
        assert_eq!(
            json,
            r#"{"priority":"LOW","response":"Default response.","confidence":0.7}"#
        );
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_to(0.7505, 3), 0.75);
        assert_eq!(round_to(0.4005, 3), 0.4);
        assert_eq!(round_to(33.333_333, 1), 33.3);
    }

    #[test]
    fn blank_numeric_cells_keep_the_row() {
        let data = "txn_id,user_id,timestamp,amount,velocity_24h,merchant_risk_score,label_fraud\n\
                    t1,u1,2024-01-01T00:00:00Z,500,,,\n\
                    t2,u1,2024-01-02T00:00:00Z,,3.0,0.4,1\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<TransactionRecord> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, Some(500.0));
        assert_eq!(rows[0].velocity_24h, None);
        assert_eq!(rows[0].label_fraud, None);
        assert_eq!(rows[1].amount, None);
        assert_eq!(rows[1].velocity_24h, Some(3));
        assert_eq!(rows[1].merchant_risk_score, Some(0.4));
        assert_eq!(rows[1].label_fraud, Some(true));
        assert_eq!(rows[1].values()[3], "");
        assert_eq!(rows[0].values()[16], "");
    }

    #[test]
    fn flagged_record_follows_header_order() {
        let data = "txn_id,user_id,timestamp,amount,label_fraud\nt1,u1,2024-01-01T00:00:00Z,42.5,1\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let txn: TransactionRecord = reader.deserialize().next().unwrap().unwrap();
        let view = FlaggedView {
            columns: vec!["amount".into(), "txn_id".into(), "extra".into(), "user_id".into()],
            rows: Vec::new(),
        };

        let joined = FlaggedTransaction {
            txn_id: "t1".into(),
            user_id: "u1".into(),
            fraud_score: 0.9,
            occurred_at: None,
            transaction: Some(txn),
        };
        let orphan = FlaggedTransaction {
            txn_id: "t9".into(),
            transaction: None,
            ..joined.clone()
        };

        assert_eq!(view.header(), ["amount", "txn_id", "extra", "user_id", "fraud_score"]);
        assert_eq!(view.record(&joined), ["42.5", "t1", "", "u1", "0.9"]);
        assert_eq!(view.record(&orphan), ["", "t9", "", "u1", "0.9"]);
    }

    #[test]
    fn flags_accept_common_spellings() {
        let data = "txn_id,user_id,fraud_score,fraud_label\nt1,u1,0.9,1\nt2,u1,0.1,False\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<FraudScoreRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert!(rows[0].fraud_label);
        assert!(!rows[1].fraud_label);
    }
}
