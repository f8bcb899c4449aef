use std::fmt::Write;

use crate::dataset::parse_timestamp;
use crate::models::{decimal, Account, ChatEntry, RiskSummary, TransactionRecord};

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub min_amount: f64,
    pub only_foreign: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCounts {
    pub flagged: usize,
    pub not_flagged: usize,
    /// Rows with a blank fraud label
    pub unknown: usize,
}

/// Newest first; rows with unknown timestamps go last.
pub fn recent_transactions<'a>(
    transactions: &[&'a TransactionRecord],
    filter: &TransactionFilter,
) -> Vec<&'a TransactionRecord> {
    let mut rows: Vec<&TransactionRecord> = transactions
        .iter()
        .copied()
        .filter(|txn| {
            filter.min_amount <= 0.0 || txn.amount.is_some_and(|amount| amount >= filter.min_amount)
        })
        .filter(|txn| !filter.only_foreign || txn.is_foreign)
        .collect();

    rows.sort_by_key(|txn| std::cmp::Reverse(parse_timestamp(&txn.timestamp)));
    rows
}

pub fn count_flags(transactions: &[&TransactionRecord]) -> FlagCounts {
    let mut counts = FlagCounts {
        flagged: 0,
        not_flagged: 0,
        unknown: 0,
    };
    for txn in transactions {
        match txn.label_fraud {
            Some(true) => counts.flagged += 1,
            Some(false) => counts.not_flagged += 1,
            None => counts.unknown += 1,
        }
    }
    counts
}

pub fn build_report(
    user_id: &str,
    account: Option<&Account>,
    summary: &RiskSummary,
    transactions: &[&TransactionRecord],
    filter: &TransactionFilter,
    chats: &[ChatEntry],
) -> String {
    let mut output = String::new();
    let name = account.map(|a| a.name.as_str()).unwrap_or("Unknown");

    let _ = writeln!(output, "# Customer Overview: {} ({})", name, user_id);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Account");

    match account {
        Some(account) => {
            let balance = account
                .account_balance
                .map(|b| format!("${b:.2}"))
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(output, "- Balance: {}", balance);
            let _ = writeln!(
                output,
                "- Card status: {}",
                account.card_status.as_deref().unwrap_or("N/A")
            );
            let _ = writeln!(
                output,
                "- Opened: {}",
                account.opened_at.as_deref().unwrap_or("unknown")
            );
            let _ = writeln!(
                output,
                "- Reported priority: {}",
                account.reported_priority.as_deref().unwrap_or("N/A")
            );
            let _ = writeln!(output, "- Chargebacks: {}", account.chargeback_history);
            let _ = writeln!(
                output,
                "- Last login country: {}",
                account.last_login_ip_country.as_deref().unwrap_or("N/A")
            );
        }
        None => {
            let _ = writeln!(output, "No account metadata on file.");
        }
    }

    if let RiskSummary::Profile { mean_score, .. } = summary {
        let _ = writeln!(output, "- Avg fraud risk: {:.2}", mean_score);
    }
    let _ = writeln!(output, "- {}", summary);

    let rows = recent_transactions(transactions, filter);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Transactions");

    if rows.is_empty() {
        let _ = writeln!(output, "No transactions available for this user.");
    } else {
        let _ = writeln!(output, "Showing {} transaction(s).", rows.len());
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "| timestamp | txn_id | merchant | category | amount | country | channel | foreign | merchant risk | fraud |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
        for txn in rows.iter() {
            let timestamp = parse_timestamp(&txn.timestamp)
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                timestamp,
                txn.txn_id,
                txn.merchant,
                txn.merchant_category,
                txn.amount
                    .map(|amount| format!("${amount:.2}"))
                    .unwrap_or_default(),
                txn.country,
                txn.channel,
                if txn.is_foreign { "yes" } else { "no" },
                txn.merchant_risk_score.map(decimal).unwrap_or_default(),
                match txn.label_fraud {
                    Some(true) => "**FLAGGED**",
                    Some(false) => "",
                    None => "unknown",
                }
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Quick Analytics");

    if rows.is_empty() {
        let _ = writeln!(output, "No analytics available.");
    } else {
        let counts = count_flags(&rows);
        let _ = writeln!(output, "- Flagged: {}", counts.flagged);
        let _ = writeln!(output, "- Not flagged: {}", counts.not_flagged);
        if counts.unknown > 0 {
            let _ = writeln!(output, "- Unknown: {}", counts.unknown);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversation");

    if chats.is_empty() {
        let _ = writeln!(output, "No messages yet for this user.");
    } else {
        for chat in chats.iter().rev() {
            let ts = chat.ts.map(|ts| ts.to_rfc3339()).unwrap_or_default();
            let _ = writeln!(output, "- **You:** {}", chat.user);
            let _ = writeln!(
                output,
                "  **Priority:** {} ({:.0}% confidence) {}",
                chat.priority.as_str(),
                chat.confidence * 100.0,
                ts
            );
            let _ = writeln!(output, "  **Assistant:** {}", chat.response);
        }
    }

    output
}
