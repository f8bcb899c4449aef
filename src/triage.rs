//! Risk-aware message triage.
//!
//! Each call looks up the user's risk summary, asks the external classifier
//! for a priority, and parses the reply. Every failure along the way ends in
//! [`Classification::fallback`]; `classify` itself never errors.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::metrics::TriageMetrics;
use crate::models::{Classification, Priority, RiskSummary};
use crate::risk::RiskAggregator;

pub struct TriageEngine {
    aggregator: RiskAggregator,
    classifier: Arc<dyn Classifier>,
    metrics: Arc<TriageMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplyError {
    NoJsonObject,
    Malformed,
    InvalidField(&'static str),
}

impl ReplyError {
    fn kind(&self) -> &'static str {
        match self {
            ReplyError::NoJsonObject => "no_json_object",
            ReplyError::Malformed => "malformed_json",
            ReplyError::InvalidField(_) => "invalid_field",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReply {
    priority: String,
    response: String,
    confidence: f64,
}

impl TriageEngine {
    pub fn new(
        aggregator: RiskAggregator,
        classifier: Arc<dyn Classifier>,
        metrics: Arc<TriageMetrics>,
    ) -> Self {
        Self {
            aggregator,
            classifier,
            metrics,
        }
    }

    pub fn aggregator(&self) -> &RiskAggregator {
        &self.aggregator
    }

    pub fn metrics(&self) -> &TriageMetrics {
        &self.metrics
    }

    pub async fn classify(&self, message: &str, user_id: &str) -> Classification {
        let summary = self.aggregator.summarize(user_id);
        let prompt = build_prompt(&summary, message);

        let text = match self.classifier.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, error_kind = e.kind(), "classifier call failed, using fallback");
                self.metrics.record_fallback(e.kind());
                return Classification::fallback();
            }
        };

        match parse_reply(&text) {
            Ok(classification) => {
                info!(
                    user_id,
                    risk_tier = ?summary.tier(),
                    priority = classification.priority.as_str(),
                    confidence = classification.confidence,
                    "message classified"
                );
                self.metrics.record_classified(classification.priority);
                classification
            }
            Err(e) => {
                let field = match &e {
                    ReplyError::InvalidField(field) => *field,
                    _ => "",
                };
                warn!(
                    user_id,
                    error_kind = e.kind(),
                    field,
                    "classifier reply unusable, using fallback"
                );
                self.metrics.record_fallback(e.kind());
                Classification::fallback()
            }
        }
    }
}

pub fn build_prompt(summary: &RiskSummary, message: &str) -> String {
    format!(
        r#"You are a customer service assistant for a retail bank.
Below are the customer's fraud risk summary and their message.

FRAUD CONTEXT:
{summary}

USER MESSAGE:
"{message}"

Using both the fraud context and the message content, classify the issue as HIGH, MEDIUM, or LOW priority:
- HIGH: fraud, suspicious activity, financial distress, or a high-risk account.
- MEDIUM: payment issues, balance questions, routine service requests.
- LOW: general information, settings, or low-risk topics.

If the FRAUD CONTEXT indicates low risk, lean toward a lower priority even when the message alone might suggest otherwise.

Respond with this JSON:
{{
  "priority": "HIGH|MEDIUM|LOW",
  "response": "short helpful message to the user",
  "confidence": 0.9
}}
"#
    )
}

/// Returns the first balanced `{...}` span in `text`. Braces inside JSON
/// string literals do not count toward nesting.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_reply(text: &str) -> Result<Classification, ReplyError> {
    let span = extract_json_object(text).ok_or(ReplyError::NoJsonObject)?;
    let raw: RawReply = serde_json::from_str(span).map_err(|_| ReplyError::Malformed)?;

    let priority = Priority::parse(&raw.priority).ok_or(ReplyError::InvalidField("priority"))?;
    let response = raw.response.trim();
    if response.is_empty() {
        return Err(ReplyError::InvalidField("response"));
    }
    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(ReplyError::InvalidField("confidence"));
    }

    Ok(Classification {
        priority,
        response: response.to_string(),
        confidence: raw.confidence,
    })
}
