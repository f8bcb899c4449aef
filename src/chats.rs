//! Best-effort local chat logs, one JSON file per user.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;

use crate::models::ChatEntry;
use crate::server::{AnalyzeRequest, AnalyzeResponse};

/// File for `user_id` inside `dir`. Bytes outside `[A-Za-z0-9_-]` are
/// percent-encoded, so distinct ids never share a file and none can leave `dir`.
pub fn chat_path(dir: &Path, user_id: &str) -> PathBuf {
    let mut safe = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            safe.push(char::from(byte));
        } else {
            let _ = write!(safe, "%{byte:02X}");
        }
    }
    dir.join(format!("{safe}.json"))
}

pub fn load_history(dir: &Path, user_id: &str) -> anyhow::Result<Vec<ChatEntry>> {
    let path = chat_path(dir, user_id);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_history(dir: &Path, user_id: &str, history: &[ChatEntry]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = chat_path(dir, user_id);
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn append_entry(dir: &Path, user_id: &str, entry: ChatEntry) -> anyhow::Result<usize> {
    let mut history = load_history(dir, user_id)?;
    history.push(entry);
    save_history(dir, user_id, &history)?;
    Ok(history.len())
}

/// Sends one message through a running gateway and records the exchange.
pub async fn send_message(
    api_url: &str,
    chats_dir: &Path,
    user_id: &str,
    message: &str,
) -> anyhow::Result<ChatEntry> {
    anyhow::ensure!(!message.trim().is_empty(), "message must not be empty");

    let url = format!("{}/analyze", api_url.trim_end_matches('/'));
    let reply: AnalyzeResponse = reqwest::Client::new()
        .post(&url)
        .json(&AnalyzeRequest {
            user_id: user_id.to_string(),
            message: message.to_string(),
        })
        .send()
        .await
        .with_context(|| format!("error contacting gateway at {url}"))?
        .error_for_status()?
        .json()
        .await
        .context("gateway returned an unexpected body")?;

    let entry = ChatEntry {
        user: message.to_string(),
        priority: reply.priority,
        response: reply.response,
        confidence: reply.confidence,
        ts: Some(Utc::now()),
    };
    append_entry(chats_dir, user_id, entry.clone())?;
    Ok(entry)
}
