//! Cascade step 6: generic provider fallback.
//!
//! Derives a provider label from request headers (user-agent table, custom
//! `X-*` headers, origin host) and a coarse type from structural keywords,
//! emitting `<provider>/<type>` or `<provider>/webhook`. Without any
//! provider clue this step declines and the cascade bottoms out at
//! `Unknown`.

use crate::{header_ci, joined_keys, Headers};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// User-agent patterns mapped to provider labels, checked in order.
const USER_AGENT_TABLE: &[(&str, &str)] = &[
    (r"(?i)twilio", "twilio"),
    (r"(?i)gupshup", "gupshup"),
    (r"(?i)360dialog", "dialog360"),
    (r"(?i)\bwati\b", "wati"),
    (r"(?i)evolution", "evolution"),
    (r"(?i)baileys", "baileys"),
    (r"(?i)whatsmeow", "whatsmeow"),
    (r"(?i)wppconnect", "wppconnect"),
];

/// Custom headers whose value names the sending service.
const PROVIDER_HEADERS: &[&str] = &["x-provider", "x-webhook-source", "x-webhook-provider"];

/// Structural keywords mapped to a coarse type, checked in order.
const TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("message", "message"),
    ("status", "status"),
    ("presence", "presence"),
    ("receipt", "receipt"),
    ("connection", "connection"),
    ("qrcode", "qr"),
    ("call", "call"),
    ("group", "group"),
];

fn user_agent_regexes() -> &'static Vec<(Regex, &'static str)> {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        USER_AGENT_TABLE
            .iter()
            .map(|(pattern, provider)| (Regex::new(pattern).expect("static regex"), *provider))
            .collect()
    })
}

pub fn classify(payload: &Value, headers: &Headers) -> Option<String> {
    let provider = derive_provider(headers)?;
    match derive_type(payload) {
        Some(ty) => Some(format!("{provider}/{ty}")),
        None => Some(format!("{provider}/webhook")),
    }
}

fn derive_provider(headers: &Headers) -> Option<String> {
    if let Some(user_agent) = header_ci(headers, "user-agent") {
        for (regex, provider) in user_agent_regexes() {
            if regex.is_match(user_agent) {
                return Some(provider.to_string());
            }
        }
    }

    for name in PROVIDER_HEADERS {
        if let Some(value) = header_ci(headers, name) {
            let label = value.trim().to_lowercase();
            if !label.is_empty() {
                return Some(label);
            }
        }
    }

    if let Some(origin) = header_ci(headers, "origin") {
        if let Some(host_label) = origin_first_label(origin) {
            return Some(host_label);
        }
    }

    None
}

/// Provider label from the origin host: the label left of the TLD
/// (`https://api.acme.io` -> `acme`), or the sole/first label for short
/// hosts (`localhost`, `acme.io` -> `acme`).
fn origin_first_label(origin: &str) -> Option<String> {
    let host = origin
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split([':', '/'])
        .next()?
        .to_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => None,
        1 => Some(labels[0].to_string()),
        2 => Some(labels[0].to_string()),
        // api.acme.io -> acme
        n => Some(labels[n - 2].to_string()),
    }
}

fn derive_type(payload: &Value) -> Option<&'static str> {
    let keys = joined_keys(payload);
    TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| keys.contains(keyword))
        .map(|(_, ty)| *ty)
}
