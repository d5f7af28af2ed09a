//! Cascade step 5: keyword scan over the joined nested-key string.

use crate::joined_keys;
use serde_json::Value;

/// `{kind, keywords}` table; every keyword must occur among the payload's
/// nested keys. First match wins.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    ("GroupInfo", &["groupinfo"]),
    ("HistorySync", &["historysync"]),
    ("Newsletter", &["newsletter"]),
    ("Qr", &["qrcode"]),
    ("Receipt", &["receipt"]),
    ("Presence", &["presence"]),
    ("Reaction", &["reaction"]),
    ("Poll", &["pollupdate"]),
    ("Call", &["callid"]),
    ("Message", &["message", "conversation"]),
    ("Message", &["messageid", "chatid"]),
    ("Status", &["status", "momment"]),
    ("Status", &["statuses"]),
    ("Connection", &["connectedat"]),
    ("Connection", &["disconnected"]),
    ("Template", &["template"]),
    ("Contact", &["vcard"]),
    ("Location", &["latitude", "longitude"]),
];

pub fn classify(payload: &Value) -> Option<String> {
    let keys = joined_keys(payload);
    if keys.is_empty() {
        return None;
    }
    KEYWORD_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().all(|kw| keys.contains(kw)))
        .map(|(kind, _)| kind.to_string())
}
