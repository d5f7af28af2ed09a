//! Cascade step 4: structural shape fingerprints.
//!
//! A precedence-ordered, closed catalog of rules matching socket-library
//! event shapes (whatsmeow-style). Each rule is a conjunction: every listed
//! top-level field must be present (case-insensitive) and every token must
//! occur in the lower-cased serialized body. The earliest matching rule
//! wins; catalog order is part of the system contract and reordering it is
//! a breaking change.

use serde_json::Value;
use std::collections::BTreeSet;

pub struct ShapeRule {
    pub kind: &'static str,
    /// Top-level field names, lower-cased; all must be present.
    pub required_keys: &'static [&'static str],
    /// Substrings of the lower-cased serialized body; all must occur.
    pub tokens: &'static [&'static str],
}

/// The shipped catalog, most specific first.
pub const SHAPE_CATALOG: &[ShapeRule] = &[
    ShapeRule {
        kind: "QR",
        required_keys: &["codes"],
        tokens: &[],
    },
    ShapeRule {
        kind: "PairSuccess",
        required_keys: &["id", "businessname", "platform"],
        tokens: &[],
    },
    ShapeRule {
        kind: "LoggedOut",
        required_keys: &["onconnect", "reason"],
        tokens: &[],
    },
    ShapeRule {
        kind: "KeepAliveTimeout",
        required_keys: &["errorcount", "lastsuccess"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Connected",
        required_keys: &["connected"],
        tokens: &[],
    },
    ShapeRule {
        kind: "UndecryptableMessage",
        required_keys: &["info", "isunavailable"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Message",
        required_keys: &["info", "message"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Receipt",
        required_keys: &["messageids", "sourcestring"],
        tokens: &[],
    },
    ShapeRule {
        kind: "ChatPresence",
        required_keys: &["chat", "state"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Presence",
        required_keys: &["from", "unavailable"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Picture",
        required_keys: &["jid", "author"],
        tokens: &["picture"],
    },
    ShapeRule {
        kind: "MediaRetry",
        required_keys: &["ciphertext", "iv"],
        tokens: &[],
    },
    ShapeRule {
        kind: "HistorySync",
        required_keys: &["data"],
        tokens: &["historysync"],
    },
    ShapeRule {
        kind: "Blocklist",
        required_keys: &["action", "dhash"],
        tokens: &[],
    },
    ShapeRule {
        kind: "NewsletterJoin",
        required_keys: &["id", "thread_metadata"],
        tokens: &["newsletter"],
    },
    ShapeRule {
        kind: "NewsletterLeave",
        required_keys: &["id", "role"],
        tokens: &["newsletter"],
    },
    ShapeRule {
        kind: "NewsletterMuteChange",
        required_keys: &["id", "mute"],
        tokens: &[],
    },
    ShapeRule {
        kind: "NewsletterLiveUpdate",
        required_keys: &["jid", "time", "messages"],
        tokens: &[],
    },
    ShapeRule {
        kind: "NewsletterMessageMeta",
        required_keys: &["id", "serverid"],
        tokens: &["newsletter"],
    },
    ShapeRule {
        kind: "CallOffer",
        required_keys: &["callid"],
        tokens: &["offer"],
    },
    ShapeRule {
        kind: "CallAccept",
        required_keys: &["callid"],
        tokens: &["accept"],
    },
    ShapeRule {
        kind: "CallTerminate",
        required_keys: &["callid"],
        tokens: &["terminate"],
    },
    ShapeRule {
        kind: "CallRelayLatency",
        required_keys: &["callid"],
        tokens: &["latency"],
    },
    ShapeRule {
        kind: "CallGeneric",
        required_keys: &["callid"],
        tokens: &[],
    },
    ShapeRule {
        kind: "IdentityChange",
        required_keys: &["jid", "implicit"],
        tokens: &[],
    },
    ShapeRule {
        kind: "PrivacySettings",
        required_keys: &["newsettings"],
        tokens: &[],
    },
    ShapeRule {
        kind: "OfflineSyncPreview",
        required_keys: &["total"],
        tokens: &["offline"],
    },
    ShapeRule {
        kind: "OfflineSyncCompleted",
        required_keys: &["count"],
        tokens: &["offline"],
    },
    ShapeRule {
        kind: "JoinedGroup",
        required_keys: &["jid", "participants"],
        tokens: &["group"],
    },
    ShapeRule {
        kind: "GroupInfo",
        required_keys: &["jid", "sender"],
        tokens: &["group"],
    },
    ShapeRule {
        kind: "UserAbout",
        required_keys: &["jid", "status"],
        tokens: &["about"],
    },
    ShapeRule {
        kind: "PushName",
        required_keys: &["jid", "newpushname"],
        tokens: &[],
    },
    ShapeRule {
        kind: "BusinessName",
        required_keys: &["jid", "newbusinessname"],
        tokens: &[],
    },
    ShapeRule {
        kind: "Archive",
        required_keys: &["jid", "action"],
        tokens: &["archive"],
    },
    ShapeRule {
        kind: "Pin",
        required_keys: &["jid", "action"],
        tokens: &["pin"],
    },
    ShapeRule {
        kind: "Mute",
        required_keys: &["jid", "action"],
        tokens: &["mute"],
    },
    ShapeRule {
        kind: "Star",
        required_keys: &["messageid", "action"],
        tokens: &["star"],
    },
    ShapeRule {
        kind: "DeleteForMe",
        required_keys: &["messageid", "action"],
        tokens: &["delete"],
    },
    ShapeRule {
        kind: "MarkChatAsRead",
        required_keys: &["jid", "action"],
        tokens: &["read"],
    },
    ShapeRule {
        kind: "ClearChat",
        required_keys: &["jid", "action"],
        tokens: &["clear"],
    },
    ShapeRule {
        kind: "DeleteChat",
        required_keys: &["jid", "action"],
        tokens: &["delete"],
    },
    ShapeRule {
        kind: "StreamReplaced",
        required_keys: &["permanent"],
        tokens: &["stream"],
    },
    ShapeRule {
        kind: "TemporaryBan",
        required_keys: &["code", "expire"],
        tokens: &[],
    },
    ShapeRule {
        kind: "ConnectFailure",
        required_keys: &["reason"],
        tokens: &["connect"],
    },
    ShapeRule {
        kind: "StreamError",
        required_keys: &["code"],
        tokens: &["stream"],
    },
    ShapeRule {
        kind: "AppState",
        required_keys: &["index", "syncactionvalue"],
        tokens: &[],
    },
];

pub fn classify(payload: &Value) -> Option<String> {
    let map = payload.as_object()?;
    let keys: BTreeSet<String> = map.keys().map(|k| k.to_lowercase()).collect();
    // Serialized once; every rule's tokens scan this view.
    let body = serde_json::to_string(payload)
        .unwrap_or_default()
        .to_lowercase();

    SHAPE_CATALOG
        .iter()
        .find(|rule| {
            rule.required_keys.iter().all(|k| keys.contains(*k))
                && rule.tokens.iter().all(|t| body.contains(t))
        })
        .map(|rule| rule.kind.to_string())
}
