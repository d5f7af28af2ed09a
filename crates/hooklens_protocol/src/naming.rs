//! Event-kind sanitization and generated-identifier derivation.

/// Make an event kind filesystem-safe.
///
/// `/` is preserved as the hierarchy separator; within each segment every
/// non-alphanumeric character becomes `_`. Segments that sanitize to nothing
/// are dropped. An entirely empty result collapses to `Unknown`.
pub fn sanitize_kind(kind: &str) -> String {
    let segments: Vec<String> = kind
        .split('/')
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return crate::defaults::UNKNOWN_KIND.to_string();
    }
    segments.join("/")
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    // A segment of only underscores carries no information.
    if cleaned.chars().all(|ch| ch == '_') {
        String::new()
    } else {
        cleaned
    }
}

/// Derive the generated interface identifier for a kind.
///
/// Split on `/`, pascal-case each segment, concatenate:
/// `whatsapp_business_account/messages_image` becomes
/// `WhatsappBusinessAccountMessagesImage`.
pub fn interface_ident(kind: &str) -> String {
    let ident: String = sanitize_kind(kind).split('/').map(pascal_case).collect();
    if ident.is_empty() || ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("Event{ident}")
    } else {
        ident
    }
}

/// Upper-case the first letter of every `_`/`-`/space-separated word.
///
/// Existing interior capitals are kept, so `messageReceived` stays
/// `MessageReceived` rather than flattening to `Messagereceived`.
pub fn pascal_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for word in input.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// True when every character is fit for an identifier segment.
pub fn is_identifier_safe(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
