//! Cascade step 1: Z-API-shaped provider callbacks.
//!
//! Matched either by vendor request headers or by the `type` + `instanceId`
//! field pair with a known callback type. Kinds are
//! `z_api/<type minus "callback">[/<sub-type>]`.

use crate::{field_ci, get_ci, header_ci, ClassifierConfig, Headers};
use serde_json::Value;

/// Callback types the vendor is known to emit, lower-cased.
pub const KNOWN_CALLBACK_TYPES: &[&str] = &[
    "receivedcallback",
    "sentcallback",
    "deliverycallback",
    "readcallback",
    "messagestatuscallback",
    "presencechatcallback",
    "chatpresencecallback",
    "connectedcallback",
    "disconnectedcallback",
];

/// Message-content fields probed for the sub-type, in precedence order.
const CONTENT_FIELDS: &[&str] = &[
    "text", "image", "sticker", "audio", "video", "document", "location", "contact", "poll",
    "reaction", "order", "payment", "buttons", "list",
];

pub fn classify(payload: &Value, headers: &Headers, config: &ClassifierConfig) -> Option<String> {
    let vendor_headers = has_vendor_headers(headers, config);

    let type_field = field_ci(payload, &["type"]);
    let instance_id = field_ci(payload, &["instanceId"]);
    let vendor_payload = matches!((type_field, instance_id), (Some(ty), Some(_))
        if KNOWN_CALLBACK_TYPES.contains(&ty.to_lowercase().as_str()));

    if !vendor_headers && !vendor_payload {
        return None;
    }

    let Some(ty) = type_field else {
        // Vendor headers without a recognizable type field.
        return Some("z_api/webhook".to_string());
    };

    let base = ty
        .to_lowercase()
        .trim_end_matches("callback")
        .to_string();
    if base.is_empty() {
        return Some("z_api/webhook".to_string());
    }

    if let Some(status) = status_sub_type(payload, &base) {
        return Some(format!("z_api/{base}/{status}"));
    }

    match content_sub_type(payload) {
        Some(sub) => Some(format!("z_api/{base}/{sub}")),
        None => Some(format!("z_api/{base}")),
    }
}

fn has_vendor_headers(headers: &Headers, config: &ClassifierConfig) -> bool {
    if let Some(server) = header_ci(headers, "server") {
        if server.eq_ignore_ascii_case(&config.vendor_server_token) {
            return true;
        }
    }
    if let Some(origin) = header_ci(headers, "origin") {
        if origin
            .to_lowercase()
            .contains(&config.vendor_origin_host.to_lowercase())
        {
            return true;
        }
    }
    false
}

/// For status callbacks the sub-type is the status itself, with a `group_`
/// prefix when the payload is flagged as group-originated.
fn status_sub_type(payload: &Value, base: &str) -> Option<String> {
    if !base.contains("status") {
        return None;
    }
    let status = field_ci(payload, &["status"])?.to_lowercase();
    if status.is_empty() {
        return None;
    }
    let is_group = get_ci(payload, "isGroup")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Some(if is_group {
        format!("group_{status}")
    } else {
        status
    })
}

fn content_sub_type(payload: &Value) -> Option<&'static str> {
    CONTENT_FIELDS
        .iter()
        .find(|field| get_ci(payload, field).is_some())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_headers() -> Headers {
        Headers::new()
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn received_image_callback() {
        let payload = json!({
            "type": "ReceivedCallback",
            "instanceId": "instance-1",
            "image": {"imageUrl": "https://example/img"},
        });
        assert_eq!(
            classify(&payload, &no_headers(), &config()),
            Some("z_api/received/image".to_string())
        );
    }

    #[test]
    fn received_without_content_has_no_third_segment() {
        let payload = json!({"type": "ReceivedCallback", "instanceId": "i"});
        assert_eq!(
            classify(&payload, &no_headers(), &config()),
            Some("z_api/received".to_string())
        );
    }

    #[test]
    fn content_precedence_is_fixed() {
        // text beats image when both are present.
        let payload = json!({
            "type": "ReceivedCallback",
            "instanceId": "i",
            "image": {},
            "text": {"message": "hi"},
        });
        assert_eq!(
            classify(&payload, &no_headers(), &config()),
            Some("z_api/received/text".to_string())
        );
    }

    #[test]
    fn status_callback_uses_status_field() {
        let payload = json!({
            "type": "MessageStatusCallback",
            "instanceId": "i",
            "status": "DELIVERED",
        });
        assert_eq!(
            classify(&payload, &no_headers(), &config()),
            Some("z_api/messagestatus/delivered".to_string())
        );
    }

    #[test]
    fn group_status_gets_prefixed() {
        let payload = json!({
            "type": "MessageStatusCallback",
            "instanceId": "i",
            "status": "READ",
            "isGroup": true,
        });
        assert_eq!(
            classify(&payload, &no_headers(), &config()),
            Some("z_api/messagestatus/group_read".to_string())
        );
    }

    #[test]
    fn unknown_type_without_vendor_headers_falls_through() {
        let payload = json!({"type": "SomethingElse", "instanceId": "i"});
        assert_eq!(classify(&payload, &no_headers(), &config()), None);
    }

    #[test]
    fn vendor_server_header_forces_the_rule() {
        let mut headers = Headers::new();
        headers.insert("server".to_string(), "Z-API".to_string());
        let payload = json!({"unrelated": true});
        assert_eq!(
            classify(&payload, &headers, &config()),
            Some("z_api/webhook".to_string())
        );
    }

    #[test]
    fn vendor_origin_header_matches_by_substring() {
        let mut headers = Headers::new();
        headers.insert(
            "Origin".to_string(),
            "https://api.z-api.io/instances".to_string(),
        );
        let payload = json!({"type": "DeliveryCallback", "instanceId": "i"});
        assert_eq!(
            classify(&payload, &headers, &config()),
            Some("z_api/delivery".to_string())
        );
    }

    #[test]
    fn instance_id_is_required_for_payload_match() {
        let payload = json!({"type": "ReceivedCallback"});
        assert_eq!(classify(&payload, &no_headers(), &config()), None);
    }
}
