//! Cascade step 2: Meta Cloud API business-account envelopes.

use crate::get_ci;
use serde_json::Value;

/// Match the `whatsapp_business_account` envelope and derive
/// `whatsapp_business_account/<field>[_<message-sub-type>]`.
pub fn classify(payload: &Value) -> Option<String> {
    let object = get_ci(payload, "object")?.as_str()?;
    if !object.eq_ignore_ascii_case("whatsapp_business_account") {
        return None;
    }

    let change = get_ci(payload, "entry")?
        .as_array()?
        .first()
        .and_then(|entry| get_ci(entry, "changes"))
        .and_then(Value::as_array)
        .and_then(|changes| changes.first())?;

    let value = get_ci(change, "value")?;
    let product = get_ci(value, "messaging_product")?.as_str()?;
    if !product.eq_ignore_ascii_case("whatsapp") {
        return None;
    }

    let field = get_ci(change, "field")?.as_str()?;
    if field.is_empty() {
        return None;
    }
    let field = field.to_lowercase();

    if field == "messages" {
        let sub_type = get_ci(value, "messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(|message| get_ci(message, "type"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "text".to_string());
        Some(format!("whatsapp_business_account/{field}_{sub_type}"))
    } else {
        Some(format!("whatsapp_business_account/{field}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(field: &str, value: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "123", "changes": [{"field": field, "value": value}]}],
        })
    }

    #[test]
    fn image_message_gets_field_and_sub_type() {
        let payload = envelope(
            "messages",
            json!({
                "messaging_product": "whatsapp",
                "messages": [{"type": "image"}],
            }),
        );
        assert_eq!(
            classify(&payload),
            Some("whatsapp_business_account/messages_image".to_string())
        );
    }

    #[test]
    fn message_sub_type_defaults_to_text() {
        let payload = envelope(
            "messages",
            json!({"messaging_product": "whatsapp", "messages": [{}]}),
        );
        assert_eq!(
            classify(&payload),
            Some("whatsapp_business_account/messages_text".to_string())
        );
    }

    #[test]
    fn non_message_fields_have_no_sub_type() {
        let payload = envelope(
            "message_template_status_update",
            json!({"messaging_product": "whatsapp"}),
        );
        assert_eq!(
            classify(&payload),
            Some("whatsapp_business_account/message_template_status_update".to_string())
        );
    }

    #[test]
    fn wrong_messaging_product_falls_through() {
        let payload = envelope("messages", json!({"messaging_product": "instagram"}));
        assert_eq!(classify(&payload), None);
    }

    #[test]
    fn missing_entry_falls_through() {
        let payload = json!({"object": "whatsapp_business_account", "entry": []});
        assert_eq!(classify(&payload), None);
    }

    #[test]
    fn other_objects_fall_through() {
        let payload = json!({"object": "page", "entry": [{}]});
        assert_eq!(classify(&payload), None);
    }
}
