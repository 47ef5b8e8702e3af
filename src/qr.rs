/// Employer-issued QR payload decoding
///
/// The QR code carries a base64-encoded JSON object identifying the
/// employee. It is an identity hint, not a credential: the optional
/// `emp_pwd` field is parsed and dropped at this trust boundary.
use crate::error::{CoreError, CoreResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

/// Decoded employee identity from a QR scan
#[derive(Debug, Clone, Deserialize)]
pub struct QrPayload {
    #[serde(rename = "emp_id")]
    pub external_id: String,
    #[serde(rename = "emp_uname")]
    pub username: String,
    #[serde(rename = "emp_email")]
    pub email: String,
    #[serde(rename = "emp_mobile_no")]
    pub phone: String,
    #[serde(rename = "emp_name", default)]
    pub name: Option<String>,
    // Present in some employer exports; never trusted.
    #[serde(rename = "emp_pwd", default)]
    _password_hint: Option<String>,
}

impl QrPayload {
    /// Display name, falling back to the username when the export has none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// Decode a base64(JSON) QR payload
pub fn decode_qr_payload(encoded: &str) -> CoreResult<QrPayload> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CoreError::InvalidQrPayload(format!("not valid base64: {}", e)))?;

    let payload: QrPayload = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::InvalidQrPayload(format!("not a valid identity object: {}", e)))?;

    if payload.external_id.is_empty() || payload.email.is_empty() || payload.username.is_empty() {
        return Err(CoreError::InvalidQrPayload(
            "employee id, username and email are required".to_string(),
        ));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn decodes_well_formed_payload() {
        let payload = decode_qr_payload(&encode(
            r#"{"emp_id":"E1","emp_uname":"jdoe","emp_email":"j@x.com","emp_mobile_no":"555","emp_name":"Jane Doe"}"#,
        ))
        .unwrap();

        assert_eq!(payload.external_id, "E1");
        assert_eq!(payload.username, "jdoe");
        assert_eq!(payload.email, "j@x.com");
        assert_eq!(payload.display_name(), "Jane Doe");
    }

    #[test]
    fn password_field_is_parsed_but_ignored() {
        let payload = decode_qr_payload(&encode(
            r#"{"emp_id":"E1","emp_uname":"jdoe","emp_email":"j@x.com","emp_mobile_no":"555","emp_pwd":"hunter2"}"#,
        ))
        .unwrap();

        // no accessor exposes it
        assert_eq!(payload.display_name(), "jdoe");
    }

    #[test]
    fn rejects_bad_base64_and_bad_json() {
        assert!(matches!(
            decode_qr_payload("%%%not-base64%%%"),
            Err(CoreError::InvalidQrPayload(_))
        ));
        assert!(matches!(
            decode_qr_payload(&encode("not json at all")),
            Err(CoreError::InvalidQrPayload(_))
        ));
    }

    #[test]
    fn rejects_missing_identity_fields() {
        assert!(matches!(
            decode_qr_payload(&encode(
                r#"{"emp_id":"","emp_uname":"jdoe","emp_email":"j@x.com","emp_mobile_no":"555"}"#
            )),
            Err(CoreError::InvalidQrPayload(_))
        ));
    }
}
