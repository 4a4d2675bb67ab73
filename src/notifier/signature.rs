use crate::error::{AppError, Result};
use anyhow::anyhow;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow!("Invalid HMAC key: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex HMAC-SHA256 over `timestamp + "." + body`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Value of the `X-Webhook-Signature` header.
pub fn signature_header(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    Ok(format!("{}{}", SIGNATURE_PREFIX, sign(secret, timestamp, body)?))
}

/// Constant-time check of a `sha256=<hex>` header, as a merchant would run it.
pub fn verify(secret: &str, timestamp: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    match mac_for(secret, timestamp, body) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4231_vector() {
        // Case 2: key "Jefe", data "what do ya want for nothing?" split as ts "." body.
        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(
            expected,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );

        assert_eq!(
            sign("Jefe", "what do ya want for nothing?", b"").unwrap(),
            sign_joined("Jefe", "what do ya want for nothing?.")
        );
    }

    fn sign_joined(secret: &str, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signs_timestamp_dot_body() {
        let body = br#"{"type":"pix.transaction.update"}"#;
        let signed = sign("s3cret", "1700000000", body).unwrap();
        assert_eq!(
            signed,
            sign_joined("s3cret", r#"1700000000.{"type":"pix.transaction.update"}"#)
        );
    }

    #[test]
    fn test_header_round_trip() {
        let body = b"{}";
        let header = signature_header("s3cret", "1700000000", body).unwrap();
        assert!(header.starts_with("sha256="));
        assert!(verify("s3cret", "1700000000", body, &header));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let header = signature_header("s3cret", "1700000000", b"{}").unwrap();
        assert!(!verify("s3cret", "1700000001", b"{}", &header));
        assert!(!verify("other", "1700000000", b"{}", &header));
        assert!(!verify("s3cret", "1700000000", b"{\"x\":1}", &header));
        assert!(!verify("s3cret", "1700000000", b"{}", "sha1=abcd"));
        assert!(!verify("s3cret", "1700000000", b"{}", "sha256=not-hex"));
    }
}
