use axum::extract::Multipart;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use marquee_booking::BookingError;
use marquee_core::ProofArtifact;
use std::collections::HashMap;

use crate::error::AppError;

/// Room for multipart boundaries, text fields and the JSON envelope.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

/// Request body cap for upload routes, sized so a proof of exactly
/// `max_proof_bytes` still gets through when base64 encoded. The services
/// enforce the per-file limit itself.
pub fn upload_body_limit(max_proof_bytes: usize) -> usize {
    max_proof_bytes
        .saturating_add(2)
        .saturating_div(3)
        .saturating_mul(4)
        .saturating_add(UPLOAD_OVERHEAD)
}

pub const PROOF_FIELD: &str = "payment_proof";

/// A multipart upload: text fields plus the `payment_proof` file.
#[derive(Debug, Default)]
pub struct ProofForm {
    pub fields: HashMap<String, String>,
    pub artifact: Option<ProofArtifact>,
}

impl ProofForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = ProofForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == PROOF_FIELD {
                let filename = field.file_name().unwrap_or("payment-proof").to_string();
                let mimetype = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
                form.artifact = Some(ProofArtifact::new(bytes.to_vec(), filename, mimetype));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
                form.fields.insert(name, value.trim().to_string());
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn take_artifact(&mut self) -> Result<ProofArtifact, BookingError> {
        self.artifact
            .take()
            .filter(|a| !a.bytes.is_empty())
            .ok_or_else(|| BookingError::missing_fields(vec![PROOF_FIELD]))
    }
}

/// Decodes a bare base64 string or a `data:<mime>;base64,` URL. The mimetype
/// embedded in a data URL wins over `fallback_mime`.
pub fn decode_base64_proof(
    payload: &str,
    filename: Option<String>,
    fallback_mime: Option<String>,
) -> Result<ProofArtifact, BookingError> {
    let payload = payload.trim();
    let (embedded_mime, data) = match payload.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((mime, data)) => (Some(mime.to_string()), data),
        None => (None, payload),
    };

    let bytes = STANDARD
        .decode(data)
        .map_err(|_| BookingError::invalid("payment_base64", "payment_base64 is not valid base64"))?;
    if bytes.is_empty() {
        return Err(BookingError::missing_fields(vec!["payment_base64"]));
    }

    let mimetype = embedded_mime
        .or(fallback_mime)
        .unwrap_or_else(|| "image/jpeg".to_string());
    let filename = filename.unwrap_or_else(|| "payment-proof".to_string());
    Ok(ProofArtifact::new(bytes, filename, mimetype))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_follows_proof_limit() {
        let five_mib = 5 * 1024 * 1024;
        let encoded = STANDARD.encode(vec![0u8; five_mib]).len();
        assert!(upload_body_limit(five_mib) >= encoded + 1024);

        let fifty_mib = 50 * 1024 * 1024;
        assert!(upload_body_limit(fifty_mib) > fifty_mib);
        assert_eq!(upload_body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode([1u8, 2, 3]));
        let artifact = decode_base64_proof(&encoded, Some("t.png".into()), Some("image/jpeg".into())).unwrap();
        assert_eq!(artifact.bytes, vec![1, 2, 3]);
        assert_eq!(artifact.mimetype, "image/png");
        assert_eq!(artifact.filename, "t.png");
    }

    #[test]
    fn test_decode_bare_base64() {
        let artifact = decode_base64_proof(&STANDARD.encode([9u8]), None, None).unwrap();
        assert_eq!(artifact.mimetype, "image/jpeg");
        assert_eq!(artifact.filename, "payment-proof");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_base64_proof("not base64!!", None, None).unwrap_err();
        assert!(matches!(err, BookingError::Validation { .. }));
        assert!(decode_base64_proof("", None, None).is_err());
    }
}
