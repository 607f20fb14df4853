//! Validation of shared files before they reach a room.
//!
//! Decoding happens on the connection's task, so a large upload never
//! occupies the room actor.

use crate::actors::FileUpload;
use crate::errors::RoomError;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Check an inbound file and normalize it to a data URL.
///
/// Accepts either `data:<mime>;base64,<payload>` or a bare base64 payload.
pub fn validate_upload(
    file_name: String,
    file_type: String,
    file_data: &str,
    max_bytes: usize,
) -> Result<FileUpload, RoomError> {
    if file_name.trim().is_empty() {
        return Err(RoomError::UploadFailed("missing file name".to_string()));
    }

    let payload = match file_data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| RoomError::UploadFailed("malformed data URL".to_string()))?;
            if !header.ends_with(";base64") {
                return Err(RoomError::UploadFailed(
                    "only base64 data URLs are supported".to_string(),
                ));
            }
            payload
        }
        None => file_data,
    };

    // Reject on the encoded length before paying for the decode.
    let estimated = payload.len() / 4 * 3;
    if estimated > max_bytes + 2 {
        return Err(RoomError::UploadTooLarge {
            size: estimated,
            limit: max_bytes,
        });
    }

    let decoded_len = STANDARD
        .decode(payload.trim())
        .map_err(|e| RoomError::UploadFailed(format!("invalid base64: {e}")))?
        .len();
    if decoded_len > max_bytes {
        return Err(RoomError::UploadTooLarge {
            size: decoded_len,
            limit: max_bytes,
        });
    }

    let mime = if file_type.trim().is_empty() {
        DEFAULT_MIME
    } else {
        file_type.as_str()
    };
    let file_data = if file_data.starts_with("data:") {
        file_data.to_string()
    } else {
        format!("data:{mime};base64,{}", payload.trim())
    };

    Ok(FileUpload {
        file_name,
        file_type,
        file_data,
        decoded_len,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn test_data_url_is_kept_verbatim() {
        let upload = validate_upload(
            "hi.txt".to_string(),
            "text/plain".to_string(),
            "data:text/plain;base64,aGVsbG8=",
            MIB,
        )
        .unwrap();

        assert_eq!(upload.file_data, "data:text/plain;base64,aGVsbG8=");
        assert_eq!(upload.decoded_len, 5);
    }

    #[test]
    fn test_bare_base64_is_wrapped() {
        let upload =
            validate_upload("blob".to_string(), String::new(), "aGVsbG8=", MIB).unwrap();
        assert_eq!(
            upload.file_data,
            "data:application/octet-stream;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let payload = STANDARD.encode(vec![0u8; 2048]);
        let result = validate_upload("big.bin".to_string(), String::new(), &payload, 1024);
        assert!(matches!(
            result,
            Err(RoomError::UploadTooLarge { limit: 1024, .. })
        ));
    }

    #[test]
    fn test_exact_limit_accepted() {
        let payload = STANDARD.encode(vec![7u8; 1024]);
        let upload = validate_upload("edge.bin".to_string(), String::new(), &payload, 1024).unwrap();
        assert_eq!(upload.decoded_len, 1024);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            validate_upload("x".to_string(), String::new(), "not base64!!", MIB),
            Err(RoomError::UploadFailed(_))
        ));
        assert!(matches!(
            validate_upload("x".to_string(), String::new(), "data:text/plain,hello", MIB),
            Err(RoomError::UploadFailed(_))
        ));
        assert!(matches!(
            validate_upload("x".to_string(), String::new(), "data:nocomma", MIB),
            Err(RoomError::UploadFailed(_))
        ));
        assert!(matches!(
            validate_upload("  ".to_string(), String::new(), "aGk=", MIB),
            Err(RoomError::UploadFailed(_))
        ));
    }
}
