use base64::{engine::general_purpose, Engine as _};

/// Encode document bytes as a data URL for HTTP-served OCR backends.
pub fn encode_document_base64(bytes: &[u8], media_type: &str) -> String {
    format!("data:{};base64,{}", media_type, general_purpose::STANDARD.encode(bytes))
}

/// Guess a media type from a file extension (CLI convenience).
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    crate::constants::SUPPORTED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mt)| *mt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_document_base64() {
        let url = encode_document_base64(b"abc", "image/png");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_media_type_for_extension() {
        assert_eq!(media_type_for_extension("PNG"), Some("image/png"));
        assert_eq!(media_type_for_extension("jpeg"), Some("image/jpeg"));
        assert_eq!(media_type_for_extension("exe"), None);
    }
}
