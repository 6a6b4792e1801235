//! Turning an uploaded meal photo into something the analyzer can consume.
//!
//! Photos arrive either as raw bytes (camera / file picker upload) or as a
//! `data:` URI already encoded by the client. Both are bounded to
//! [`MAX_IMAGE_BYTES`] and rejected before any outbound call is made.

use base64ct::{Base64, Encoding};
use bytes::Bytes;
use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("imagem não fornecida")]
    Empty,
    #[error("a imagem tem {size} bytes, o limite é {MAX_IMAGE_BYTES} bytes (5MB)")]
    TooLarge { size: usize },
    #[error("tipo de imagem não suportado: {0}")]
    UnsupportedType(String),
    #[error("a imagem não é um data URI base64 válido")]
    InvalidEncoding,
}

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub content_type: String,
    pub body: Bytes,
}

/// An image ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Data URI or remote http(s) URL.
    pub url: String,
    /// Decoded bytes, present only for inline images.
    pub inline: Option<InlineImage>,
}

impl CapturedImage {
    pub fn size(&self) -> Option<usize> {
        self.inline.as_ref().map(|i| i.body.len())
    }
}

/// Capture from raw upload bytes. Without a usable content type the format is
/// sniffed from the leading magic bytes.
pub fn from_bytes(body: Bytes, content_type: Option<&str>) -> Result<CapturedImage, CaptureError> {
    if body.is_empty() {
        return Err(CaptureError::Empty);
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(CaptureError::TooLarge { size: body.len() });
    }

    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| ct.starts_with("image/"));
    let content_type = match declared {
        Some(ct) => ct,
        None => sniff_mime(&body)
            .map(str::to_string)
            .ok_or_else(|| {
                CaptureError::UnsupportedType(content_type.unwrap_or("unknown").to_string())
            })?,
    };

    let url = format!("data:{};base64,{}", content_type, Base64::encode_string(&body));
    Ok(CapturedImage {
        url,
        inline: Some(InlineImage { content_type, body }),
    })
}

/// Capture from the string a client posted: a `data:image/...;base64,` URI or
/// a remote http(s) URL, which is passed through untouched.
pub fn from_reference(image: &str) -> Result<CapturedImage, CaptureError> {
    let image = image.trim();
    if image.is_empty() {
        return Err(CaptureError::Empty);
    }
    if image.starts_with("https://") || image.starts_with("http://") {
        return Ok(CapturedImage {
            url: image.to_string(),
            inline: None,
        });
    }

    let rest = image
        .strip_prefix("data:")
        .ok_or(CaptureError::InvalidEncoding)?;
    let (header, payload) = rest.split_once(',').ok_or(CaptureError::InvalidEncoding)?;
    let content_type = header
        .strip_suffix(";base64")
        .ok_or(CaptureError::InvalidEncoding)?
        .to_ascii_lowercase();
    if !content_type.starts_with("image/") {
        return Err(CaptureError::UnsupportedType(content_type));
    }
    if payload.is_empty() {
        return Err(CaptureError::Empty);
    }

    // Reject on the encoded length so oversized payloads are never decoded.
    let estimated = decoded_len(payload);
    if estimated > MAX_IMAGE_BYTES {
        return Err(CaptureError::TooLarge { size: estimated });
    }

    let body = Base64::decode_vec(payload).map_err(|_| CaptureError::InvalidEncoding)?;
    Ok(CapturedImage {
        url: image.to_string(),
        inline: Some(InlineImage {
            content_type,
            body: Bytes::from(body),
        }),
    })
}

fn decoded_len(payload: &str) -> usize {
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    (payload.len() / 4 * 3 + (payload.len() % 4) * 3 / 4).saturating_sub(padding)
}

fn sniff_mime(body: &[u8]) -> Option<&'static str> {
    match body {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', ..] => Some("image/heic"),
        _ => None,
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
