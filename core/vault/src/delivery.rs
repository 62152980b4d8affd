//! Decrypted payloads shaped for delivery to the client.

use serde::Serialize;

use crate::config::TRUNCATION_MARKER;
use strongroom_common::SensitiveBytes;

/// Whether a MIME type is rendered as text in previews.
pub fn is_textual(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-yaml"
                | "application/yaml"
                | "application/toml"
                | "application/x-sh"
                | "application/sql"
        )
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

/// Cut `text` to at most `max_chars` characters, appending the marker when
/// anything was dropped.
pub fn truncate_preview(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
        None => (text.to_string(), false),
    }
}

fn disposition(kind: &str, file_name: &str) -> String {
    let escaped: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect();
    format!("{}; filename=\"{}\"", kind, escaped)
}

/// A decrypted file ready to be sent as an attachment.
#[derive(Debug)]
pub struct FileDownload {
    pub content: SensitiveBytes,
    pub file_name: String,
    pub mime_type: String,
}

impl FileDownload {
    /// `Content-Disposition` header value.
    pub fn content_disposition(&self) -> String {
        disposition("attachment", &self.file_name)
    }

    /// `Content-Length` header value.
    pub fn content_length(&self) -> usize {
        self.content.len()
    }
}

/// A decrypted file shaped for in-browser preview.
#[derive(Debug)]
pub enum Preview {
    /// Textual content, possibly truncated.
    Text(TextPreview),
    /// Binary content served inline.
    Inline(FileDownload),
}

/// JSON body of a textual preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPreview {
    pub content: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub truncated: bool,
}

impl Preview {
    /// Build a preview from plaintext.
    ///
    /// Text types that are not valid UTF-8 are decoded lossily.
    pub fn build(
        content: SensitiveBytes,
        original_name: String,
        mime_type: String,
        file_size: u64,
        max_chars: usize,
    ) -> Self {
        if is_textual(&mime_type) {
            let text = String::from_utf8_lossy(content.as_bytes());
            let (content, truncated) = truncate_preview(&text, max_chars);
            Preview::Text(TextPreview {
                content,
                original_name,
                mime_type,
                file_size,
                truncated,
            })
        } else {
            Preview::Inline(FileDownload {
                content,
                file_name: original_name,
                mime_type,
            })
        }
    }

    /// `Content-Disposition` for inline previews; `None` for text.
    pub fn content_disposition(&self) -> Option<String> {
        match self {
            Preview::Text(_) => None,
            Preview::Inline(file) => Some(disposition("inline", &file.file_name)),
        }
    }
}
