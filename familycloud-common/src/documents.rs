use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Uploader label used when the uploading user is unknown.
pub const DEFAULT_UPLOADER: &str = "family";

// ── Photo Record ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub content: PhotoContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default = "default_uploader")]
    pub uploaded_by: String,
}

/// Where the photo bytes live. Remote records point at a vendor URL, local
/// records embed the whole image as a `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PhotoContent {
    Remote { url: String },
    Embedded {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
}

fn default_uploader() -> String {
    DEFAULT_UPLOADER.to_string()
}

impl PhotoRecord {
    /// Synthesize an id for a locally stored photo: unix millis plus a
    /// random base36 tie-breaker.
    pub fn new_local_id() -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", Utc::now().timestamp_millis(), suffix)
    }

    /// The URL or data URL holding the full image.
    pub fn content_ref(&self) -> &str {
        match &self.content {
            PhotoContent::Remote { url } => url,
            PhotoContent::Embedded { data_url } => data_url,
        }
    }

    /// Thumbnail reference, falling back to the full content.
    pub fn thumbnail_ref(&self) -> &str {
        self.thumbnail.as_deref().unwrap_or_else(|| self.content_ref())
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.content, PhotoContent::Embedded { .. })
    }
}

// ── Upload Input ──

/// One file picked by the user for upload.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ── Backend Kind ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Remote => f.write_str("remote"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

// ── Storage Usage ──

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used: u64,
    pub total: u64,
}

impl StorageUsage {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }

    /// `"<used> / <total> (<percent>%)"`, e.g. `"1.5 MB / 20 GB (7.50%)"`.
    pub fn summary(&self) -> String {
        format!(
            "{} / {} ({:.2}%)",
            format_bytes(self.used),
            format_bytes(self.total),
            self.percent()
        )
    }
}

/// Human-readable byte count, base 1024, at most two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
