use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// A captured response: status line, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Metadata line written ahead of the body in every entry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryHeader {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub stored_at: DateTime<Utc>,
}

/// An entry as read back from a store.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub url: String,
    pub stored_at: DateTime<Utc>,
    pub response: CachedResponse,
}

impl StoredEntry {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

pub(crate) fn encode(url: &str, response: &CachedResponse) -> SyncResult<Vec<u8>> {
    let header = EntryHeader {
        url: url.to_string(),
        status: response.status,
        headers: response.headers.clone(),
        stored_at: Utc::now(),
    };
    // Compact JSON escapes newlines, so the header is exactly one line
    let mut bytes = serde_json::to_vec(&header).map_err(|e| SyncError::CorruptEntry {
        path: url.into(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&response.body);
    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<StoredEntry, String> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "missing header line".to_string())?;
    let header = decode_header(&bytes[..split])?;
    Ok(StoredEntry {
        url: header.url,
        stored_at: header.stored_at,
        response: CachedResponse {
            status: header.status,
            headers: header.headers,
            body: bytes[split + 1..].to_vec(),
        },
    })
}

pub(crate) fn decode_header(line: &[u8]) -> Result<EntryHeader, String> {
    serde_json::from_slice(line).map_err(|e| e.to_string())
}
