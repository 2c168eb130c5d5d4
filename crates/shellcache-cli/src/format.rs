//! Output formatting helpers.

use shellcache_core::{CachedResponse, GenerationStatus};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Human-readable byte count, e.g. "1.5 KB"
pub fn format_bytes(len: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = len as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", len, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// One-line summary of a response: status, content type and size
pub fn describe_response(response: &CachedResponse) -> String {
    let content_type = response.header("content-type").unwrap_or("-");
    format!(
        "{} {} {}",
        response.status,
        content_type,
        format_bytes(response.body.len())
    )
}

/// Maximum number of missing keys listed in status output
const MAX_MISSING_SHOWN: usize = 5;

pub fn describe_generation(label: &str, status: &GenerationStatus) -> String {
    let mut out = format!(
        "{} generation {} ({}): {}/{} resources cached",
        label, status.id, status.phase, status.content_entries, status.manifest_entries
    );
    if let Some(age) = &status.snapshot_age {
        out.push_str(&format!(", snapshot {}", age));
    }
    if !status.missing.is_empty() {
        let shown: Vec<String> = status
            .missing
            .iter()
            .take(MAX_MISSING_SHOWN)
            .map(|k| truncate_string(k, 40))
            .collect();
        out.push_str(&format!("\n  missing: {}", shown.join(", ")));
        if status.missing.len() > MAX_MISSING_SHOWN {
            out.push_str(&format!(" (+{} more)", status.missing.len() - MAX_MISSING_SHOWN));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellcache_core::Phase;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_describe_response() {
        let response = CachedResponse::new(200, "abc").with_header("Content-Type", "text/html");
        assert_eq!(describe_response(&response), "200 text/html 3 B");
        assert_eq!(describe_response(&CachedResponse::new(404, "")), "404 - 0 B");
    }

    #[test]
    fn test_describe_generation_lists_missing() {
        let status = GenerationStatus {
            id: 2,
            phase: Phase::Ready,
            manifest_entries: 9,
            content_entries: 2,
            snapshot_age: Some("5m ago".into()),
            missing: (0..7).map(|i| format!("asset{}.png", i)).collect(),
        };

        let text = describe_generation("Active", &status);

        assert!(text.starts_with("Active generation 2 (ready): 2/9 resources cached, snapshot 5m ago"));
        assert!(text.contains("asset0.png, asset1.png"));
        assert!(text.ends_with("(+2 more)"));
    }
}
