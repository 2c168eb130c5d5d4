//! Origin handling and resource key derivation.
//!
//! A resource key is the part of a same-origin URL after the leading slash.
//! The empty key and fragment-only keys collapse to the entry point `"/"`.

use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::manifest::ENTRY_POINT;

/// Marker for cache-busting version parameters appended by the application
const VERSION_QUERY: &str = "?v=";

/// The origin the synchronizer serves, e.g. `https://app.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    base: Url,
}

impl Origin {
    pub fn parse(input: &str) -> SyncResult<Self> {
        let invalid = |reason: &str| SyncError::InvalidOrigin {
            origin: input.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(invalid("origin must have a scheme and host"));
        }
        if url.path() != "/" || url.query().is_some() {
            return Err(invalid("origin must not carry a path or query"));
        }

        let base = Url::parse(&format!("{}/", origin.ascii_serialization()))
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(Self { base })
    }

    /// Origin without a trailing slash
    pub fn as_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn host(&self) -> Option<&str> {
        self.base.host_str()
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    /// Absolute URL for a manifest key. `"/"` is the origin root.
    pub fn resource_url(&self, key: &str) -> SyncResult<Url> {
        if key == ENTRY_POINT {
            return Ok(self.base.clone());
        }
        self.base
            .join(key)
            .map_err(|e| SyncError::InvalidResourceKey {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Resolve a user-supplied path or absolute URL against this origin.
    pub fn resolve(&self, input: &str) -> SyncResult<Url> {
        match Url::parse(input) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base
                    .join(input)
                    .map_err(|e| SyncError::InvalidResourceKey {
                        key: input.to_string(),
                        reason: e.to_string(),
                    })
            }
            Err(e) => Err(SyncError::InvalidResourceKey {
                key: input.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Key of an intercepted request, or `None` for cross-origin URLs.
    ///
    /// Strips a `?v=` version suffix and maps the root and fragment-only
    /// URLs to the entry point.
    pub fn request_key(&self, url: &Url) -> Option<String> {
        if !self.is_same_origin(url) {
            return None;
        }
        let mut key = relative_part(url);
        if let Some(idx) = key.find(VERSION_QUERY) {
            key.truncate(idx);
        }
        if key.is_empty() || key.starts_with('#') {
            return Some(ENTRY_POINT.to_string());
        }
        Some(key)
    }

    /// Key of an entry already stored in a cache (request identity URL).
    pub fn entry_key(&self, stored_url: &str) -> Option<String> {
        let url = Url::parse(stored_url).ok()?;
        if !self.is_same_origin(&url) {
            return None;
        }
        let key = relative_part(&url);
        if key.is_empty() {
            return Some(ENTRY_POINT.to_string());
        }
        Some(key)
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The URL actually sent over the network. Fragments never leave the client.
pub fn request_identity(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Cache identity for a request URL
pub fn cache_key(url: &Url) -> String {
    request_identity(url).into()
}

fn relative_part(url: &Url) -> String {
    let mut rest = url.path().trim_start_matches('/').to_string();
    if let Some(query) = url.query() {
        rest.push('?');
        rest.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        rest.push('#');
        rest.push_str(fragment);
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::parse("https://app.example.com").unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_normalizes_trailing_slash() {
        assert_eq!(origin().as_str(), "https://app.example.com");
        assert_eq!(
            Origin::parse("https://app.example.com/").unwrap().as_str(),
            "https://app.example.com"
        );
        assert!(Origin::parse("https://app.example.com/sub").is_err());
        assert!(Origin::parse("not a url").is_err());
    }

    #[test]
    fn test_request_key_entry_point_variants() {
        let o = origin();
        assert_eq!(o.request_key(&url("https://app.example.com")).as_deref(), Some("/"));
        assert_eq!(o.request_key(&url("https://app.example.com/")).as_deref(), Some("/"));
        assert_eq!(
            o.request_key(&url("https://app.example.com/#/settings")).as_deref(),
            Some("/")
        );
        assert_eq!(
            o.request_key(&url("https://app.example.com#/profile")).as_deref(),
            Some("/")
        );
    }

    #[test]
    fn test_request_key_strips_version_query() {
        let o = origin();
        assert_eq!(
            o.request_key(&url("https://app.example.com/app.js?v=3")).as_deref(),
            Some("app.js")
        );
        assert_eq!(
            o.request_key(&url("https://app.example.com/assets/font.ttf")).as_deref(),
            Some("assets/font.ttf")
        );
        // Other queries are part of the key
        assert_eq!(
            o.request_key(&url("https://app.example.com/app.js?x=1")).as_deref(),
            Some("app.js?x=1")
        );
    }

    #[test]
    fn test_request_key_cross_origin() {
        let o = origin();
        assert_eq!(o.request_key(&url("https://cdn.example.com/app.js")), None);
        assert_eq!(o.request_key(&url("http://app.example.com/app.js")), None);
        assert_eq!(o.request_key(&url("https://app.example.com.evil.io/app.js")), None);
    }

    #[test]
    fn test_entry_key_and_resource_url_agree() {
        let o = origin();
        for key in ["/", "app.js", "assets/AssetManifest.json"] {
            let url = o.resource_url(key).unwrap();
            assert_eq!(o.entry_key(&cache_key(&url)).as_deref(), Some(key));
        }
        // Versioned entries keep their query and no longer match a manifest key
        assert_eq!(
            o.entry_key("https://app.example.com/app.js?v=3").as_deref(),
            Some("app.js?v=3")
        );
    }

    #[test]
    fn test_cache_key_drops_fragment() {
        assert_eq!(
            cache_key(&url("https://app.example.com/#/settings")),
            "https://app.example.com/"
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let o = origin();
        assert_eq!(o.resolve("app.js").unwrap().as_str(), "https://app.example.com/app.js");
        assert_eq!(o.resolve("/app.js").unwrap().as_str(), "https://app.example.com/app.js");
        assert_eq!(
            o.resolve("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }
}
