use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unreachable: {url}")]
    Unreachable { url: String },

    #[error("Unexpected status {status} for {url}")]
    BadStatus { url: String, status: u16 },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Unreachable { url }
            | FetchError::BadStatus { url, .. } => url,
        }
    }

    /// Whether the request never produced a response at all
    pub fn is_network_failure(&self) -> bool {
        !matches!(self, FetchError::BadStatus { .. })
    }
}
