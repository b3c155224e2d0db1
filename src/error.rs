//! Error types shared by the Immich client, the image pipeline and the panel driver.

use thiserror::Error;

/// Everything that can go wrong while getting a photo onto a panel.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Immich returned an error status code
    #[error("Immich returned error status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The metadata search came back empty
    #[error("no assets returned by Immich; check permissions or adjust --take")]
    NoAssets,

    /// The response body did not have the expected shape
    #[error("unexpected Immich response: {0}")]
    UnexpectedResponse(String),

    /// Thumbnail could not be decoded or the JPEG could not be encoded
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The vendor CLI rejected a command for a panel
    #[error("LCD {serial}: {message}")]
    Device {
        /// Serial of the panel the command targeted
        serial: String,
        /// stderr (or spawn error) reported by the vendor CLI
        message: String,
    },

    /// Autodetection found no usable panel
    #[error("no wireless TL LCD devices detected; connect one or pass --serial")]
    NoPanels,

    /// Autodetection found more than one panel
    #[error("multiple TL LCDs detected; pass --serial from one of: {}", .0.join(", "))]
    AmbiguousPanels(Vec<String>),

    /// A serial was empty after normalization
    #[error("serial value cannot be empty")]
    InvalidSerial,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Request(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::UnexpectedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_mentions_status_and_body() {
        let err = Error::Api {
            status: 401,
            body: "Invalid API key".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn ambiguous_panels_lists_every_serial() {
        let err = Error::AmbiguousPanels(vec!["aaa".to_string(), "bbb".to_string()]);
        assert!(err.to_string().ends_with("aaa, bbb"));
    }

    #[test]
    fn device_error_names_the_panel() {
        let err = Error::Device {
            serial: "abc123".to_string(),
            message: "USB interface is busy".to_string(),
        };
        assert_eq!(err.to_string(), "LCD abc123: USB interface is busy");
    }
}
