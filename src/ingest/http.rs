//! HTTP MJPEG stream opener.
//!
//! Issues a GET and hands back the response body as a byte stream. Any
//! network-level fault (DNS, refused connection, non-2xx status) is a connect
//! failure; nothing here retries.

use anyhow::{Context, Result};

use super::{ByteStream, ReceiverConfig};

pub(super) fn open(url: &str, config: &ReceiverConfig) -> Result<ByteStream> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.read_timeout)
        .build();
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("connect to mjpeg stream {}", url))?;

    let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
    if !content_type.contains("multipart") {
        // Single-JPEG endpoints still work: the body holds exactly one frame.
        log::warn!(
            "stream {} answered with content type '{}', expected multipart",
            url,
            content_type
        );
    }
    log::debug!("http stream {} opened (status {})", url, response.status());
    Ok(Box::new(response.into_reader()))
}
