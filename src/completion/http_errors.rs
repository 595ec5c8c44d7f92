use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

/// Walks the source chain looking for an io error of `kind`, or a message
/// containing `needle` for transports that only keep the text.
fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

pub(crate) fn api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    if err.is_timeout() || is_timeout(&err) {
        return anyhow!(
            "request to '{}' timed out after {}s; raise VYX_TIMEOUT_SECS or retry later",
            api_url,
            timeout_secs
        );
    }

    if err.is_connect() {
        if is_connection_refused(&err) {
            return anyhow!(
                "connection refused by '{}'; check that OPENAI_BASE_URL points at a running service",
                api_url
            );
        }

        return anyhow!(
            "failed to connect to '{}'; check OPENAI_BASE_URL and network connectivity",
            api_url
        );
    }

    anyhow!("request to '{}' failed: {}", api_url, err)
}
