//! Address normalization.
//!
//! normalize("10.0.0.5")        -> "10.0.0.5:11434"
//! normalize("gpu-box:8080")    -> "gpu-box:8080"
//!
//! No DNS lookup and no IP validation happen here; any non-empty host is accepted.

/// Port an Ollama server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 11434;

/// Host used for the synthesized `default` endpoint.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Address of the synthesized `default` endpoint.
pub fn loopback_address() -> String {
    format!("{LOOPBACK_HOST}:{DEFAULT_PORT}")
}

/// Append the default port when `raw` carries no port separator.
///
/// Callers reject empty input before calling.
pub fn normalize(raw: &str) -> String {
    if raw.contains(':') {
        raw.to_string()
    } else {
        format!("{raw}:{DEFAULT_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_default_port() {
        assert_eq!(normalize("1.2.3.4"), "1.2.3.4:11434");
        assert_eq!(normalize("gpu-box"), "gpu-box:11434");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(normalize("gpu-box:8080"), "gpu-box:8080");
        assert_eq!(
            normalize("http://gpu-box:8080"),
            "http://gpu-box:8080",
            "anything with a separator is left alone"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["a", "10.0.0.1", "host:1", "[::1]:11434", "srv.local"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {raw}");
        }
    }

    #[test]
    fn loopback_default() {
        assert_eq!(loopback_address(), "127.0.0.1:11434");
    }
}
