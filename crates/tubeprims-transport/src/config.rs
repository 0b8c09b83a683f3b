use std::sync::OnceLock;

/// Default kernel buffer size for each tube direction: 4 KiB.
///
/// Typical OS defaults are around 128 KiB, far more than a stream of small
/// event records needs.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 4 * 1024;

/// Buffer size applied to the unused reverse direction of each endpoint.
///
/// Fixed regardless of the requested sizes.
pub const REVERSE_BUFFER_SIZE: usize = DEFAULT_SOCKET_BUFFER_SIZE;

/// Environment variable gating diagnostic endpoint naming (`1` enables).
pub const DEBUGGABLE_ENV: &str = "TUBEPRIMS_DEBUGGABLE";

/// Tube construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TubeConfig {
    /// `SO_RCVBUF` for the receiving endpoint.
    pub receive_buffer_size: usize,
    /// `SO_SNDBUF` for the sending endpoint.
    pub send_buffer_size: usize,
    /// Bind each endpoint to an abstract diagnostic name after creation.
    pub name_endpoints: bool,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            name_endpoints: debuggable(),
        }
    }
}

impl TubeConfig {
    /// Use `size` for both the forward receive and send buffers.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self.send_buffer_size = size;
        self
    }

    /// Override the endpoint naming gate.
    pub fn with_endpoint_names(mut self, enabled: bool) -> Self {
        self.name_endpoints = enabled;
        self
    }
}

/// Whether the process runs with the debug naming gate enabled.
///
/// Read from [`DEBUGGABLE_ENV`] on first use and cached for the process
/// lifetime.
pub fn debuggable() -> bool {
    static DEBUGGABLE: OnceLock<bool> = OnceLock::new();
    *DEBUGGABLE.get_or_init(|| {
        std::env::var(DEBUGGABLE_ENV)
            .map(|value| value.trim() == "1")
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sizes_are_small() {
        let cfg = TubeConfig::default();
        assert_eq!(cfg.receive_buffer_size, 4096);
        assert_eq!(cfg.send_buffer_size, 4096);
    }

    #[test]
    fn builder_overrides() {
        let cfg = TubeConfig::default()
            .with_buffer_size(64 * 1024)
            .with_endpoint_names(true);
        assert_eq!(cfg.receive_buffer_size, 64 * 1024);
        assert_eq!(cfg.send_buffer_size, 64 * 1024);
        assert!(cfg.name_endpoints);
    }

    #[test]
    fn debuggable_is_stable() {
        assert_eq!(debuggable(), debuggable());
    }
}
