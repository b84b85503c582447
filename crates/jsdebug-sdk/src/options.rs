//! Runtime knobs for a debug session.

/// Default lower bound for the string limit used by truncated-value reload.
pub const DEFAULT_RELOAD_MIN_LENGTH: u64 = 65_536;

/// Tunables shared by both dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// First frame of the automatic backtrace.
    pub backtrace_from: Option<u32>,
    /// One past the last frame; `None` means all frames.
    pub backtrace_to: Option<u32>,
    /// Ask the VM for the compact backtrace format.
    pub compact_backtrace: bool,
    /// String limit for ordinary lookups. `None` keeps the VM default.
    pub max_string_length: Option<u64>,
    /// Lower bound for the string limit when reloading a truncated value.
    pub reload_min_length: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            backtrace_from: None,
            backtrace_to: None,
            compact_backtrace: true,
            max_string_length: None,
            reload_min_length: DEFAULT_RELOAD_MIN_LENGTH,
        }
    }
}

impl SessionOptions {
    /// String limit for reloading a value of which `loaded` characters are
    /// known.
    pub fn reload_limit(&self, loaded: u64) -> u64 {
        loaded.saturating_mul(10).max(self.reload_min_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = SessionOptions::default();
        assert!(options.compact_backtrace);
        assert_eq!(options.backtrace_to, None);
        assert_eq!(options.reload_min_length, 65_536);
    }

    #[test]
    fn reload_limit_has_a_floor() {
        let options = SessionOptions::default();
        assert_eq!(options.reload_limit(80), 65_536);
        assert_eq!(options.reload_limit(10_000), 100_000);
    }
}
