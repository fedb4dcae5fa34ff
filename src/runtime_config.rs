//! # Runtime Configuration Module
//!
//! Tuning knobs for the coroutine runtime that drives the server: worker
//! loop count, per-coroutine stack size, and the event-notification backend
//! preference. Applied once, before the listener binds.
//!
//! ## Environment Variables
//!
//! ### `PORTICO_STACK_SIZE`
//!
//! Sets the stack size for handler and connection coroutines. Accepts
//! values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB). Total memory is roughly
//! `stack_size × concurrent_coroutines`, so tune this down for very high
//! connection counts and up for handlers with deep call chains.

use std::env;

use tracing::debug;

/// Runtime configuration for the embedded server.
///
/// Construct with [`RuntimeConfig::default()`] or [`RuntimeConfig::from_env()`]
/// and pass to [`crate::Server::with_config`]. The configuration is applied
/// to the `may` runtime when the server starts.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
    /// Number of scheduler worker threads; 0 leaves the runtime default.
    pub worker_threads: usize,
    /// Prefer the OS-optimized event notification backend (epoll/kqueue).
    ///
    /// The runtime selects the native backend automatically on supported
    /// platforms; this flag exists so embedders can record their preference
    /// explicitly and is reported at startup.
    pub native_transport: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: 0x10000,
            worker_threads: 0,
            native_transport: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let stack_size = match env::var("PORTICO_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x10000)
                } else {
                    val.parse().unwrap_or(0x10000)
                }
            }
            Err(_) => 0x10000,
        };

        RuntimeConfig {
            stack_size,
            ..Self::default()
        }
    }

    /// Apply this configuration to the coroutine runtime.
    ///
    /// Safe to call more than once; later calls simply reconfigure the
    /// scheduler defaults used for coroutines spawned afterwards.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
        if self.worker_threads > 0 {
            may::config().set_workers(self.worker_threads);
        }
        debug!(
            stack_size = self.stack_size,
            worker_threads = self.worker_threads,
            native_transport = self.native_transport,
            "runtime configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.stack_size, 0x10000);
        assert_eq!(cfg.worker_threads, 0);
        assert!(cfg.native_transport);
    }

    #[test]
    fn test_from_env_hex_and_decimal() {
        env::set_var("PORTICO_STACK_SIZE", "0x8000");
        assert_eq!(RuntimeConfig::from_env().stack_size, 0x8000);
        env::set_var("PORTICO_STACK_SIZE", "32768");
        assert_eq!(RuntimeConfig::from_env().stack_size, 32768);
        env::set_var("PORTICO_STACK_SIZE", "not-a-number");
        assert_eq!(RuntimeConfig::from_env().stack_size, 0x10000);
        env::remove_var("PORTICO_STACK_SIZE");
    }
}
