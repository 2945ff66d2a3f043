//! Configuration options for the ports.
//!
//! Compile time defaults plus a few runtime overrides read from the environment.

use std::env;

/// Packets held by a receive port before the oldest is flushed.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 100;

/// Samples kept by every statistics window.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Largest single transfer to a remote endpoint, matches a 2MiB message limit.
pub const DEFAULT_MAX_TRANSFER_BYTES: usize = 2 * 1024 * 1024;

/// Reserved for the envelope around each transfer, never used for samples.
pub const TRANSFER_OVERHEAD_BYTES: usize = 512;

/// Substituted for a zero elapsed time when computing rates.
pub const ZERO_ELAPSED_SENTINEL_SECS: f64 = 1e6;

/// Minimum seconds between repeated delivery error reports for one connection.
pub const MAX_DELIVERY_ERROR_LOG_SECONDS: u64 = 20;

/// Longest `disconnect` waits for an in flight push before skipping the closing EOS packets.
pub const DISCONNECT_EOS_WAIT_MS: u64 = 100;

/// Timeout sentinels accepted by `Wait::from_secs`, any negative value blocks.
pub const BLOCKING: f64 = -1.0;
pub const NON_BLOCKING: f64 = 0.0;

/// Retrieves the transfer limit in bytes, reading from `STEADY_PORTS_MAX_TRANSFER_BYTES`.
/// Falls back to `DEFAULT_MAX_TRANSFER_BYTES` when unset, unparsable or not larger than the
/// transfer overhead.
pub(crate) fn max_transfer_bytes() -> usize {
    env::var("STEADY_PORTS_MAX_TRANSFER_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|b| *b > TRANSFER_OVERHEAD_BYTES)
        .unwrap_or(DEFAULT_MAX_TRANSFER_BYTES)
}

/// Retrieves the default queue depth, reading from `STEADY_PORTS_MAX_QUEUE_DEPTH`.
/// Zero and unparsable values fall back to `DEFAULT_MAX_QUEUE_DEPTH`.
pub(crate) fn max_queue_depth() -> usize {
    env::var("STEADY_PORTS_MAX_QUEUE_DEPTH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_MAX_QUEUE_DEPTH)
}

/// Usable payload bits of one transfer of `transfer_bytes`.
pub(crate) fn payload_bits(transfer_bytes: usize) -> usize {
    transfer_bytes.saturating_sub(TRANSFER_OVERHEAD_BYTES) * 8
}
