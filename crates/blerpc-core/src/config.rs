//! Per-peer session configuration.

use blerpc_proto::Capabilities;

/// Default per-read timeout the peripheral advertises, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u16 = 200;

/// Default payload cap, sized for constrained peripherals.
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// Central-side policy.
///
/// Encryption is required by default: connecting to a peripheral that
/// does not advertise `ENCRYPTION_SUPPORTED` fails unless the central
/// explicitly opts into plaintext with [`CentralConfig::allow_plaintext`].
#[derive(Debug, Clone)]
pub struct CentralConfig {
    /// Refuse to operate without a live encrypted session
    pub require_encryption: bool,
    /// Largest payload this central will reassemble
    pub max_payload_size: usize,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self { require_encryption: true, max_payload_size: DEFAULT_MAX_PAYLOAD }
    }
}

impl CentralConfig {
    /// Explicit opt-out for pre-encryption peripherals.
    pub fn allow_plaintext() -> Self {
        Self { require_encryption: false, ..Self::default() }
    }
}

/// Peripheral-side policy and advertised capabilities.
#[derive(Debug, Clone)]
pub struct PeripheralConfig {
    /// Per-read timeout advertised in the TIMEOUT reply, in milliseconds
    pub timeout_ms: u16,
    /// Capability record returned on CAPABILITIES requests
    pub capabilities: Capabilities,
    /// Reject plaintext command payloads once configured
    pub require_encryption: bool,
    /// Largest payload this peripheral will reassemble
    pub max_payload_size: usize,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            capabilities: Capabilities {
                max_request_payload_size: DEFAULT_MAX_PAYLOAD as u16,
                max_response_payload_size: DEFAULT_MAX_PAYLOAD as u16,
                flags: Capabilities::ENCRYPTION_SUPPORTED,
            },
            require_encryption: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
