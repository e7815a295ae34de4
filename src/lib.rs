//! Workspace root stub. The protocol lives in the `crates/blerpc-*`
//! member crates.
