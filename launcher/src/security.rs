//! Security configuration seam.
//!
//! Capabilities, seccomp, no-new-privs, LSM labels and uid/gid switching
//! are owned by an external security configurator. The launcher only fixes
//! the point in the start sequence where it runs: after the handshake
//! release, immediately before exec.

use cradle_shared::errors::CradleResult;
use cradle_shared::process::ProcessSpec;

/// Applies the delegated security configuration to the calling process.
pub trait SecurityConfigurator {
    fn configure(&self, spec: &ProcessSpec) -> CradleResult<()>;
}

/// Pass-through configurator for callers that apply security elsewhere.
pub struct PermitAll;

impl SecurityConfigurator for PermitAll {
    fn configure(&self, _spec: &ProcessSpec) -> CradleResult<()> {
        Ok(())
    }
}
