//! The shared volume carrying the packaged filesystem view from the
//! packager to the detectives.

use crate::runtime::ContainerRuntime;
use crate::Result;

use tracing::{debug, warn};

/// Default name of the transport volume. Injectable through
/// [`TransportVolume::new`] so concurrent builds and tests do not collide.
pub static TRANSPORT_VOLUME: &str = "v2c-transport";

pub struct TransportVolume<'r> {
    runtime: &'r dyn ContainerRuntime,
    name: String,
}

impl<'r> TransportVolume<'r> {
    pub fn new(runtime: &'r dyn ContainerRuntime, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the volume unless it already exists. Idempotent.
    pub async fn ensure(&self) -> Result<()> {
        if self.runtime.volume_exists(&self.name).await? {
            debug!(volume = %self.name, "transport volume already exists");
            return Ok(());
        }

        debug!(volume = %self.name, "creating transport volume");
        self.runtime.create_volume(&self.name).await
    }

    /// Removes the volume unconditionally. A failed removal is logged and
    /// swallowed; a stale volume must not mask the build outcome.
    pub async fn teardown(&self) {
        debug!(volume = %self.name, "removing transport volume");
        if let Err(e) = self.runtime.remove_volume(&self.name).await {
            warn!(volume = %self.name, reason = %format!("{:?}", e), "failed to remove transport volume");
        }
    }
}
