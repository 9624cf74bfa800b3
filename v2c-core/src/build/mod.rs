//! The transformation pipeline: package the guest disk, probe it with
//! detectives, provision build materials, persist them and assemble the
//! final recipe.

pub mod assemble;
pub mod detective;
pub mod packager;
pub mod persist;
pub mod provisioner;

use crate::cancel::CancelToken;
use crate::registry::{self, Components};
use crate::runtime::ContainerRuntime;
use crate::volume::{TransportVolume, TRANSPORT_VOLUME};
use crate::{ErrContext, Result};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// Groups all data and state necessary to transform one guest disk.
pub struct Context {
    runtime: Arc<dyn ContainerRuntime>,
    /// Absolute path of the guest disk image.
    source_image: PathBuf,
    /// Root of the generated build context.
    output_dir: PathBuf,
    transport_volume: String,
    categories: Vec<String>,
    cancel: CancelToken,
    no_cleanup: bool,
}

impl Context {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        source_image: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Context {
            runtime,
            source_image: source_image.into(),
            output_dir: output_dir.into(),
            transport_volume: TRANSPORT_VOLUME.to_string(),
            categories: assemble::DEFAULT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            cancel: CancelToken::new(),
            no_cleanup: false,
        }
    }

    /// Overrides the transport volume name so concurrent builds do not
    /// share state.
    pub fn transport_volume(mut self, name: impl Into<String>) -> Self {
        self.transport_volume = name.into();
        self
    }

    /// Overrides the category emission order used after the base image and
    /// product label.
    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Leaves the transport volume behind for inspection.
    pub fn no_cleanup(mut self, no_cleanup: bool) -> Self {
        self.no_cleanup = no_cleanup;
        self
    }
}

/// Runs the full pipeline and returns the path of the generated recipe.
pub async fn run(ctx: &Context) -> Result<PathBuf> {
    let span = info_span!("build", image = %ctx.source_image.display());
    async move {
        let components = registry::detect_components(ctx.runtime.as_ref()).await?;
        if components.packagers.is_empty() {
            return err!("no installed packagers");
        }

        let volume = TransportVolume::new(ctx.runtime.as_ref(), ctx.transport_volume.clone());
        let result = pipeline(ctx, &components, &volume).await;

        if ctx.no_cleanup {
            info!(volume = %volume.name(), "leaving transport volume behind");
        } else {
            volume.teardown().await;
        }

        result
    }
    .instrument(span)
    .await
}

async fn pipeline(
    ctx: &Context,
    components: &Components,
    volume: &TransportVolume<'_>,
) -> Result<PathBuf> {
    volume.ensure().await?;

    let packager = packager::choose(&components.packagers);
    info!(packager = %packager.image_ref(), "using packager");
    let packager_id = packager::run(ctx, packager, volume.name()).await?;

    // The packager container pins the populated volume until every
    // detective is done reading it.
    let detected = detective::fan_out(ctx, &components.detectives, volume.name()).await;
    let removed = ctx.runtime.remove_container(&packager_id).await;
    let detected = detected?;
    removed.context("failed to remove packager container")?;

    if detected.is_empty() {
        return err!("No components were detected.");
    }

    let results = provisioner::fan_out(ctx, &components.provisioners, detected).await?;
    let manifests = persist::write_results(&ctx.output_dir, &results)?;
    assemble::recipe(&ctx.output_dir, &ctx.categories, &manifests)
}
