//! The sequential packager stage preparing the transport volume from the
//! guest disk.

use crate::build::Context;
use crate::component::Packager;
use crate::runtime::CreateOpts;
use crate::{ErrContext, Result};

use std::io::Write;
use tracing::{info, info_span, Instrument};

/// Mount point of the guest disk inside the packager container.
static INPUT_MOUNT: &str = "/input/input.vmdk";
/// Mount point of the transport volume inside every packager and detective.
static VOLUME_MOUNT: &str = "/v2c";

/// Picks the packager to run. Arbitrary but stable: the first one in
/// enumeration order wins.
pub fn choose(packagers: &[Packager]) -> &Packager {
    &packagers[0]
}

/// Runs the packager to completion against the guest disk and the transport
/// volume. Returns the container id; the caller keeps the container (and
/// with it the populated volume) alive until detection is done, then
/// removes it.
pub async fn run(ctx: &Context, packager: &Packager, volume: &str) -> Result<String> {
    let span = info_span!("package", component = %packager.image_ref());
    async move {
        if ctx.cancel.is_cancelled() {
            return err!("Task cancelled or late.");
        }

        let opts = CreateOpts::new(packager.image_ref())
            .name(packager.container_name())
            .network_none(true)
            .binds([
                format!("{}:{}", ctx.source_image.display(), INPUT_MOUNT),
                format!("{}:{}", volume, VOLUME_MOUNT),
            ]);
        let id = ctx.runtime.create_container(&opts).await?;

        let exit_code = run_to_completion(ctx, &id).await;
        match exit_code {
            Ok(0) => {
                info!("packager finished");
                Ok(id)
            }
            Ok(code) => {
                dump_logs(ctx, &id).await;
                let removed = ctx.runtime.remove_container(&id).await;
                removed.context("failed to remove packager container")?;
                err!("packager {} failed with exit code {}", packager.image_ref(), code)
            }
            Err(e) => {
                let _ = ctx.runtime.remove_container(&id).await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_to_completion(ctx: &Context, id: &str) -> Result<i64> {
    ctx.runtime.start_container(id).await?;

    tokio::select! {
        _ = ctx.cancel.cancelled() => err!("Task cancelled or late."),
        exit_code = ctx.runtime.wait_container(id) => exit_code,
    }
}

/// Pipes the failed packager's output to standard error so the operator
/// sees why the guest disk could not be packaged.
async fn dump_logs(ctx: &Context, id: &str) {
    if let Ok(logs) = ctx.runtime.container_logs(id).await {
        let _ = std::io::stderr().write_all(&logs);
    }
}
