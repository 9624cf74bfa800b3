//! Concurrent fan-out of detective probes over the packaged filesystem.

use crate::build::Context;
use crate::cancel::CancelToken;
use crate::component::Detective;
use crate::runtime::{ContainerRuntime, CreateOpts};
use crate::stream;
use crate::{ErrContext, Result};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

/// What one detective reported about the packaged filesystem. An absent
/// tarball means the detective exited non-zero: the feature is not present.
#[derive(Clone, Debug)]
pub struct Response {
    pub category: String,
    /// `repository:tag` of the provisioner that consumes this tarball.
    pub next: String,
    pub tarball: Option<Vec<u8>>,
}

/// Launches every detective concurrently and collects exactly one response
/// per launch, dropping the empty ones. Returns the distinguished
/// cancellation error if the token fires before all responses arrive.
pub async fn fan_out(
    ctx: &Context,
    detectives: &[Detective],
    volume: &str,
) -> Result<Vec<Response>> {
    let span = info_span!("detect");
    async move {
        let (tx, mut rx) = mpsc::channel(detectives.len().max(1));

        let mut workers = Vec::with_capacity(detectives.len());
        for detective in detectives {
            workers.push(tokio::spawn(launch(
                ctx.runtime.clone(),
                ctx.cancel.clone(),
                detective.clone(),
                volume.to_string(),
                tx.clone(),
            )));
        }
        drop(tx);

        let collected = collect(&ctx.cancel, detectives.len(), &mut rx).await;

        // Once collection gives up, stop the remaining workers and join
        // them so every container removal happens inside the build.
        if collected.is_err() {
            ctx.cancel.cancel();
        }
        for worker in workers {
            let _ = worker.await;
        }

        collected
    }
    .instrument(span)
    .await
}

async fn collect(
    cancel: &CancelToken,
    launched: usize,
    rx: &mut mpsc::Receiver<Result<Response>>,
) -> Result<Vec<Response>> {
    let mut detected = Vec::new();

    for _ in 0..launched {
        tokio::select! {
            _ = cancel.cancelled() => return err!("Task cancelled or late."),
            response = rx.recv() => match response {
                Some(Ok(response)) => {
                    if response.tarball.is_some() {
                        detected.push(response);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return err!("detective channel closed before all responses arrived"),
            },
        }
    }

    Ok(detected)
}

async fn launch(
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancelToken,
    detective: Detective,
    volume: String,
    tx: mpsc::Sender<Result<Response>>,
) {
    let span = info_span!("detective", component = %detective.image_ref());
    async move {
        let response = probe(runtime.as_ref(), &cancel, &detective, &volume)
            .await
            .map(|tarball| Response {
                category: detective.category.clone(),
                next: detective.related.clone(),
                tarball,
            });

        // Never block on a collector that has already given up.
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tx.send(response) => {}
        }
    }
    .instrument(span)
    .await
}

/// One detective probe: the container is created, drained and always
/// removed again, no matter which step failed.
async fn probe(
    runtime: &dyn ContainerRuntime,
    cancel: &CancelToken,
    detective: &Detective,
    volume: &str,
) -> Result<Option<Vec<u8>>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let opts = CreateOpts::new(detective.image_ref())
        .name(detective.container_name())
        .network_none(true)
        .binds([format!("{}:/v2c:ro", volume)]);
    let id = runtime.create_container(&opts).await?;

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        result = inspect(runtime, &id) => result,
    };

    let removed = runtime.remove_container(&id).await;
    let result = result?;
    removed.context("failed to remove detective container")?;

    Ok(result)
}

async fn inspect(runtime: &dyn ContainerRuntime, id: &str) -> Result<Option<Vec<u8>>> {
    let io = runtime.attach_container(id, false).await?;
    runtime.start_container(id).await?;

    let tarball = stream::read_frames(io.output).await?;

    let exit_code = runtime.wait_container(id).await?;
    if exit_code != 0 {
        debug!(code = exit_code, "detective reported no results");
        return Ok(None);
    }

    Ok(Some(tarball))
}
