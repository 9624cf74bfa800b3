//! Concurrent fan-out of provisioners consuming detective output.

use crate::build::{detective, Context};
use crate::cancel::CancelToken;
use crate::component::Provisioner;
use crate::runtime::{ContainerRuntime, CreateOpts};
use crate::stream;
use crate::{ErrContext, Error, Result};

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

/// A provisioned contribution to the build context. An absent tarball means
/// the provisioner exited non-zero and its result is dropped.
#[derive(Clone, Debug)]
pub struct Response {
    pub provisioner: Provisioner,
    pub category: String,
    pub tarball: Option<Vec<u8>>,
}

/// Launches one provisioner per surviving detective response, streams each
/// detective tarball to the matched provisioner's stdin, and groups the
/// surviving results by category.
pub async fn fan_out(
    ctx: &Context,
    provisioners: &[Provisioner],
    detected: Vec<detective::Response>,
) -> Result<BTreeMap<String, Vec<Response>>> {
    let span = info_span!("provision");
    async move {
        if provisioners.is_empty() {
            return err!("no installed provisioners");
        }

        let (tx, mut rx) = mpsc::channel(detected.len().max(1));

        let mut workers = Vec::with_capacity(detected.len());
        for response in detected {
            let provisioner = resolve(provisioners, &response.next).clone();
            debug!(
                provisioner = %provisioner.image_ref(),
                next = %response.next,
                "matched provisioner"
            );
            workers.push(tokio::spawn(launch(
                ctx.runtime.clone(),
                ctx.cancel.clone(),
                provisioner,
                response.tarball.unwrap_or_default(),
                tx.clone(),
            )));
        }
        drop(tx);

        let collected = collect(&ctx.cancel, workers.len(), &mut rx).await;

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

/// Resolves a detective's declared provisioner. An unmatched name falls
/// back to the first enumerated provisioner.
fn resolve<'p>(provisioners: &'p [Provisioner], next: &str) -> &'p Provisioner {
    provisioners
        .iter()
        .find(|provisioner| provisioner.image_ref() == next)
        .unwrap_or(&provisioners[0])
}

async fn collect(
    cancel: &CancelToken,
    launched: usize,
    rx: &mut mpsc::Receiver<Result<Response>>,
) -> Result<BTreeMap<String, Vec<Response>>> {
    let mut results: BTreeMap<String, Vec<Response>> = BTreeMap::new();

    for _ in 0..launched {
        tokio::select! {
            _ = cancel.cancelled() => return err!("Task cancelled or late."),
            response = rx.recv() => match response {
                Some(Ok(response)) => {
                    if response.tarball.is_some() {
                        results
                            .entry(response.category.clone())
                            .or_default()
                            .push(response);
                    } else {
                        debug!(
                            provisioner = %response.provisioner.image_ref(),
                            "provisioner produced no result"
                        );
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return err!("provisioner channel closed before all responses arrived"),
            },
        }
    }

    Ok(results)
}

async fn launch(
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancelToken,
    provisioner: Provisioner,
    input: Vec<u8>,
    tx: mpsc::Sender<Result<Response>>,
) {
    let span = info_span!("provisioner", component = %provisioner.image_ref());
    async move {
        let response = apply(runtime.as_ref(), &cancel, &provisioner, input)
            .await
            .map(|tarball| Response {
                category: provisioner.category.clone(),
                provisioner,
                tarball,
            });

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tx.send(response) => {}
        }
    }
    .instrument(span)
    .await
}

/// One provisioner run: create, feed, drain, always remove.
async fn apply(
    runtime: &dyn ContainerRuntime,
    cancel: &CancelToken,
    provisioner: &Provisioner,
    input: Vec<u8>,
) -> Result<Option<Vec<u8>>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let opts = CreateOpts::new(provisioner.image_ref())
        .name(provisioner.container_name())
        .stdin_open(true);
    let id = runtime.create_container(&opts).await?;

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        result = feed(runtime, &id, input) => result,
    };

    let removed = runtime.remove_container(&id).await;
    let result = result?;
    removed.context("failed to remove provisioner container")?;

    Ok(result)
}

async fn feed(
    runtime: &dyn ContainerRuntime,
    id: &str,
    input: Vec<u8>,
) -> Result<Option<Vec<u8>>> {
    let io = runtime.attach_container(id, true).await?;
    let mut stdin = io
        .input
        .ok_or_else(|| Error::msg("attached stream is missing the stdin half"))?;
    runtime.start_container(id).await?;

    // The archive is written and the response read concurrently so neither
    // side of the container can stall the other.
    let write = async move {
        stdin
            .write_all(&input)
            .await
            .context("failed to stream archive to provisioner stdin")?;
        stdin
            .shutdown()
            .await
            .context("failed to close provisioner stdin")
    };
    let (written, tarball) = tokio::join!(write, stream::read_frames(io.output));
    written?;
    let tarball = tarball?;

    let exit_code = runtime.wait_container(id).await?;
    if exit_code != 0 {
        debug!(code = exit_code, "provisioner result discarded");
        return Ok(None);
    }

    Ok(Some(tarball))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisioner(repository: &str, tag: &str) -> Provisioner {
        Provisioner {
            image_id: format!("sha256:{}", repository),
            repository: repository.to_string(),
            tag: tag.to_string(),
            category: "application".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn resolves_declared_provisioner() {
        let provisioners = vec![provisioner("a", "1"), provisioner("b", "2")];
        assert_eq!(resolve(&provisioners, "b:2").repository, "b");
    }

    #[test]
    fn unmatched_name_falls_back_to_first() {
        let provisioners = vec![provisioner("a", "1"), provisioner("b", "2")];
        assert_eq!(resolve(&provisioners, "missing:tag").repository, "a");
    }
}
