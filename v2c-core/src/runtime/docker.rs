use crate::runtime::{
    AttachedIo, ByteStream, ContainerRuntime, CreateOpts, ImageSummary, OutputChunk,
};
use crate::{ErrContext, Error, Result};

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as EngineError;
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::HostConfig;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::path::Path;
use tracing::trace;

#[cfg(unix)]
pub static DOCKER_SOCK: &str = "/run/docker.sock";
#[cfg(unix)]
pub static DOCKER_SOCK_SECONDARY: &str = "/var/run/docker.sock";

static CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`ContainerRuntime`] implementation backed by the local Docker engine.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the engine at the common unix socket locations.
    #[cfg(unix)]
    pub fn connect() -> Result<Self> {
        let socket_path = if Path::new(DOCKER_SOCK).exists() {
            DOCKER_SOCK
        } else {
            DOCKER_SOCK_SECONDARY
        };
        Self::connect_uri(&format!("unix://{}", socket_path))
    }

    #[cfg(not(unix))]
    pub fn connect() -> Result<Self> {
        Self::connect_uri("tcp://127.0.0.1:8080")
    }

    /// Connects to the engine listening on a unix or tcp uri, e.g.
    /// `unix:///var/run/docker.sock` or `tcp://127.0.0.1:2375`.
    pub fn connect_uri(uri: &str) -> Result<Self> {
        let docker = if uri.starts_with("unix://") {
            Docker::connect_with_unix(uri, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            let uri = uri.replacen("tcp://", "http://", 1);
            Docker::connect_with_http(&uri, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .context("failed to initialize engine connection")?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_images_by_label(&self, label: &str) -> Result<Vec<ImageSummary>> {
        let opts = ListImagesOptions::<String> {
            filters: HashMap::from([("label".to_string(), vec![label.to_string()])]),
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(opts))
            .await
            .context("listing labeled images")?;

        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                repo_tags: image.repo_tags,
                labels: image.labels,
                created: image.created,
            })
            .collect())
    }

    async fn create_container(&self, opts: &CreateOpts) -> Result<String> {
        let create_opts = opts.container_name().map(|name| CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        });

        let host_config = HostConfig {
            binds: Some(opts.binds.clone()),
            network_mode: opts.network_none.then(|| "none".to_string()),
            ..Default::default()
        };

        let config = Config::<String> {
            image: Some(opts.image().to_string()),
            attach_stdin: Some(opts.stdin_open),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(opts.stdin_open),
            stdin_once: Some(opts.stdin_open),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(create_opts, config)
            .await
            .context("failed to create container")?;
        trace!(id = %super::truncate(&response.id), image = %opts.image(), "created container");

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start container")
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let mut wait = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // The engine reports non-zero exits through the error channel.
            Some(Err(EngineError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::new(e)).context("failed to wait for container"),
            None => err!("container wait stream ended without a status"),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .context("failed to remove container")
    }

    async fn attach_container(&self, id: &str, stdin: bool) -> Result<AttachedIo> {
        let opts = AttachContainerOptions::<String> {
            stdin: Some(stdin),
            stdout: Some(true),
            stderr: Some(false),
            stream: Some(true),
            logs: Some(false),
            detach_keys: None,
        };

        let results = self
            .docker
            .attach_container(id, Some(opts))
            .await
            .context("failed to attach to container")?;

        let output = results
            .output
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(OutputChunk::StdOut(message.to_vec())))
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        Some(Ok(OutputChunk::StdErr(message.to_vec())))
                    }
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(Error::new(e))),
                }
            })
            .boxed();

        Ok(AttachedIo {
            output,
            input: stdin.then_some(results.input),
        })
    }

    async fn container_logs(&self, id: &str) -> Result<Vec<u8>> {
        let outputs = self
            .docker
            .logs(
                id,
                Some(LogsOptions::<String> {
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            )
            .try_collect::<Vec<LogOutput>>()
            .await
            .context("failed to collect container logs")?;

        let mut logs = Vec::new();
        for output in outputs {
            logs.extend_from_slice(&output.into_bytes());
        }
        Ok(logs)
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.docker
            .create_volume(CreateVolumeOptions::<String> {
                name: name.to_string(),
                driver: "local".to_string(),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .context("failed to create volume")
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
            .context("failed to remove volume")
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(EngineError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(Error::new(e)).context("failed to inspect volume"),
        }
    }

    async fn pull_image(&self, name: &str) -> Result<()> {
        let mut pull = self.docker.create_image(
            Some(CreateImageOptions::<String> {
                from_image: name.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(info) = pull.next().await {
            let info = info.context("failed to pull image")?;
            if let Some(status) = info.status {
                trace!(image = %name, status = %status, "pulling");
            }
        }
        Ok(())
    }

    async fn export_image(&self, name: &str) -> Result<ByteStream> {
        let export = self
            .docker
            .export_image(name)
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| Error::new(e).context("failed to export image"))
            })
            .boxed();
        Ok(export)
    }

    async fn remove_image(&self, name: &str, force: bool, noprune: bool) -> Result<()> {
        self.docker
            .remove_image(name, Some(RemoveImageOptions { force, noprune }), None)
            .await
            .map(|_| ())
            .context("failed to remove image")
    }
}
