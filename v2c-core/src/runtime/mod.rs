pub mod docker;

pub use docker::DockerRuntime;

use crate::Result;

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncWrite;

/// Length of significant characters of a container or image ID.
static ID_LEN: usize = 12;

pub(crate) fn truncate(id: &str) -> &str {
    if id.len() > ID_LEN {
        &id[..ID_LEN]
    } else {
        id
    }
}

/// A single demultiplexed frame read from an attached container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputChunk {
    StdOut(Vec<u8>),
    StdErr(Vec<u8>),
}

impl OutputChunk {
    pub fn payload(&self) -> &[u8] {
        match self {
            OutputChunk::StdOut(payload) | OutputChunk::StdErr(payload) => payload,
        }
    }
}

pub type OutputStream = Pin<Box<dyn Stream<Item = Result<OutputChunk>> + Send>>;
pub type InputStream = Pin<Box<dyn AsyncWrite + Send>>;
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Both halves of an attached container's stdio. `input` is present only
/// when the attach request asked for stdin.
pub struct AttachedIo {
    pub output: OutputStream,
    pub input: Option<InputStream>,
}

/// Subset of the engine's image summary consumed by the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub labels: HashMap<String, String>,
    pub created: i64,
}

#[derive(Clone, Default, Debug)]
pub struct CreateOpts {
    image: String,
    name: Option<String>,
    binds: Vec<String>,
    network_none: bool,
    stdin_open: bool,
}

impl CreateOpts {
    pub fn new(image: impl Into<String>) -> Self {
        CreateOpts {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Host binds in `host:container[:ro]` notation; volume names are
    /// accepted in the host position.
    pub fn binds(mut self, binds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.binds = binds.into_iter().map(|b| b.into()).collect();
        self
    }

    pub fn network_none(mut self, none: bool) -> Self {
        self.network_none = none;
        self
    }

    /// Opens stdin for exactly one attached writer and disables the tty.
    pub fn stdin_open(mut self, open: bool) -> Self {
        self.stdin_open = open;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The engine operations the pipeline needs. Implemented over the Docker
/// engine in [`docker::DockerRuntime`] and by an in-memory fake in tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_images_by_label(&self, label: &str) -> Result<Vec<ImageSummary>>;

    async fn create_container(&self, opts: &CreateOpts) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    /// Blocks until the container exits and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;
    /// Force-removes the container together with its anonymous volumes.
    async fn remove_container(&self, id: &str) -> Result<()>;
    /// Attaches to the container's stdio in streaming mode. Stdout is always
    /// requested; stdin only when `stdin` is set.
    async fn attach_container(&self, id: &str, stdin: bool) -> Result<AttachedIo>;
    async fn container_logs(&self, id: &str) -> Result<Vec<u8>>;

    async fn create_volume(&self, name: &str) -> Result<()>;
    async fn remove_volume(&self, name: &str) -> Result<()>;
    async fn volume_exists(&self, name: &str) -> Result<bool>;

    async fn pull_image(&self, name: &str) -> Result<()>;
    async fn export_image(&self, name: &str) -> Result<ByteStream>;
    async fn remove_image(&self, name: &str, force: bool, noprune: bool) -> Result<()>;
}
