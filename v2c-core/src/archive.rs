//! Helpers for the tar archives flowing between pipeline stages.

use crate::{ErrContext, Result};

use std::io::Read;
use std::path::Path;

static RECIPE_ENTRY: &str = "Dockerfile";

/// Pulls the build recipe fragment out of a provisioner archive, if the
/// archive contributes one.
pub fn recipe_fragment(tarball: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(tarball);

    for entry in archive.entries().context("failed to read archive")? {
        let mut entry = entry.context("failed to read archive entry")?;
        let path = entry.header().path().context("archive entry has an invalid path")?;
        if path.as_ref() != Path::new(RECIPE_ENTRY) {
            continue;
        }

        let mut fragment = Vec::new();
        entry
            .read_to_end(&mut fragment)
            .context("failed to read recipe fragment from archive")?;
        return Ok(Some(fragment));
    }

    Ok(None)
}

/// Creates a tar archive from an iterator of `(path, content)` entries.
pub fn create_tarball<'entry, E, P>(entries: E) -> Result<Vec<u8>>
where
    E: IntoIterator<Item = (P, &'entry [u8])>,
    P: AsRef<Path>,
{
    let mut archive = tar::Builder::new(Vec::new());

    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        archive
            .append_data(&mut header, path.as_ref(), content)
            .context("failed to append archive entry")?;
    }

    archive.into_inner().context("failed to finish archive")
}
