//! Materialization of provisioner results into the build context.

use crate::build::provisioner;
use crate::component::Provisioner;
use crate::{ErrContext, Result};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info_span};

/// Sidecar record pairing a persisted archive with the provisioner that
/// produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub provisioner: Provisioner,
    pub tarball_name: String,
}

/// Writes every provisioner archive plus its manifest into a
/// category-named subdirectory of the build context. Directory and file
/// permissions are copied from the build context root.
pub fn write_results(
    output_dir: &Path,
    results: &BTreeMap<String, Vec<provisioner::Response>>,
) -> Result<BTreeMap<String, Vec<Manifest>>> {
    let span = info_span!("persist");
    let _enter = span.enter();

    let permissions = fs::metadata(output_dir)
        .with_context(|| format!("failed to stat {}", output_dir.display()))?
        .permissions();

    let mut manifests: BTreeMap<String, Vec<Manifest>> = BTreeMap::new();

    for (category, responses) in results {
        let dir = output_dir.join(category);
        if !dir.exists() {
            fs::create_dir(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            fs::set_permissions(&dir, permissions.clone())
                .with_context(|| format!("failed to set permissions on {}", dir.display()))?;
        }

        for response in responses {
            let Some(tarball) = &response.tarball else {
                continue;
            };

            let digest = hex::encode(Sha256::digest(response.provisioner.image_ref()));
            let manifest = Manifest {
                provisioner: response.provisioner.clone(),
                tarball_name: format!("{}.tar", digest),
            };

            let manifest_bytes =
                serde_json::to_vec(&manifest).context("failed to encode manifest")?;
            write_file(&dir.join(format!("{}.manifest", digest)), &manifest_bytes, &permissions)?;
            write_file(&dir.join(&manifest.tarball_name), tarball, &permissions)?;

            debug!(
                category = %category,
                provisioner = %manifest.provisioner.image_ref(),
                tarball = %manifest.tarball_name,
                "persisted result"
            );
            manifests.entry(category.clone()).or_default().push(manifest);
        }
    }

    Ok(manifests)
}

fn write_file(path: &Path, content: &[u8], permissions: &fs::Permissions) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    fs::set_permissions(path, permissions.clone())
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(repository: &str, category: &str, tarball: Option<&[u8]>) -> provisioner::Response {
        provisioner::Response {
            provisioner: Provisioner {
                image_id: format!("sha256:{}", repository),
                repository: repository.to_string(),
                tag: "latest".to_string(),
                category: category.to_string(),
                description: String::new(),
            },
            category: category.to_string(),
            tarball: tarball.map(|t| t.to_vec()),
        }
    }

    #[test]
    fn persists_archives_and_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let results = BTreeMap::from([(
            "application".to_string(),
            vec![response("v2c/provisioner.apt", "application", Some(b"archive-bytes"))],
        )]);

        let manifests = write_results(dir.path(), &results).unwrap();

        let written = &manifests["application"][0];
        let digest = hex::encode(Sha256::digest("v2c/provisioner.apt:latest"));
        assert_eq!(written.tarball_name, format!("{}.tar", digest));

        let tarball = fs::read(dir.path().join("application").join(&written.tarball_name)).unwrap();
        assert_eq!(tarball, b"archive-bytes");

        let manifest_path = dir
            .path()
            .join("application")
            .join(format!("{}.manifest", digest));
        let manifest: Manifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(&manifest, written);
    }

    #[test]
    fn manifest_json_uses_legacy_field_names() {
        let manifest = Manifest {
            provisioner: Provisioner {
                image_id: "sha256:abc".to_string(),
                repository: "repo".to_string(),
                tag: "tag".to_string(),
                category: "application".to_string(),
                description: String::new(),
            },
            tarball_name: "deadbeef.tar".to_string(),
        };

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["TarballName"], "deadbeef.tar");
        assert_eq!(json["Provisioner"]["ImageID"], "sha256:abc");
        assert_eq!(json["Provisioner"]["Repository"], "repo");
    }

    #[test]
    fn dropped_responses_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let results = BTreeMap::from([(
            "application".to_string(),
            vec![
                response("kept", "application", Some(b"bytes")),
                response("dropped", "application", None),
            ],
        )]);

        let manifests = write_results(dir.path(), &results).unwrap();
        assert_eq!(manifests["application"].len(), 1);
        assert_eq!(manifests["application"][0].provisioner.repository, "kept");
    }

    #[test]
    fn reuses_existing_category_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();

        let results = BTreeMap::from([(
            "config".to_string(),
            vec![response("v2c/provisioner.sshd", "config", Some(b"bytes"))],
        )]);

        write_results(dir.path(), &results).unwrap();
        assert!(dir.path().join("config").exists());
    }
}
