//! Models for the labeled images that take part in a transformation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label marking an image as a pipeline component; its value decides the role.
pub static COMPONENT_LABEL: &str = "com.docker.v2c.component";
pub static CATEGORY_LABEL: &str = "com.docker.v2c.component.category";
pub static DESCRIPTION_LABEL: &str = "com.docker.v2c.component.description";
/// On detectives, the `repository:tag` of the provisioner consuming their output.
pub static RELATED_LABEL: &str = "com.docker.v2c.component.rel";
/// Present on images generated from an assembled build context.
pub static PRODUCT_LABEL: &str = "com.docker.v2c.product";
pub static PRODUCT_ORIGINAL_LABEL: &str = "com.docker.v2c.product.original";

/// Placeholder repository and tag reported by the engine for untagged images.
pub static UNTAGGED: &str = "<none>";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detective {
    #[serde(rename = "ImageID")]
    pub image_id: String,
    pub repository: String,
    pub tag: String,
    pub category: String,
    pub description: String,
    pub related: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Provisioner {
    #[serde(rename = "ImageID")]
    pub image_id: String,
    pub repository: String,
    pub tag: String,
    pub category: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Packager {
    #[serde(rename = "ImageID")]
    pub image_id: String,
    pub repository: String,
    pub tag: String,
    pub category: String,
    pub description: String,
}

/// An image produced from an assembled build context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Product {
    pub image_id: String,
    pub repository: String,
    pub tag: String,
    pub original: String,
    pub created: i64,
}

impl Detective {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.repository, &self.tag)
    }
}

impl Provisioner {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.repository, &self.tag)
    }
}

impl Packager {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.repository, &self.tag)
    }
}

/// Deterministic container name for a component. Two runs racing over the
/// same component collide on the name and serialize instead of doubling up.
pub fn container_name(repository: &str, tag: &str) -> String {
    hex::encode(Sha256::digest(format!("{}/{}", repository, tag)))
}

/// Splits a `repository:tag` reference, honoring registry ports in the
/// repository part.
pub fn split_ref(image_ref: &str) -> Option<(&str, &str)> {
    let (repository, tag) = image_ref.rsplit_once(':')?;
    if repository.is_empty() || tag.is_empty() || tag.contains('/') {
        return None;
    }
    Some((repository, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derives_stable_container_names() {
        let first = container_name("v2c/detective.sshd", "latest");
        let second = container_name("v2c/detective.sshd", "latest");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, container_name("v2c/detective.sshd", "v2"));
    }

    #[test]
    fn splits_image_refs() {
        assert_eq!(split_ref("repo:tag"), Some(("repo", "tag")));
        assert_eq!(
            split_ref("registry:5000/repo:tag"),
            Some(("registry:5000/repo", "tag"))
        );
        assert_eq!(split_ref("repo"), None);
        assert_eq!(split_ref("repo:"), None);
        assert_eq!(split_ref(":tag"), None);
    }

    #[test]
    fn serializes_manifest_compatible_field_names() {
        let provisioner = Provisioner {
            image_id: "sha256:abc".to_string(),
            repository: "v2c/provisioner.apt".to_string(),
            tag: "latest".to_string(),
            category: "application".to_string(),
            description: "installs detected packages".to_string(),
        };

        let json = serde_json::to_value(&provisioner).unwrap();
        assert_eq!(json["ImageID"], "sha256:abc");
        assert_eq!(json["Repository"], "v2c/provisioner.apt");
        assert_eq!(json["Tag"], "latest");
        assert_eq!(json["Category"], "application");
        assert_eq!(json["Description"], "installs detected packages");
    }
}
