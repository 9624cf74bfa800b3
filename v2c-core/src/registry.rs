//! Discovery of the detective, provisioner and packager images installed on
//! the local engine.

use crate::component::{
    self, Detective, Packager, Provisioner, CATEGORY_LABEL, COMPONENT_LABEL, DESCRIPTION_LABEL,
    RELATED_LABEL, UNTAGGED,
};
use crate::runtime::{ContainerRuntime, ImageSummary};
use crate::Result;

use tracing::debug;

const DETECTIVE: &str = "detective";
const PROVISIONER: &str = "provisioner";
const PACKAGER: &str = "packager";

/// Every component installed on the host, split by role.
#[derive(Clone, Debug, Default)]
pub struct Components {
    pub detectives: Vec<Detective>,
    pub provisioners: Vec<Provisioner>,
    pub packagers: Vec<Packager>,
}

/// Enumerates images bearing the component label and classifies each one.
/// An image whose component label holds an unknown value is a fatal
/// configuration error.
pub async fn detect_components(runtime: &dyn ContainerRuntime) -> Result<Components> {
    let images = runtime.list_images_by_label(COMPONENT_LABEL).await?;

    let mut components = Components::default();
    for image in &images {
        classify(image, &mut components)?;
    }

    debug!(
        detectives = components.detectives.len(),
        provisioners = components.provisioners.len(),
        packagers = components.packagers.len(),
        "detected components"
    );

    Ok(components)
}

fn classify(image: &ImageSummary, components: &mut Components) -> Result<()> {
    let label = |key: &str| image.labels.get(key).cloned().unwrap_or_default();
    let role = label(COMPONENT_LABEL);

    for (repository, tag) in image_refs(image)? {
        match role.as_str() {
            DETECTIVE => components.detectives.push(Detective {
                image_id: image.id.clone(),
                repository,
                tag,
                category: label(CATEGORY_LABEL),
                description: label(DESCRIPTION_LABEL),
                related: label(RELATED_LABEL),
            }),
            PROVISIONER => components.provisioners.push(Provisioner {
                image_id: image.id.clone(),
                repository,
                tag,
                category: label(CATEGORY_LABEL),
                description: label(DESCRIPTION_LABEL),
            }),
            PACKAGER => components.packagers.push(Packager {
                image_id: image.id.clone(),
                repository,
                tag,
                category: label(CATEGORY_LABEL),
                description: label(DESCRIPTION_LABEL),
            }),
            unknown => {
                return err!(
                    "image {} carries an unknown component label value `{}`",
                    image.id,
                    unknown
                )
            }
        }
    }

    Ok(())
}

/// One `(repository, tag)` pair per tag of the image; untagged images yield
/// a single `<none>:<none>` entity.
fn image_refs(image: &ImageSummary) -> Result<Vec<(String, String)>> {
    if image.repo_tags.is_empty() {
        return Ok(vec![(UNTAGGED.to_string(), UNTAGGED.to_string())]);
    }

    image
        .repo_tags
        .iter()
        .map(|repo_tag| match component::split_ref(repo_tag) {
            Some((repository, tag)) => Ok((repository.to_string(), tag.to_string())),
            None => err!("image {} carries a malformed tag `{}`", image.id, repo_tag),
        })
        .collect()
}
