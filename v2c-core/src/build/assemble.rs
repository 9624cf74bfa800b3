//! Assembly of the final build recipe from persisted category manifests.

use crate::archive;
use crate::build::persist::Manifest;
use crate::component::PRODUCT_LABEL;
use crate::{ErrContext, Result};

use dockerfile_parser::{Dockerfile, Instruction};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str;
use tracing::{debug, info_span};

/// Name of the generated recipe file at the build context root.
pub static RECIPE_FILE: &str = "Dockerfile";

/// Emission order of the generic categories, after the base image and the
/// product label. Overridable per build.
pub static DEFAULT_CATEGORIES: &[&str] = &["application", "config", "init"];

static OS_CATEGORY: &str = "os";

/// Per-category rules for contributed recipe fragments.
enum Policy {
    Allow(&'static [&'static str]),
    Deny(&'static [&'static str]),
}

impl Policy {
    fn permits(&self, keyword: &str) -> bool {
        match self {
            Policy::Allow(allowed) => allowed.contains(&keyword),
            Policy::Deny(denied) => !denied.contains(&keyword),
        }
    }
}

fn policy(category: &str) -> Option<Policy> {
    match category {
        "os" => Some(Policy::Allow(&["from"])),
        "application" => Some(Policy::Deny(&[
            "from",
            "add",
            "copy",
            "shell",
            "entrypoint",
            "cmd",
            "onbuild",
            "stopsignal",
            "maintainer",
            "expose",
            "healthcheck",
        ])),
        "config" => Some(Policy::Deny(&[
            "from",
            "add",
            "copy",
            "shell",
            "entrypoint",
            "cmd",
            "onbuild",
            "stopsignal",
            "maintainer",
            "healthcheck",
        ])),
        "init" => Some(Policy::Allow(&["entrypoint", "cmd"])),
        _ => None,
    }
}

/// Writes the recipe from the persisted manifests: base image first, then
/// the product label, then the remaining categories in the configured
/// order. Returns the recipe path.
pub fn recipe(
    output_dir: &Path,
    categories: &[String],
    manifests: &BTreeMap<String, Vec<Manifest>>,
) -> Result<PathBuf> {
    let span = info_span!("assemble");
    let _enter = span.enter();

    let path = output_dir.join(RECIPE_FILE);
    // Truncate any previous recipe so re-runs are reproducible.
    let mut recipe = fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    apply_os(&mut recipe, output_dir, manifests.get(OS_CATEGORY))?;

    writeln!(recipe, "LABEL {}=1", PRODUCT_LABEL).context("failed to write product label")?;

    for category in categories {
        if category == OS_CATEGORY {
            continue;
        }
        apply_category(&mut recipe, output_dir, category, manifests.get(category))?;
    }

    debug!(recipe = %path.display(), "assembled recipe");
    Ok(path)
}

/// The `os` category contributes the base image: at most one manifest, and
/// its fragment is at most a single `FROM`. An absent or empty fragment
/// falls back to `FROM scratch`.
fn apply_os(
    recipe: &mut impl Write,
    output_dir: &Path,
    manifests: Option<&Vec<Manifest>>,
) -> Result<()> {
    let manifests = manifests.map(Vec::as_slice).unwrap_or_default();
    if manifests.len() > 1 {
        return err!("OS category contains multiple results.");
    }

    let fragment = match manifests.first() {
        Some(manifest) => fetch_fragment(output_dir, manifest)?,
        None => None,
    };

    match fragment {
        Some(fragment) if !fragment.is_empty() => {
            let text = str::from_utf8(&fragment).context("recipe fragment is not valid UTF-8")?;
            let parsed =
                Dockerfile::parse(text).context("failed to parse os recipe fragment")?;
            let single_from = parsed.instructions.len() == 1
                && matches!(parsed.instructions[0], Instruction::From(_));
            if !single_from {
                return err!(
                    "Provisioners in the OS category may only contribute a single FROM instruction."
                );
            }

            recipe
                .write_all(&fragment)
                .context("failed to write os fragment")?;
            recipe
                .write_all(b"\n")
                .context("failed to write os fragment")
        }
        _ => recipe
            .write_all(b"FROM scratch\n")
            .context("failed to write base image directive"),
    }
}

/// The generic visitor: every archive in the category is unpacked at the
/// image root with an `ADD`, followed by the validated fragment, if any.
fn apply_category(
    recipe: &mut impl Write,
    output_dir: &Path,
    category: &str,
    manifests: Option<&Vec<Manifest>>,
) -> Result<()> {
    let Some(manifests) = manifests else {
        return Ok(());
    };

    let mut buf = Vec::new();
    for manifest in manifests {
        // Overlapping archive entries all come from the same guest disk, so
        // collisions at the image root are merely redundant.
        writeln!(buf, "ADD ./{}/{} /", category, manifest.tarball_name)?;

        if let Some(fragment) = fetch_fragment(output_dir, manifest)? {
            if fragment.is_empty() {
                continue;
            }
            let text = str::from_utf8(&fragment).context("recipe fragment is not valid UTF-8")?;
            validate(category, manifest, text)?;
            buf.extend_from_slice(&fragment);
            buf.push(b'\n');
        }
    }

    recipe
        .write_all(&buf)
        .with_context(|| format!("failed to write {} fragments", category))
}

fn validate(category: &str, manifest: &Manifest, fragment: &str) -> Result<()> {
    let Some(policy) = policy(category) else {
        return Ok(());
    };

    let parsed = Dockerfile::parse(fragment).with_context(|| {
        format!(
            "failed to parse {} recipe fragment contributed by {}",
            category,
            manifest.provisioner.image_ref()
        )
    })?;

    for instruction in &parsed.instructions {
        let keyword = keyword(instruction);
        if !policy.permits(&keyword) {
            return err!(
                "Illegal instruction in {} category Dockerfile fragment: {} contributed by {}",
                category,
                keyword,
                manifest.provisioner.image_ref()
            );
        }
    }

    Ok(())
}

fn keyword(instruction: &Instruction) -> String {
    match instruction {
        Instruction::From(_) => "from".to_string(),
        Instruction::Arg(_) => "arg".to_string(),
        Instruction::Label(_) => "label".to_string(),
        Instruction::Run(_) => "run".to_string(),
        Instruction::Entrypoint(_) => "entrypoint".to_string(),
        Instruction::Cmd(_) => "cmd".to_string(),
        Instruction::Copy(_) => "copy".to_string(),
        Instruction::Env(_) => "env".to_string(),
        Instruction::Misc(misc) => misc.instruction.content.to_lowercase(),
    }
}

/// Reads the fragment contributed by a persisted archive, if any.
fn fetch_fragment(output_dir: &Path, manifest: &Manifest) -> Result<Option<Vec<u8>>> {
    let path = output_dir
        .join(&manifest.provisioner.category)
        .join(&manifest.tarball_name);
    let tarball =
        fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    archive::recipe_fragment(&tarball)
}
