//! Artifact path resolution
//!
//! Directory templates use `{name}` and `{id}` placeholders. The older
//! `${name}` and `${uuid}` spellings are accepted as well.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use replayvault_core::Participant;
use replayvault_core::artifact::artifact_file_name;
use std::path::{Component, Path, PathBuf};

/// Regex for matching {name}, {id}, ${name} and ${uuid}
static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\{(name|id|uuid)\}").unwrap());

/// Keep only characters that are safe in a single path component
fn sanitize_component(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(255)
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Whether a template references the participant at all
pub fn has_placeholder(template: &str) -> bool {
    PLACEHOLDER_REGEX.is_match(template)
}

/// Substitute participant values into a directory template
pub fn resolve_directory(template: &str, participant: &Participant) -> PathBuf {
    let resolved = PLACEHOLDER_REGEX.replace_all(template, |caps: &regex::Captures| {
        match &caps[1] {
            "name" => sanitize_component(&participant.name),
            _ => sanitize_component(&participant.id),
        }
    });
    PathBuf::from(resolved.into_owned())
}

/// `<dir>/<timestamp>[@suffix].<ext>`
pub fn artifact_path(
    dir: &Path,
    created: NaiveDateTime,
    suffix: Option<&str>,
    extension: &str,
) -> PathBuf {
    dir.join(artifact_file_name(created, suffix, extension))
}

/// The static part of a template: every component before the first placeholder
///
/// Participant directories live directly below this root.
pub fn store_root(template: &str) -> PathBuf {
    let root: PathBuf = Path::new(template)
        .components()
        .take_while(|component| match component {
            Component::Normal(part) => !part.to_str().is_some_and(has_placeholder),
            _ => true,
        })
        .collect();

    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

/// Resolve `.` and `..` without touching the filesystem
///
/// A `..` that cannot be folded into an earlier component is kept.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether a store root names a directory of its own
///
/// Roots like `.`, `..`, `a/..` or `/` would hand the working directory or
/// the whole filesystem to the sweep.
pub fn is_dedicated_root(root: &Path) -> bool {
    lexically_normalize(root)
        .components()
        .any(|component| matches!(component, Component::Normal(_)))
}

/// Absolute, normalised form of a store root for comparing roots
pub fn comparable_root(root: &Path) -> PathBuf {
    if root.is_absolute() {
        return lexically_normalize(root);
    }
    match std::env::current_dir() {
        Ok(cwd) => lexically_normalize(&cwd.join(root)),
        Err(_) => lexically_normalize(root),
    }
}

/// Whether one store root contains the other
pub fn roots_overlap(a: &Path, b: &Path) -> bool {
    let a = comparable_root(a);
    let b = comparable_root(b);
    a.starts_with(&b) || b.starts_with(&a)
}

/// Resolves artifact paths for one template and extension
#[derive(Debug, Clone)]
pub struct ArtifactPathResolver {
    template: String,
    extension: String,
}

impl ArtifactPathResolver {
    pub fn new(template: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            extension: extension.into(),
        }
    }

    pub fn directory(&self, participant: &Participant) -> PathBuf {
        resolve_directory(&self.template, participant)
    }

    /// Full artifact path for a participant and creation time
    pub fn resolve(&self, participant: &Participant, created: NaiveDateTime) -> PathBuf {
        artifact_path(&self.directory(participant), created, None, &self.extension)
    }

    /// Like `resolve`, adding `@1`, `@2`, ... while `taken` claims the path
    ///
    /// Participants that sanitize to the same directory and start in the
    /// same second would otherwise share one file.
    pub fn resolve_unique(
        &self,
        participant: &Participant,
        created: NaiveDateTime,
        taken: impl Fn(&Path) -> bool,
    ) -> PathBuf {
        let dir = self.directory(participant);
        let path = artifact_path(&dir, created, None, &self.extension);
        if !taken(&path) {
            return path;
        }
        let mut n: u32 = 1;
        loop {
            let candidate = artifact_path(&dir, created, Some(&n.to_string()), &self.extension);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn store_root(&self) -> PathBuf {
        store_root(&self.template)
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}
