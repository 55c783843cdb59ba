//! Path Rewriting
//!
//! Job-input directories produced by the workflow compiler are of two kinds:
//! - absolute paths under the working root the compiler ran in
//! - staging directories named after the step parameter that produces them
//!
//! The execution backend mounts a volume per step under its target root, so
//! both kinds are translated into paths inside that mount namespace.

use std::path::{Component, Path, PathBuf};

use log::debug;
use serde_json::Value;

use crate::config::TranslationConfig;
use crate::naming::QualifiedName;
use crate::workflow::model::{DirectoryAttribute, DirectoryValue};

/// Translates Directory values into the target mount namespace.
#[derive(Debug, Clone)]
pub struct PathRewriter {
    working_root: PathBuf,
    target_root: PathBuf,
    attribute: DirectoryAttribute,
}

impl PathRewriter {
    pub fn new(
        working_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        attribute: DirectoryAttribute,
    ) -> Self {
        Self {
            working_root: working_root.into(),
            target_root: target_root.into(),
            attribute,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(
            config.working_root.clone(),
            config.target_root.clone(),
            config.directory_attribute(),
        )
    }

    /// Attribute rewritten by this rewriter.
    pub fn attribute(&self) -> DirectoryAttribute {
        self.attribute
    }

    /// Computes the target path of a directory.
    ///
    /// `owner` is the qualified name of the job input holding the directory,
    /// if it has one. Returns `None` when the path stays unchanged. Paths
    /// with `..` components are left unchanged, since their target would not
    /// be guaranteed to stay inside the target root.
    ///
    /// # Example
    ///
    /// ```
    /// use cwl2compute::translate::PathRewriter;
    /// use cwl2compute::workflow::DirectoryAttribute;
    ///
    /// let rewriter = PathRewriter::new("/work", "/data/outputs", DirectoryAttribute::Path);
    /// assert_eq!(
    ///     rewriter.rewrite_path(None, "/work/stepA__0__FileRenaming___outDir/result.tif"),
    ///     Some("/data/outputs/filerenaming/result.tif".to_string())
    /// );
    /// assert_eq!(rewriter.rewrite_path(None, "/datasets/BBBC001"), None);
    /// ```
    pub fn rewrite_path(&self, owner: Option<&QualifiedName>, path: &str) -> Option<String> {
        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            debug!("Path {} has parent components, not rewritten", path);
            return None;
        }

        if let Ok(remainder) = Path::new(path).strip_prefix(&self.working_root) {
            return Some(self.rebase(owner, remainder));
        }

        // Staging directory: the backend mounts the whole step directory.
        let owner = owner?;
        Some(to_posix(&self.target_root.join(owner.sanitized_step())))
    }

    /// Replaces the working root with `<target root>/<owning step>`.
    ///
    /// The owning step is the first component of the remainder when it is a
    /// qualified name (that component is consumed), otherwise `owner`.
    fn rebase(&self, owner: Option<&QualifiedName>, remainder: &Path) -> String {
        let mut components = remainder.components();
        let leading = components
            .next()
            .and_then(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .and_then(|name| QualifiedName::parse(name).ok());

        let mut target = self.target_root.clone();
        match (leading, owner) {
            (Some(step_dir), _) => {
                target.push(step_dir.sanitized_step());
                target.push(components.as_path());
            }
            (None, Some(owner)) => {
                target.push(owner.sanitized_step());
                target.push(remainder);
            }
            (None, None) => target.push(remainder),
        }
        to_posix(&target)
    }

    /// Normalizes and rewrites a job-input value in place.
    ///
    /// Values that are not Directory values are left alone. Attribute
    /// normalization runs before the path rewrite. Returns true if the
    /// value changed.
    pub fn rewrite_value(&self, input_name: &str, owner: Option<&QualifiedName>, value: &mut Value) -> bool {
        let Some(mut directory) = DirectoryValue::from_value(value) else {
            return false;
        };

        let normalized = directory.normalize(self.attribute);

        let Some(current) = directory.get(self.attribute).map(str::to_string) else {
            return normalized;
        };

        match self.rewrite_path(owner, &current) {
            Some(target) => {
                debug!("Job input '{}': {} -> {}", input_name, current, target);
                directory.set(self.attribute, target);
                true
            }
            None => {
                debug!("Job input '{}': {} left unchanged", input_name, current);
                normalized
            }
        }
    }
}

/// Renders a path without a trailing separator.
fn to_posix(path: &Path) -> String {
    let rendered = path.to_string_lossy().into_owned();
    if rendered.len() > 1 {
        rendered.trim_end_matches('/').to_string()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rewriter() -> PathRewriter {
        PathRewriter::new("/work", "/data/outputs", DirectoryAttribute::Path)
    }

    fn owner(name: &str) -> QualifiedName {
        QualifiedName::parse(name).unwrap()
    }

    #[test]
    fn test_prefix_rewrite_with_step_directory() {
        assert_eq!(
            rewriter().rewrite_path(None, "/work/stepA__0__FileRenaming___outDir/result.tif"),
            Some("/data/outputs/filerenaming/result.tif".to_string())
        );
    }

    #[test]
    fn test_prefix_rewrite_uses_owner() {
        let owner = owner("wf__2__Image_Assembler___outDir");
        assert_eq!(
            rewriter().rewrite_path(Some(&owner), "/work/datasets/BBBC001/raw"),
            Some("/data/outputs/image-assembler/datasets/BBBC001/raw".to_string())
        );
    }

    #[test]
    fn test_prefix_rewrite_without_owner() {
        assert_eq!(
            rewriter().rewrite_path(None, "/work/datasets/images"),
            Some("/data/outputs/datasets/images".to_string())
        );
    }

    #[test]
    fn test_prefix_is_matched_per_component() {
        assert_eq!(rewriter().rewrite_path(None, "/workspace/images"), None);
    }

    #[test]
    fn test_working_root_itself() {
        let owner = owner("wf__0__Montage___outDir");
        assert_eq!(
            rewriter().rewrite_path(Some(&owner), "/work"),
            Some("/data/outputs/montage".to_string())
        );
    }

    #[test]
    fn test_staging_directory_rewritten_wholesale() {
        let owner = owner("wf__1__OmeConverter___outDir");
        assert_eq!(
            rewriter().rewrite_path(Some(&owner), "wf__1__OmeConverter___outDir/nested"),
            Some("/data/outputs/omeconverter".to_string())
        );
    }

    #[test]
    fn test_external_path_unchanged() {
        assert_eq!(rewriter().rewrite_path(None, "/datasets/BBBC001"), None);
    }

    #[test]
    fn test_rewrite_value_normalizes_first() {
        let mut value = json!({"class": "Directory", "location": "/work/wf__0__A___outDir"});
        let changed = rewriter().rewrite_value("wf__0__A___outDir", None, &mut value);

        assert!(changed);
        assert_eq!(value, json!({"class": "Directory", "path": "/data/outputs/a"}));
    }

    #[test]
    fn test_rewrite_value_location_mode() {
        let rewriter = PathRewriter::new("/work", "/data/outputs", DirectoryAttribute::Location);
        let owner = owner("wf__0__A___outDir");
        let mut value = json!({"class": "Directory", "path": "outDir"});

        assert!(rewriter.rewrite_value("wf__0__A___outDir", Some(&owner), &mut value));
        assert_eq!(value, json!({"class": "Directory", "location": "/data/outputs/a"}));
    }

    #[test]
    fn test_rewrite_value_ignores_literals() {
        let mut value = json!(0.5);
        assert!(!rewriter().rewrite_value("threshold", None, &mut value));
        assert_eq!(value, json!(0.5));
    }

    #[test]
    fn test_rewrite_value_external_directory() {
        let mut value = json!({"class": "Directory", "path": "/datasets/BBBC001"});
        assert!(!rewriter().rewrite_value("inpDir", None, &mut value));
        assert_eq!(value["path"], json!("/datasets/BBBC001"));
    }

    #[test]
    fn test_parent_components_left_unchanged() {
        assert_eq!(rewriter().rewrite_path(None, "/work/../etc/secrets"), None);

        let owner = owner("wf__0__A___outDir");
        assert_eq!(rewriter().rewrite_path(Some(&owner), "/work/../../etc"), None);
        assert_eq!(rewriter().rewrite_path(Some(&owner), "wf__0__A___outDir/../x"), None);
    }

    #[test]
    fn test_parent_components_keep_directory_value() {
        let mut value = json!({"class": "Directory", "path": "/work/../etc"});
        assert!(!rewriter().rewrite_value("inpDir", None, &mut value));
        assert_eq!(value["path"], json!("/work/../etc"));
    }

    #[test]
    fn test_backslash_kept_in_file_name() {
        let owner = owner("wf__0__A___outDir");
        assert_eq!(
            rewriter().rewrite_path(Some(&owner), "/work/run\\1/x.tif"),
            Some("/data/outputs/a/run\\1/x.tif".to_string())
        );
    }

    #[test]
    fn test_to_posix() {
        assert_eq!(to_posix(Path::new("/data/outputs/")), "/data/outputs");
        assert_eq!(to_posix(Path::new("/")), "/");
    }
}
