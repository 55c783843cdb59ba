//! Qualified Names
//!
//! The workflow compiler addresses every step and step parameter with a
//! structured string:
//!
//! ```text
//! <workflow>__<ordinal>__<step>[___<param>]
//! ```
//!
//! Dependency references inside step bindings take either the parameter form
//! above or `<workflow>__<ordinal>__<step>/<output>`. This module turns those
//! strings into typed values at the document edges; everything downstream
//! works with [`QualifiedName`] and [`Reference`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::sanitize::sanitize;

/// Separator between workflow, ordinal and step segments.
pub const NODE_SEPARATOR: &str = "__";

/// Separator between a step and one of its parameters.
pub const PARAM_SEPARATOR: &str = "___";

/// Separator between a step and one of its outputs in a dependency reference.
pub const OUTPUT_SEPARATOR: char = '/';

/// Signals that a string is not a qualified name.
///
/// This is expected for literals and externally supplied names; callers
/// treat the input as an ordinary identifier and leave it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{name}' is not a qualified name: {reason}")]
pub struct NotQualifiedName {
    pub name: String,
    pub reason: &'static str,
}

impl NotQualifiedName {
    fn new(name: &str, reason: &'static str) -> Self {
        Self {
            name: name.to_string(),
            reason,
        }
    }
}

/// A step or step-parameter address generated by the workflow compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    /// Name of the (sub-)workflow the step originates from
    pub workflow: String,

    /// Position of the step in its originating workflow
    pub ordinal: u32,

    /// Step name as written by the compiler
    pub step: String,

    /// Parameter name when the address designates a step parameter
    pub param: Option<String>,
}

impl QualifiedName {
    /// Creates a step address.
    pub fn new(workflow: impl Into<String>, ordinal: u32, step: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            ordinal,
            step: step.into(),
            param: None,
        }
    }

    /// Turns a step address into a parameter address.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Parses a qualified name.
    ///
    /// # Example
    ///
    /// ```
    /// use cwl2compute::naming::QualifiedName;
    ///
    /// let name = QualifiedName::parse("wf__1__OmeConverter___inpDir").unwrap();
    /// assert_eq!(name.workflow, "wf");
    /// assert_eq!(name.ordinal, 1);
    /// assert_eq!(name.step, "OmeConverter");
    /// assert_eq!(name.param.as_deref(), Some("inpDir"));
    ///
    /// assert!(QualifiedName::parse("threshold").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, NotQualifiedName> {
        let (node, param) = match name.split_once(PARAM_SEPARATOR) {
            Some((node, param)) => {
                if param.is_empty() {
                    return Err(NotQualifiedName::new(name, "empty parameter name"));
                }
                if param.contains(PARAM_SEPARATOR) {
                    return Err(NotQualifiedName::new(name, "more than one parameter suffix"));
                }
                (node, Some(param))
            }
            None => (name, None),
        };

        let segments: Vec<&str> = node.split(NODE_SEPARATOR).collect();
        let [workflow, ordinal, step] = segments.as_slice() else {
            return Err(NotQualifiedName::new(
                name,
                "expected <workflow>__<ordinal>__<step>",
            ));
        };

        if workflow.is_empty() || step.is_empty() {
            return Err(NotQualifiedName::new(name, "empty workflow or step segment"));
        }

        Ok(Self {
            workflow: workflow.to_string(),
            ordinal: parse_ordinal(name, ordinal)?,
            step: step.to_string(),
            param: param.map(str::to_string),
        })
    }

    /// Returns true when both names address the same step.
    pub fn same_step(&self, other: &QualifiedName) -> bool {
        self.workflow == other.workflow && self.ordinal == other.ordinal && self.step == other.step
    }

    /// Step name in the target platform's alphabet.
    pub fn sanitized_step(&self) -> String {
        sanitize(&self.step)
    }

    /// Identifier used by the target document.
    ///
    /// The ordinal and workflow name are dropped; the parameter suffix is kept.
    pub fn target_id(&self) -> String {
        match &self.param {
            Some(param) => format!("{}{}{}", self.sanitized_step(), PARAM_SEPARATOR, param),
            None => self.sanitized_step(),
        }
    }
}

/// Validates the ordinal segment.
///
/// Only the canonical decimal form is accepted so that formatting a parsed
/// name reproduces it exactly.
fn parse_ordinal(name: &str, segment: &str) -> Result<u32, NotQualifiedName> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NotQualifiedName::new(name, "ordinal is not numeric"));
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return Err(NotQualifiedName::new(name, "ordinal has leading zeros"));
    }
    segment
        .parse()
        .map_err(|_| NotQualifiedName::new(name, "ordinal out of range"))
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.workflow,
            self.ordinal,
            self.step,
            sep = NODE_SEPARATOR
        )?;
        if let Some(param) = &self.param {
            write!(f, "{}{}", PARAM_SEPARATOR, param)?;
        }
        Ok(())
    }
}

impl FromStr for QualifiedName {
    type Err = NotQualifiedName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses a qualified name into its four fields.
pub fn parse(name: &str) -> Result<QualifiedName, NotQualifiedName> {
    QualifiedName::parse(name)
}

/// Formats the four fields of a qualified name. Inverse of [`parse`].
pub fn format(workflow: &str, ordinal: u32, step: &str, param: Option<&str>) -> String {
    let name = QualifiedName::new(workflow, ordinal, step);
    match param {
        Some(param) => name.with_param(param).to_string(),
        None => name.to_string(),
    }
}

/// A dependency reference found in a step binding or an output source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A workflow-level input such as `wf__1__OmeConverter___filePattern`
    Input(QualifiedName),

    /// An output of another step such as `wf__0__FileRenaming/outDir`
    StepOutput { step: QualifiedName, output: String },
}

impl Reference {
    /// Classifies a reference string.
    pub fn parse(value: &str) -> Result<Self, NotQualifiedName> {
        match value.split_once(OUTPUT_SEPARATOR) {
            Some((node, output)) => {
                if output.is_empty() || output.contains(OUTPUT_SEPARATOR) {
                    return Err(NotQualifiedName::new(value, "malformed step output reference"));
                }
                let step = QualifiedName::parse(node)?;
                if step.param.is_some() {
                    return Err(NotQualifiedName::new(value, "output reference on a parameter"));
                }
                Ok(Self::StepOutput {
                    step,
                    output: output.to_string(),
                })
            }
            None => Ok(Self::Input(QualifiedName::parse(value)?)),
        }
    }

    /// Reference string in the target document.
    pub fn renamed(&self) -> String {
        match self {
            Self::Input(name) => name.target_id(),
            Self::StepOutput { step, output } => {
                format!("{}{}{}", step.sanitized_step(), OUTPUT_SEPARATOR, output)
            }
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(name) => write!(f, "{}", name),
            Self::StepOutput { step, output } => write!(f, "{}{}{}", step, OUTPUT_SEPARATOR, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_name() {
        let name = QualifiedName::parse("viz_workflow_BBBC001__0__BbbcDownload").unwrap();
        assert_eq!(name.workflow, "viz_workflow_BBBC001");
        assert_eq!(name.ordinal, 0);
        assert_eq!(name.step, "BbbcDownload");
        assert_eq!(name.param, None);
    }

    #[test]
    fn test_parse_param_name() {
        let name = QualifiedName::parse("stepA__0__FileRenaming___outDir").unwrap();
        assert_eq!(name.step, "FileRenaming");
        assert_eq!(name.param.as_deref(), Some("outDir"));
    }

    #[test]
    fn test_round_trip() {
        let samples = [
            "wf__0__FileRenaming",
            "wf__1__OmeConverter___inpDir",
            "workflow_convert_BBBC001__12__image_assembler___outDir",
            "w__0__s____x",
            "a-b__4294967295__c d",
        ];

        for sample in samples {
            let parsed = QualifiedName::parse(sample).unwrap();
            assert_eq!(parsed.to_string(), sample);
            assert_eq!(
                format(
                    &parsed.workflow,
                    parsed.ordinal,
                    &parsed.step,
                    parsed.param.as_deref()
                ),
                sample
            );
        }
    }

    #[test]
    fn test_not_qualified_names() {
        let samples = [
            "threshold",
            "",
            "wf__0",
            "wf__x__step",
            "wf__-1__step",
            "wf__01__step",
            "wf__0__step__extra",
            "__0__step",
            "wf__0__",
            "wf__0__step___",
            "wf__0__step___a___b",
            "wf__99999999999__step",
            "/data/inputs/images",
        ];

        for sample in samples {
            assert!(
                QualifiedName::parse(sample).is_err(),
                "{:?} should not parse",
                sample
            );
        }
    }

    #[test]
    fn test_not_qualified_name_reason() {
        let err = QualifiedName::parse("wf__abc__step").unwrap_err();
        assert_eq!(err.name, "wf__abc__step");
        assert_eq!(err.reason, "ordinal is not numeric");
    }

    #[test]
    fn test_target_id() {
        let step = QualifiedName::parse("wf__3__Image_Assembler").unwrap();
        assert_eq!(step.target_id(), "image-assembler");

        let param = QualifiedName::parse("wf__3__Image_Assembler___outDir").unwrap();
        assert_eq!(param.target_id(), "image-assembler___outDir");
    }

    #[test]
    fn test_same_step() {
        let step = QualifiedName::parse("wf__0__FileRenaming").unwrap();
        let param = QualifiedName::parse("wf__0__FileRenaming___outDir").unwrap();
        let other = QualifiedName::parse("wf__1__FileRenaming___outDir").unwrap();
        assert!(step.same_step(&param));
        assert!(!step.same_step(&other));
    }

    #[test]
    fn test_reference_step_output() {
        let reference = Reference::parse("wf__0__File_Renaming/outDir").unwrap();
        assert_eq!(reference.renamed(), "file-renaming/outDir");
        assert_eq!(reference.to_string(), "wf__0__File_Renaming/outDir");
    }

    #[test]
    fn test_reference_input() {
        let reference = Reference::parse("wf__1__OmeConverter___filePattern").unwrap();
        assert_eq!(reference.renamed(), "omeconverter___filePattern");
    }

    #[test]
    fn test_reference_rejects_literals() {
        assert!(Reference::parse("outDir").is_err());
        assert!(Reference::parse("/data/outputs/x").is_err());
        assert!(Reference::parse("wf__0__s/").is_err());
        assert!(Reference::parse("wf__0__s/a/b").is_err());
        assert!(Reference::parse("wf__0__s___p/out").is_err());
    }
}
