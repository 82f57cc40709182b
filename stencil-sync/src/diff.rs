//! Template-vs-target drift detection.
//!
//! For every path present in both snapshots the template content is
//! preprocessed (placeholders filled from values observed in the target, then
//! from known entity values) and its SHA-256 digest compared with the target's.
//! Both sides are CRLF→LF normalised first, so line-ending churn never counts
//! as drift.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::{DiffOp, TextDiff};
use stencil_core::{FileChange, FileChangeSet, FileSnapshot};

use crate::variables::{infer, substitute, TemplateVariables};

/// Knobs for [`TemplateDiffEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Propose template files the target lacks. Target-only files are never
    /// proposed for deletion.
    pub include_new_files: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDiffEngine {
    options: DiffOptions,
}

/// Paths present in both snapshots, sorted.
pub fn find_common_files(template: &FileSnapshot, target: &FileSnapshot) -> Vec<String> {
    template
        .paths()
        .filter(|path| target.contains(path))
        .map(str::to_string)
        .collect()
}

pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Hex SHA-256 of the line-ending-normalised text.
pub fn content_digest(text: &str) -> String {
    let mut h = Sha256::new();
    h.update(normalize_line_endings(text).as_bytes());
    hex::encode(h.finalize())
}

/// Template content with placeholders resolved against `target` (if any)
/// and then `known`.
///
/// Template lines the line diff pairs as equal with the target are kept
/// verbatim, so a target that kept a placeholder literally is not rewritten.
pub fn preprocess(template: &str, target: Option<&str>, known: &TemplateVariables) -> String {
    let Some(target) = target else {
        return substitute(template, known);
    };
    let template = normalize_line_endings(template);
    let target = normalize_line_endings(target);
    let vars = infer(&template, &target).or(known);

    let diff = TextDiff::from_lines(&*template, &*target);
    let lines = diff.old_slices();
    let mut expected = String::with_capacity(template.len());
    for op in diff.ops() {
        let verbatim = matches!(op, DiffOp::Equal { .. });
        for line in lines.get(op.old_range()).unwrap_or_default() {
            if verbatim {
                expected.push_str(line);
            } else {
                expected.push_str(&substitute(line, &vars));
            }
        }
    }
    expected
}

impl TemplateDiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DiffOptions {
        self.options
    }

    /// Files whose preprocessed template content differs from the target.
    ///
    /// An empty result means the target is in sync.
    pub fn compare(
        &self,
        template: &FileSnapshot,
        target: &FileSnapshot,
        known: &TemplateVariables,
    ) -> FileChangeSet {
        let mut changes = FileChangeSet::new();

        for path in find_common_files(template, target) {
            let (Some(template_content), Some(target_content)) =
                (template.get(&path), target.get(&path))
            else {
                continue;
            };
            let expected = preprocess(template_content, Some(target_content), known);
            if content_digest(&expected) != content_digest(target_content) {
                tracing::debug!(%path, "template drift");
                changes.insert(path, FileChange::Update(expected));
            }
        }

        if self.options.include_new_files {
            for (path, content) in template.iter().filter(|(p, _)| !target.contains(p)) {
                tracing::debug!(%path, "template file missing from target");
                changes.insert(path, FileChange::Create(preprocess(content, None, known)));
            }
        }

        changes
    }
}

/// Unified diff from `current` to `proposed`, headed `a/<path>` / `b/<path>`.
pub fn unified_diff(path: &str, current: &str, proposed: &str) -> String {
    let current = normalize_line_endings(current);
    let proposed = normalize_line_endings(proposed);
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    TextDiff::from_lines(&*current, &*proposed)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}
