//! Template placeholders: detection, substitution and value inference.
//!
//! A placeholder is `{{ expr }}` or `${{ expr }}`. Its key is `expr` up to the
//! first `|` (filters are ignored), trimmed, with a leading `values.` dropped,
//! so `${{ values.name | lower }}` and `{{name}}` share the key `name`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use similar::{DiffOp, TextDiff};
use stencil_core::Entity;

const VALUES_PREFIX: &str = "values.";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

/// Canonical variable key for a placeholder expression.
pub fn canonical_key(expr: &str) -> String {
    let head = expr.split('|').next().unwrap_or_default().trim();
    head.strip_prefix(VALUES_PREFIX).unwrap_or(head).trim().to_string()
}

/// Keys of every placeholder in `text`, in order of appearance.
pub fn placeholder_keys(text: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(text)
        .map(|caps| canonical_key(&caps[1]))
        .collect()
}

// ---------------------------------------------------------------------------
// TemplateVariables
// ---------------------------------------------------------------------------

/// Variable values keyed by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    values: BTreeMap<String, String>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values known from the target entity's metadata: `name`, `component_id`,
    /// `title`, `description`, `owner`, `system`, plus `spec.templateValues`.
    pub fn from_entity(entity: &Entity) -> Self {
        let mut vars = Self::new();
        vars.insert("name", &entity.metadata.name);
        vars.insert("component_id", &entity.metadata.name);
        if let Some(title) = &entity.metadata.title {
            vars.insert("title", title);
        }
        if let Some(description) = &entity.metadata.description {
            vars.insert("description", description);
        }
        if let Some(owner) = entity.owner() {
            vars.insert("owner", owner);
        }
        if let Some(system) = entity.spec_str("system") {
            vars.insert("system", system);
        }
        if let Some(Value::Object(map)) = entity.spec.get("templateValues") {
            for (key, value) in map {
                match value {
                    Value::String(s) => vars.insert(key, s),
                    Value::Number(n) => vars.insert(key, &n.to_string()),
                    Value::Bool(b) => vars.insert(key, &b.to_string()),
                    _ => {}
                }
            }
        }
        vars
    }

    /// Set `key`, replacing any previous value. Blank values are ignored.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = canonical_key(key);
        if key.is_empty() || value.trim().is_empty() {
            return;
        }
        self.values.insert(key, value.to_string());
    }

    /// Set `key` only if it has no value yet.
    fn observe(&mut self, key: String, value: &str) {
        if key.is_empty() || value.trim().is_empty() {
            return;
        }
        self.values.entry(key).or_insert_with(|| value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&canonical_key(key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `self` with gaps filled from `fallback`; existing values win.
    pub fn or(mut self, fallback: &TemplateVariables) -> Self {
        for (key, value) in &fallback.values {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Replace every placeholder with a known value; unknown ones stay literal.
pub fn substitute(text: &str, vars: &TemplateVariables) -> String {
    placeholder_re()
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// Anchored matcher for one template line: literal text escaped, each
/// placeholder a lazy capture. `None` for lines without placeholders.
fn line_matcher(line: &str) -> Option<(Regex, Vec<String>)> {
    let mut pattern = String::from("^");
    let mut keys = Vec::new();
    let mut last = 0;
    for caps in placeholder_re().captures_iter(line) {
        let whole = caps.get(0)?;
        pattern.push_str(&regex::escape(&line[last..whole.start()]));
        pattern.push_str("(.*?)");
        keys.push(canonical_key(&caps[1]));
        last = whole.end();
    }
    if keys.is_empty() {
        return None;
    }
    pattern.push_str(&regex::escape(&line[last..]));
    pattern.push('$');
    Regex::new(&pattern).ok().map(|re| (re, keys))
}

fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Values the target appears to have substituted for the template's placeholders.
///
/// Lines are aligned with a line diff. Inside each replaced hunk the i-th
/// template line is paired with the i-th target line; a full match of the
/// template line's pattern assigns the captures to its keys. The first value
/// observed for a key wins.
pub fn infer(template: &str, target: &str) -> TemplateVariables {
    let diff = TextDiff::from_lines(template, target);
    let old = diff.old_slices();
    let new = diff.new_slices();
    let mut vars = TemplateVariables::new();

    let mut pair = |old_range: std::ops::Range<usize>, new_range: std::ops::Range<usize>| {
        for (t, a) in old_range.zip(new_range) {
            let (Some(template_line), Some(target_line)) = (old.get(t), new.get(a)) else {
                continue;
            };
            let Some((re, keys)) = line_matcher(strip_newline(template_line)) else {
                continue;
            };
            let Some(caps) = re.captures(strip_newline(target_line)) else {
                continue;
            };
            for (i, key) in keys.into_iter().enumerate() {
                if let Some(value) = caps.get(i + 1) {
                    vars.observe(key, value.as_str());
                }
            }
        }
    };

    let ops = diff.ops();
    let mut i = 0;
    while i < ops.len() {
        match ops[i] {
            DiffOp::Replace { .. } => {
                pair(ops[i].old_range(), ops[i].new_range());
            }
            DiffOp::Delete { .. } => {
                if let Some(next @ DiffOp::Insert { .. }) = ops.get(i + 1) {
                    pair(ops[i].old_range(), next.new_range());
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    vars
}
