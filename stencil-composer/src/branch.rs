//! Branch naming for template-upgrade pull requests.

use stencil_core::TemplateInfo;

/// Used when the component name sanitizes to nothing.
const FALLBACK_COMPONENT: &str = "template-sync";

/// Make `input` safe for a git branch segment.
///
/// Lowercases, replaces every character outside `[a-z0-9._-]` with `-`,
/// collapses runs of dots into one, then trims leading/trailing `.` and `-`.
pub fn sanitize_for_branch(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.to_lowercase().chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => ch,
            _ => '-',
        };
        if mapped == '.' && out.ends_with('.') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches(|c| c == '.' || c == '-').to_string()
}

/// `<component>/template-upgrade-v<current version>`.
pub fn branch_name(info: &TemplateInfo) -> String {
    let component = sanitize_for_branch(&info.component_name);
    let component = if component.is_empty() {
        FALLBACK_COMPONENT.to_string()
    } else {
        component
    };
    format!(
        "{component}/template-upgrade-v{}",
        sanitize_for_branch(&info.current_version)
    )
}
