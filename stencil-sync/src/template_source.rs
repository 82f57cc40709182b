//! Where a template's skeleton files live.

use serde_json::Value;
use stencil_core::Entity;
use stencil_vcs::VcsProviderRegistry;

/// Scaffolder action that copies the skeleton into the new repository.
pub const FETCH_TEMPLATE_ACTION: &str = "fetch:template";

/// `input.url` of the first `fetch:template` step in `spec.steps`, as written.
pub fn fetch_step_url(template: &Entity) -> Option<&str> {
    template
        .spec
        .get("steps")?
        .as_array()?
        .iter()
        .filter(|step| step.get("action").and_then(Value::as_str) == Some(FETCH_TEMPLATE_ACTION))
        .find_map(|step| {
            step.get("input")?
                .get("url")?
                .as_str()
                .map(str::trim)
                .filter(|url| !url.is_empty())
        })
}

/// Absolute skeleton URL for `template`.
///
/// Relative `./x` (or `.`) URLs are joined onto the template entity's own
/// repository URL, with at most one trailing slash trimmed from it first.
pub fn extract_template_source_url(
    template: &Entity,
    registry: &VcsProviderRegistry,
) -> Option<String> {
    let url = fetch_step_url(template)?;
    let relative = match url {
        "." | "./" => "",
        _ => match url.strip_prefix("./") {
            Some(rest) => rest,
            None => return Some(url.to_string()),
        },
    };
    let provider = registry.provider_for_entity(template)?;
    let base = provider.extract_repo_url(template)?;
    let base = base.strip_suffix('/').unwrap_or(&base);
    if relative.is_empty() {
        Some(base.to_string())
    } else {
        Some(format!("{base}/{relative}"))
    }
}
