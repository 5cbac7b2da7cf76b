//! Post-login redirect confinement.

use feedback_auth::{AuthError, AuthResult};

/// Resolve a requested post-login redirect against `base_url`.
///
/// Accepted values:
/// - empty, meaning the site root;
/// - absolute URLs on the site (`base_url` itself or below it);
/// - site-relative paths such as `/posts/1`.
///
/// Anything else, including protocol-relative `//host` paths, is rejected as
/// a forged request.
pub fn confine_redirect(base_url: &str, requested: Option<&str>) -> AuthResult<String> {
    let base = base_url.trim_end_matches('/');
    let requested = requested.map(str::trim).unwrap_or_default();

    if requested.is_empty() {
        return Ok(base.to_string());
    }

    if requested == base
        || requested
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
    {
        return Ok(requested.to_string());
    }

    if requested.starts_with('/') && !requested.starts_with("//") && !requested.starts_with("/\\") {
        return Ok(format!("{base}{requested}"));
    }

    Err(AuthError::ForgedRequest(format!(
        "redirect outside the site: {requested}"
    )))
}
