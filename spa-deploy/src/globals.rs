//! Runtime globals injected into the app's index pages.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn bare_version() -> &'static Regex {
    static BARE: OnceLock<Regex> = OnceLock::new();
    BARE.get_or_init(|| Regex::new(r"^[\d.]+$").expect("version regex is valid"))
}

/// `APP_VERSION` for a deploy: `<stage>-<release>` when no version is given, `<stage>-<version>`
/// for a bare semver such as `1.4.2`, and the version unchanged otherwise.
pub fn app_version(stage: &str, release: &str, version: Option<&str>) -> String {
    match version.filter(|v| !v.is_empty()) {
        None => format!("{stage}-{release}"),
        Some(v) if bare_version().is_match(v) => format!("{stage}-{v}"),
        Some(v) => v.to_string(),
    }
}

/// Configured globals plus `APP_STAGE`, `APP_VERSION` and `APP_RELEASE`, which always win.
pub fn app_globals(
    configured: BTreeMap<String, String>,
    stage: &str,
    release: &str,
    version: Option<&str>,
) -> BTreeMap<String, String> {
    let mut globals = configured;
    globals.insert("APP_STAGE".to_string(), stage.to_string());
    globals.insert(
        "APP_VERSION".to_string(),
        app_version(stage, release, version),
    );
    globals.insert("APP_RELEASE".to_string(), release.to_string());
    globals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_defaults_to_stage_and_release() {
        assert_eq!(app_version("prod", "abc123", None), "prod-abc123");
        assert_eq!(app_version("prod", "abc123", Some("")), "prod-abc123");
    }

    #[test]
    fn bare_semver_gets_the_stage_prefix() {
        assert_eq!(app_version("prod", "abc123", Some("1.4.2")), "prod-1.4.2");
        assert_eq!(app_version("prod", "abc123", Some("v1.4.2")), "v1.4.2");
    }

    #[test]
    fn builtin_globals_override_configured_ones() {
        let mut configured = BTreeMap::new();
        configured.insert("API_URL".to_string(), "https://api".to_string());
        configured.insert("APP_STAGE".to_string(), "ignored".to_string());

        let globals = app_globals(configured, "test", "sha", Some("2.0"));

        assert_eq!(globals["API_URL"], "https://api");
        assert_eq!(globals["APP_STAGE"], "test");
        assert_eq!(globals["APP_VERSION"], "test-2.0");
        assert_eq!(globals["APP_RELEASE"], "sha");
    }
}
