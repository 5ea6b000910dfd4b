//! Runtime globals injection into HTML entry points.
//!
//! Index pages of a static SPA are built once and deployed to several stages; the
//! stage-specific values are written into a `<script id="env-data">` tag at deploy time.
//! The rewritten page is uploaded from memory and its hash is compared against the
//! remote etag again so an identical page is not uploaded twice.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::InjectError;
use crate::glob::GlobList;
use crate::plan::{SyncAction, SyncPlan, CACHE_CONTROL_UNCACHED};
use crate::scan::bytes_md5;

const MARKER_OPEN: &str = r#"<script id="env-data">"#;
const HEAD_CLOSE: &str = "</head>";

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r#"<script id="env-data">[^<]*</script>"#).expect("marker regex is valid")
    })
}

/// Where the snippet ended up in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// An existing `env-data` script was rewritten.
    Replaced(String),
    /// No marker; the script was added right before `</head>`.
    InsertedBeforeHead(String),
    /// A marker exists but its body contains markup, so it was left alone and the
    /// script was added right before `</head>`.
    MalformedMarker(String),
    /// Neither a marker nor `</head>` was found.
    NoInjectionPoint,
}

/// Outcome of [`inject_env`] over a whole plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectReport {
    pub injected: Vec<String>,
    pub skipped: Vec<String>,
    /// Keys whose rewritten content already matched the remote object.
    pub unchanged: Vec<String>,
}

/// `<script id="env-data">window.K='V';...</script>` for the given globals.
pub fn env_snippet(env: &BTreeMap<String, String>) -> String {
    let assignments = env
        .iter()
        .map(|(key, value)| format!("window.{key}='{}'", escape_js(value)))
        .collect::<Vec<_>>()
        .join(";");
    env_script(&assignments)
}

/// Wraps `body` in the env-data script tag. `body` must not contain `<`, otherwise the
/// tag cannot be found and replaced on the next injection.
pub fn env_script(body: &str) -> String {
    format!("{MARKER_OPEN}{body}</script>")
}

/// Escape for a single-quoted JS string inside an HTML script tag.
fn escape_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '<' => out.push_str("\\x3c"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Put `snippet` into `html`, replacing an existing marker or falling back to `</head>`.
pub fn inject_html(html: &str, snippet: &str) -> Injection {
    let has_marker = html.contains(MARKER_OPEN);
    if has_marker {
        if let Some(found) = marker_regex().find(html) {
            let mut out = String::with_capacity(html.len() + snippet.len());
            out.push_str(&html[..found.start()]);
            out.push_str(snippet);
            out.push_str(&html[found.end()..]);
            return Injection::Replaced(out);
        }
    }
    if !html.contains(HEAD_CLOSE) {
        return Injection::NoInjectionPoint;
    }
    let inserted = html.replacen(HEAD_CLOSE, &format!("{snippet}{HEAD_CLOSE}"), 1);
    if has_marker {
        Injection::MalformedMarker(inserted)
    } else {
        Injection::InsertedBeforeHead(inserted)
    }
}

/// Inject `env` into every plan item matching `index_glob`.
///
/// Processed items are served uncached and uploaded from memory. When not forced, an
/// `Update` whose new content matches the remote etag becomes `Unchanged`, and an
/// `Unchanged` whose new content differs becomes an `Update`.
pub fn inject_env(
    plan: &mut SyncPlan,
    index_glob: &GlobList,
    env: &BTreeMap<String, String>,
    force: bool,
) -> Result<InjectReport, InjectError> {
    let mut report = InjectReport::default();
    if index_glob.is_empty() {
        return Ok(report);
    }
    let snippet = env_snippet(env);

    for item in plan.items.iter_mut() {
        if !index_glob.is_match(&item.key) {
            continue;
        }
        let Some(local) = &item.local else {
            continue;
        };

        let bytes = std::fs::read(&local.path).map_err(|source| InjectError {
            path: local.path.clone(),
            source,
        })?;
        let Ok(html) = String::from_utf8(bytes) else {
            warn!(key = %item.key, "Index file is not valid UTF-8, uploading it as is");
            report.skipped.push(item.key.clone());
            continue;
        };

        let data = match inject_html(&html, &snippet) {
            Injection::Replaced(data) => data,
            Injection::InsertedBeforeHead(data) => {
                warn!(
                    key = %item.key,
                    "Could not find <script id=\"env-data\">, injecting at end of HEAD"
                );
                data
            }
            Injection::MalformedMarker(data) => {
                warn!(
                    key = %item.key,
                    "Found <script id=\"env-data\"> but could not replace its contents, injecting at end of HEAD"
                );
                data
            }
            Injection::NoInjectionPoint => {
                warn!(key = %item.key, "Could not find injection point");
                report.skipped.push(item.key.clone());
                continue;
            }
        };

        let data_hash = bytes_md5(data.as_bytes());
        item.cache = false;
        item.cache_control = Some(CACHE_CONTROL_UNCACHED.to_string());
        item.data = Some(data.into_bytes());

        if !force {
            if let Some(remote) = &item.remote {
                let matches_remote = remote.etag == data_hash;
                let action = item.action;
                match action {
                    SyncAction::Update if matches_remote => {
                        item.action = SyncAction::Unchanged;
                        item.invalidate = false;
                        report.unchanged.push(item.key.clone());
                    }
                    SyncAction::Unchanged if !matches_remote => {
                        item.action = SyncAction::Update;
                        item.invalidate = true;
                    }
                    _ => {}
                }
            }
        }
        item.data_hash = Some(data_hash);

        info!(key = %item.key, action = %item.action, "Injected globals");
        report.injected.push(item.key.clone());
    }

    Ok(report)
}
