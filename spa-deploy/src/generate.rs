//! Runtime config files for the app.
//!
//! `inject` resolves the values of each `inject:` entry and writes them to its destination,
//! in a format picked from the file name:
//!
//! - `*.json`: pretty-printed JSON object
//! - `*.yml` / `*.yaml`: YAML mapping
//! - `.env*` / `*.env`: `KEY=value` lines, non-string values as JSON
//! - `*.html` / `*.htm`: `window.__ENV__ = {...}` in the page's env-data script
//!
//! String values may reference `${env:NAME}` and `${func:stage|release|version|region}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use spa_deploy_core::inject::{env_script, inject_html, Injection};
use tracing::{debug, info, warn};

use crate::load_config::InjectSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Env,
    Html,
}

impl OutputFormat {
    pub fn for_destination(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yml" | "yaml") => Ok(Self::Yaml),
            Some("html" | "htm") => Ok(Self::Html),
            _ if file_name.starts_with(".env") || file_name.ends_with(".env") => Ok(Self::Env),
            _ => bail!("Unknown destination file type: {}", path.display()),
        }
    }
}

/// Values available to `${func:...}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Functions {
    pub stage: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub region: Option<String>,
}

impl Functions {
    fn call(&self, name: &str) -> Result<String> {
        let value = match name {
            "stage" => &self.stage,
            "release" => &self.release,
            "version" => &self.version,
            "region" => &self.region,
            other => bail!("Unknown placeholder function '{other}'"),
        };
        value
            .clone()
            .ok_or_else(|| anyhow!("Placeholder ${{func:{name}}} has no value"))
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{(env|func):([A-Za-z0-9_]+)\}").expect("placeholder regex is valid")
    })
}

fn resolve_str(raw: &str, functions: &Functions) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(raw) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&raw[last..whole.start()]);
        out.push_str(&placeholder_value(&caps, functions)?);
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

fn placeholder_value(caps: &Captures<'_>, functions: &Functions) -> Result<String> {
    let name = &caps[2];
    match &caps[1] {
        "env" => std::env::var(name)
            .map_err(|_| anyhow!("Environment variable {name} is not set")),
        _ => functions.call(name),
    }
}

fn resolve_value(value: &mut Value, functions: &Functions) -> Result<()> {
    match value {
        Value::String(raw) => *raw = resolve_str(raw, functions)?,
        Value::Array(items) => {
            for item in items {
                resolve_value(item, functions)?;
            }
        }
        Value::Object(fields) => {
            for field in fields.values_mut() {
                resolve_value(field, functions)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// YAML values as a JSON object with every placeholder substituted.
pub fn resolve_values(
    values: &BTreeMap<String, serde_yaml::Value>,
    functions: &Functions,
) -> Result<Map<String, Value>> {
    let mut resolved = Map::new();
    for (key, raw) in values {
        let mut value = serde_json::to_value(raw)
            .with_context(|| format!("Value of {key} cannot be written as JSON"))?;
        resolve_value(&mut value, functions)?;
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

/// The env-data script for an HTML page: `window.__ENV__ = <json>`.
pub fn html_snippet(data: &Map<String, Value>) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(env_script(&format!(
        "window.__ENV__ = {}",
        json.replace('<', "\\u003c")
    )))
}

/// Render `data` for `format`. HTML output needs the page to inject into as `html`.
pub fn render(format: OutputFormat, data: &Map<String, Value>, html: Option<&str>) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(data)?)),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Env => Ok(data
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}\n"),
                other => format!("{key}={other}\n"),
            })
            .collect()),
        OutputFormat::Html => {
            let html = html.ok_or_else(|| anyhow!("HTML output needs a source page"))?;
            match inject_html(html, &html_snippet(data)?) {
                Injection::Replaced(out) => Ok(out),
                Injection::InsertedBeforeHead(out) => {
                    warn!("Could not find <script id=\"env-data\">, injecting at end of HEAD");
                    Ok(out)
                }
                Injection::MalformedMarker(out) => {
                    warn!("Found <script id=\"env-data\"> but could not replace its contents, injecting at end of HEAD");
                    Ok(out)
                }
                Injection::NoInjectionPoint => bail!("Could not find injection point"),
            }
        }
    }
}

/// Resolve, render and write one `inject:` entry under `pwd`. Returns the written path.
pub fn write_inject_item(item: &InjectSection, pwd: &Path, functions: &Functions) -> Result<PathBuf> {
    if item.destination.as_os_str().is_empty() {
        bail!(
            "Inject target '{}' has no destination",
            item.name.as_deref().unwrap_or("-")
        );
    }
    let destination = pwd.join(&item.destination);
    let format = OutputFormat::for_destination(&destination)?;
    let data = resolve_values(&item.values, functions)?;
    debug!(destination = %destination.display(), ?format, keys = data.len(), "Rendering inject target");

    let source_html = if format == OutputFormat::Html {
        let source = pwd.join(item.source.as_ref().unwrap_or(&item.destination));
        let html = fs::read_to_string(&source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        Some(html)
    } else {
        None
    };
    let rendered = render(format, &data, source_html.as_deref())
        .with_context(|| format!("Failed to render {}", destination.display()))?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&destination, rendered)
        .with_context(|| format!("Failed to write {}", destination.display()))?;
    info!(destination = %destination.display(), "Wrote runtime config");
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn functions() -> Functions {
        Functions {
            stage: Some("myapp-dev".into()),
            release: Some("xxxxxxxxx".into()),
            version: Some("myapp-dev-1.2.0".into()),
            region: None,
        }
    }

    fn values(yaml: &str) -> BTreeMap<String, serde_yaml::Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn format_follows_the_file_name() {
        let format = |p: &str| OutputFormat::for_destination(Path::new(p));
        assert_eq!(format("public/env.json").unwrap(), OutputFormat::Json);
        assert_eq!(format("conf.YML").unwrap(), OutputFormat::Yaml);
        assert_eq!(format("conf.yaml").unwrap(), OutputFormat::Yaml);
        assert_eq!(format(".env").unwrap(), OutputFormat::Env);
        assert_eq!(format(".env.local").unwrap(), OutputFormat::Env);
        assert_eq!(format("prod.env").unwrap(), OutputFormat::Env);
        assert_eq!(format("dist/index.html").unwrap(), OutputFormat::Html);
        let err = format("env.toml").unwrap_err();
        assert!(err.to_string().contains("Unknown destination file type"));
    }

    #[test]
    fn placeholders_resolve_functions_inside_strings() {
        let data = resolve_values(
            &values("APP_STAGE: ${func:stage}\nLABEL: build ${func:release} of ${func:stage}\nRETRIES: 3\n"),
            &functions(),
        )
        .unwrap();
        assert_eq!(data["APP_STAGE"], "myapp-dev");
        assert_eq!(data["LABEL"], "build xxxxxxxxx of myapp-dev");
        assert_eq!(data["RETRIES"], 3);
    }

    #[test]
    fn unset_function_or_unknown_name_is_an_error() {
        let err = resolve_values(&values("R: ${func:region}\n"), &functions()).unwrap_err();
        assert!(err.to_string().contains("${func:region}"));
        let err = resolve_values(&values("X: ${func:nope}\n"), &functions()).unwrap_err();
        assert!(err.to_string().contains("Unknown placeholder function 'nope'"));
    }

    #[test]
    fn env_lines_keep_strings_raw_and_json_encode_the_rest() {
        let data = resolve_values(
            &values("APP_RELEASE: ${func:release}\nAPP_STAGE: ${func:stage}\nFLAGS: [a, b]\nON: true\n"),
            &functions(),
        )
        .unwrap();
        assert_eq!(
            render(OutputFormat::Env, &data, None).unwrap(),
            "APP_RELEASE=xxxxxxxxx\nAPP_STAGE=myapp-dev\nFLAGS=[\"a\",\"b\"]\nON=true\n"
        );
    }

    #[test]
    fn json_and_yaml_are_key_sorted_objects() {
        let data = resolve_values(&values("B: 2\nA: one\n"), &functions()).unwrap();
        assert_eq!(
            render(OutputFormat::Json, &data, None).unwrap(),
            "{\n  \"A\": \"one\",\n  \"B\": 2\n}\n"
        );
        assert_eq!(render(OutputFormat::Yaml, &data, None).unwrap(), "A: one\nB: 2\n");
    }

    #[test]
    fn html_output_replaces_the_env_script_and_escapes_tags() {
        let data = resolve_values(&values("X: </script>\n"), &functions()).unwrap();
        let page = r#"<head><script id="env-data"></script></head>"#;
        let out = render(OutputFormat::Html, &data, Some(page)).unwrap();
        assert_eq!(
            out,
            r#"<head><script id="env-data">window.__ENV__ = {"X":"\u003c/script>"}</script></head>"#
        );
        assert!(render(OutputFormat::Html, &data, Some("<body></body>")).is_err());
    }

    #[test]
    fn writes_destination_under_pwd_creating_directories() {
        let dir = tempdir().unwrap();
        let item = InjectSection {
            name: Some("web".into()),
            destination: PathBuf::from("public/config/.env"),
            source: None,
            values: values("APP_STAGE: ${func:stage}\n"),
        };

        let written = write_inject_item(&item, dir.path(), &functions()).unwrap();
        assert_eq!(written, dir.path().join("public/config/.env"));
        assert_eq!(fs::read_to_string(written).unwrap(), "APP_STAGE=myapp-dev\n");
    }

    #[test]
    fn html_item_reads_its_source_and_writes_the_destination() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.html"), "<head></head>").unwrap();
        let item = InjectSection {
            name: None,
            destination: PathBuf::from("dist/index.html"),
            source: Some(PathBuf::from("src/index.html")),
            values: values("A: b\n"),
        };

        write_inject_item(&item, dir.path(), &functions()).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/index.html")).unwrap(),
            r#"<head><script id="env-data">window.__ENV__ = {"A":"b"}</script></head>"#
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("src/index.html")).unwrap(),
            "<head></head>"
        );
    }

    #[test]
    fn missing_destination_is_an_error() {
        let dir = tempdir().unwrap();
        let err = write_inject_item(&InjectSection::default(), dir.path(), &functions()).unwrap_err();
        assert!(err.to_string().contains("has no destination"));
    }
}
