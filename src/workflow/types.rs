//! Runtime step model, payload specifications and typed step results.
//!
//! Payloads travel through resolution as untyped JSON. Each handler decodes
//! its own spec ([`VarSpec`], [`ObjectSpec`], [`ChartSpec`]) when the step
//! runs, so a malformed payload fails that step only.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::constants::{DEFAULT_CHART_TIMEOUT, DEFAULT_MAX_HISTORY, HELM_TIMEOUT_GRACE};

/// Kind of a step. Unrecognized tags are kept so that the engine can report
/// them instead of failing at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Object,
    Chart,
    Var,
    Unknown(String),
}

impl StepType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Object => "object",
            Self::Chart => "chart",
            Self::Var => "var",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for StepType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "object" => Self::Object,
            "chart" => Self::Chart,
            "var" => Self::Var,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<&str> for StepType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        step_type.as_str().to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved step, ready for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Value>,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: StepType, with: Option<Value>) -> Self {
        Self {
            id: id.into(),
            step_type,
            skip: false,
            with,
        }
    }

    /// SHA-256 of the canonical JSON payload as `sha256:<hex>`, or an empty
    /// string when the step has no payload.
    ///
    /// Object keys serialize sorted, so equal payloads always share a digest.
    #[must_use]
    pub fn digest(&self) -> String {
        let Some(with) = self.with.as_ref().filter(|w| !w.is_null()) else {
            return String::new();
        };
        match serde_json::to_vec(with) {
            Ok(bytes) => format!("sha256:{}", hex::encode(Sha256::digest(bytes))),
            Err(e) => {
                tracing::warn!("Failed to serialize payload of step '{}' for hashing: {}", self.id, e);
                String::new()
            }
        }
    }
}

/// What a run does to the cluster. `Create` and `Update` both mean
/// "ensure present" and take the same install-or-upgrade path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operation {
    #[default]
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// `name`/`namespace` reference inside a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Payload of a `var` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFromSource>,
}

/// Object field lookup of a `var` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFromSource {
    pub api_version: String,
    pub kind: String,
    pub metadata: Reference,
    #[serde(default)]
    pub selector: String,
}

/// Payload of an `object` step: type and identity, plus every other
/// top-level field as the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSpec {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// `metadata` as written, including labels and annotations.
    pub metadata: Map<String, Value>,
    /// Top-level fields other than `apiVersion`, `kind` and `metadata`.
    pub body: Map<String, Value>,
}

impl ObjectSpec {
    /// Split a manifest into identity and body.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a mapping or when
    /// `apiVersion`, `kind` or `metadata.name` is missing.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(map) = value.as_object() else {
            anyhow::bail!("object payload must be a mapping");
        };

        let field = |key: &str| {
            map.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
        };
        let api_version =
            field("apiVersion").ok_or_else(|| anyhow::anyhow!("missing apiVersion"))?.to_string();
        let kind = field("kind").ok_or_else(|| anyhow::anyhow!("missing kind"))?.to_string();

        let metadata = match map.get("metadata") {
            Some(Value::Object(m)) => m.clone(),
            Some(_) => anyhow::bail!("metadata must be a mapping"),
            None => Map::new(),
        };
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing metadata.name"))?
            .to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let body = map
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "apiVersion" | "kind" | "metadata"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            metadata,
            body,
        })
    }
}

/// Payload of a `chart` step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Chart repository URL; `oci://` repositories are supported.
    #[serde(default)]
    pub repository: Option<String>,
    /// Chart name within the repository.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Direct URL of a packaged chart; takes precedence over repository/name.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub release_name: Option<String>,
    /// Overrides the namespace of the run for this release.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub max_history: Option<u32>,
    #[serde(default)]
    pub skip_create_namespace: bool,
    #[serde(default)]
    pub wait: bool,
    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub values: Option<Map<String, Value>>,
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

impl ChartSpec {
    /// Fill in the timeout and history defaults.
    pub fn set_defaults(&mut self) {
        if self.timeout.is_none() {
            self.timeout = Some(DEFAULT_CHART_TIMEOUT);
        }
        if self.max_history.is_none() {
            self.max_history = Some(DEFAULT_MAX_HISTORY);
        }
    }

    /// Release name: explicit, then the chart name of a repository chart,
    /// then a name derived from the package URL, then the bare chart name.
    #[must_use]
    pub fn resolved_release_name(&self) -> Option<String> {
        if let Some(name) = non_empty(&self.release_name) {
            return Some(name.to_string());
        }
        let name = non_empty(&self.name);
        if non_empty(&self.repository).is_some()
            && let Some(name) = name
        {
            return Some(name.to_string());
        }
        non_empty(&self.url)
            .map(derive_release_name)
            .filter(|n| !n.is_empty())
            .or_else(|| name.map(str::to_string))
    }

    /// Chart reference passed to the release manager, with the repository
    /// to search when the reference is a plain chart name.
    #[must_use]
    pub fn chart_reference(&self) -> Option<(String, Option<String>)> {
        if let Some(url) = non_empty(&self.url) {
            return Some((url.to_string(), None));
        }
        let name = non_empty(&self.name)?;
        match non_empty(&self.repository) {
            Some(repo) if repo.starts_with("oci://") => {
                Some((format!("{}/{}", repo.trim_end_matches('/'), name), None))
            }
            Some(repo) => Some((name.to_string(), Some(repo.to_string()))),
            None => Some((name.to_string(), None)),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Release name derived from a chart package URL: the last path segment
/// without `.tgz` and without a trailing `-<version>`.
///
/// ```
/// use krateoctl::workflow::types::derive_release_name;
///
/// assert_eq!(derive_release_name("https://x/charts/foo-1.2.3.tgz"), "foo");
/// assert_eq!(derive_release_name("mychart.tgz"), "mychart");
/// ```
#[must_use]
pub fn derive_release_name(url: &str) -> String {
    let base = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    let stem = base.strip_suffix(".tgz").unwrap_or(base);

    match stem.rfind('-') {
        Some(idx) if idx > 0 && stem[idx + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
            stem[..idx].to_string()
        }
        _ => stem.to_string(),
    }
}

/// Parse a duration such as `5m`, `1h30m`, `90s`, `500ms` or a bare number
/// of seconds.
///
/// # Errors
///
/// Returns an error for an empty string, an unknown unit, a missing number
/// or a total that does not fit in a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("empty duration");
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let segment = Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)")?;
    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in segment.captures_iter(input) {
        let (Some(whole), Some(amount), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() != consumed {
            break;
        }
        let amount: f64 = amount
            .as_str()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid duration '{input}'"))?;
        let seconds = match unit.as_str() {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            _ => 0.001,
        };
        total = Duration::try_from_secs_f64(amount * seconds)
            .ok()
            .and_then(|segment| total.checked_add(segment))
            .ok_or_else(|| anyhow::anyhow!("duration '{input}' is out of range"))?;
        consumed = whole.end();
    }
    if consumed != input.len() {
        anyhow::bail!("invalid duration '{input}': expected segments like 5m, 1h30m or 500ms");
    }
    Ok(total)
}

fn deserialize_timeout<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let timeout = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timeout {n}")))?,
        Some(Value::String(s)) => parse_duration(&s).map_err(serde::de::Error::custom)?,
        Some(other) => return Err(serde::de::Error::custom(format!("invalid timeout {other}"))),
    };
    // the process timeout adds a grace period on top of helm's own
    if timeout.checked_add(HELM_TIMEOUT_GRACE).is_none() {
        return Err(serde::de::Error::custom(format!("timeout {}s is out of range", timeout.as_secs())));
    }
    Ok(Some(timeout))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VarResult {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResult {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub operation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResult {
    pub release_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub app_version: String,
    pub namespace: String,
    pub status: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

/// Typed result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Var(VarResult),
    Object(ObjectResult),
    Chart(ChartResult),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_type_round_trip() {
        assert_eq!(StepType::from("chart"), StepType::Chart);
        assert_eq!(StepType::from("script"), StepType::Unknown("script".to_string()));
        assert_eq!(String::from(StepType::Var), "var");
        assert_eq!(StepType::Unknown("script".to_string()).to_string(), "script");
    }

    #[test]
    fn test_digest() {
        let a = Step::new("a", StepType::Var, Some(json!({"name": "A", "value": "1"})));
        let b = Step::new("b", StepType::Var, Some(json!({"value": "1", "name": "A"})));
        let c = Step::new("c", StepType::Var, Some(json!({"name": "A", "value": "2"})));

        assert!(a.digest().starts_with("sha256:"));
        assert_eq!(a.digest().len(), 7 + 64);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(Step::new("d", StepType::Var, None).digest(), "");
    }

    #[test]
    fn test_step_serialization_omits_false_skip() {
        let step = Step::new("a", StepType::Object, None);
        let yaml = serde_yaml::to_string(&step).unwrap();
        assert!(!yaml.contains("skip"));

        let mut skipped = step;
        skipped.skip = true;
        assert!(serde_yaml::to_string(&skipped).unwrap().contains("skip: true"));
    }

    #[test]
    fn test_derive_release_name() {
        assert_eq!(derive_release_name("https://example.com/charts/foo-1.2.3.tgz"), "foo");
        assert_eq!(derive_release_name("mychart.tgz"), "mychart");
        assert_eq!(derive_release_name("https://x/my-cool-chart-2.0.0.tgz"), "my-cool-chart");
        assert_eq!(derive_release_name("https://x/krateo-bff-0.18.1.tgz"), "krateo-bff");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("120").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        let huge = format!("{}h", "9".repeat(400));
        let err = parse_duration(&huge).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        let overflow = format!("{}s{}s", u64::MAX, u64::MAX);
        assert!(parse_duration(&overflow).is_err());
    }

    #[test]
    fn test_chart_timeout_out_of_range_is_a_decode_error() {
        let result = serde_json::from_value::<ChartSpec>(json!({"name": "a", "timeout": u64::MAX}));
        assert!(result.unwrap_err().to_string().contains("out of range"));

        let result = serde_json::from_value::<ChartSpec>(json!({"name": "a", "timeout": format!("{}h", "9".repeat(400))}));
        assert!(result.is_err());
    }

    #[test]
    fn test_chart_spec_defaults_and_timeout() {
        let mut spec: ChartSpec =
            serde_json::from_value(json!({"url": "https://x/foo-1.0.0.tgz", "timeout": "10m"})).unwrap();
        spec.set_defaults();
        assert_eq!(spec.timeout, Some(Duration::from_secs(600)));
        assert_eq!(spec.max_history, Some(DEFAULT_MAX_HISTORY));

        let mut spec: ChartSpec = serde_json::from_value(json!({"name": "a", "timeout": 30})).unwrap();
        spec.set_defaults();
        assert_eq!(spec.timeout, Some(Duration::from_secs(30)));

        let mut spec = ChartSpec::default();
        spec.set_defaults();
        assert_eq!(spec.timeout, Some(DEFAULT_CHART_TIMEOUT));
    }

    #[test]
    fn test_release_name_precedence() {
        let spec: ChartSpec = serde_json::from_value(json!({
            "repository": "https://charts", "name": "core", "url": "https://x/foo-1.0.0.tgz", "releaseName": "explicit"
        }))
        .unwrap();
        assert_eq!(spec.resolved_release_name().as_deref(), Some("explicit"));

        let spec: ChartSpec =
            serde_json::from_value(json!({"repository": "https://charts", "name": "core"})).unwrap();
        assert_eq!(spec.resolved_release_name().as_deref(), Some("core"));

        let spec: ChartSpec = serde_json::from_value(json!({"url": "https://x/foo-1.0.0.tgz"})).unwrap();
        assert_eq!(spec.resolved_release_name().as_deref(), Some("foo"));

        let spec: ChartSpec = serde_json::from_value(json!({"name": "core"})).unwrap();
        assert_eq!(spec.resolved_release_name().as_deref(), Some("core"));
        assert_eq!(spec.chart_reference(), Some(("core".to_string(), None)));

        let spec: ChartSpec = serde_json::from_value(json!({"name": "core", "url": "https://x/foo-1.0.0.tgz"})).unwrap();
        assert_eq!(spec.resolved_release_name().as_deref(), Some("foo"));

        assert_eq!(ChartSpec::default().resolved_release_name(), None);
    }

    #[test]
    fn test_chart_reference() {
        let spec: ChartSpec =
            serde_json::from_value(json!({"repository": "oci://ghcr.io/krateo/", "name": "core"})).unwrap();
        assert_eq!(spec.chart_reference(), Some(("oci://ghcr.io/krateo/core".to_string(), None)));

        let spec: ChartSpec =
            serde_json::from_value(json!({"repository": "https://charts", "name": "core"})).unwrap();
        assert_eq!(
            spec.chart_reference(),
            Some(("core".to_string(), Some("https://charts".to_string())))
        );

        let spec: ChartSpec = serde_json::from_value(json!({"url": "https://x/a-1.tgz", "name": "a"})).unwrap();
        assert_eq!(spec.chart_reference(), Some(("https://x/a-1.tgz".to_string(), None)));
    }

    #[test]
    fn test_object_spec_split() {
        let spec = ObjectSpec::from_value(&json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg", "labels": {"a": "b"}},
            "data": {"k": "v"},
        }))
        .unwrap();
        assert_eq!(spec.name, "cfg");
        assert_eq!(spec.namespace, None);
        assert_eq!(spec.metadata["labels"], json!({"a": "b"}));
        assert_eq!(Value::Object(spec.body), json!({"data": {"k": "v"}}));

        assert!(ObjectSpec::from_value(&json!({"kind": "ConfigMap", "metadata": {"name": "x"}})).is_err());
        assert!(ObjectSpec::from_value(&json!({"apiVersion": "v1", "kind": "ConfigMap"})).is_err());
        assert!(ObjectSpec::from_value(&json!("nope")).is_err());
    }
}
