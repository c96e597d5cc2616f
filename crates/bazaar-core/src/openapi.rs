//! OpenAPI 3.1 interface document validation.
//!
//! Two modes are supported. [`OpenApiMode::Lenient`] only rejects documents
//! that cannot be parsed or that lack the `info` and `paths` sections.
//! [`OpenApiMode::Strict`] additionally checks the document against the
//! OpenAPI 3.1 grammar, including response codes, parameter locations and
//! `operationId` uniqueness.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::validation::{ValidationError, ValidationErrors, ValidationReport};

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];
const PATH_ITEM_FIELDS: [&str; 5] = ["summary", "description", "parameters", "servers", "$ref"];
const PARAMETER_LOCATIONS: [&str; 4] = ["query", "header", "path", "cookie"];

/// How strictly a document is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenApiMode {
    /// Full grammar conformance.
    #[default]
    Strict,
    /// Parse errors and missing top-level sections only.
    Lenient,
}

/// Validates OpenAPI documents attached to a service specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiValidator {
    mode: OpenApiMode,
}

impl OpenApiValidator {
    /// Creates a validator in the given mode.
    #[must_use]
    pub const fn new(mode: OpenApiMode) -> Self {
        Self { mode }
    }

    /// Shorthand for a strict validator.
    #[must_use]
    pub const fn strict() -> Self {
        Self::new(OpenApiMode::Strict)
    }

    /// Shorthand for a lenient validator.
    #[must_use]
    pub const fn lenient() -> Self {
        Self::new(OpenApiMode::Lenient)
    }

    /// Returns the configured mode.
    #[must_use]
    pub const fn mode(&self) -> OpenApiMode {
        self.mode
    }

    /// Validates a document given as JSON or YAML text.
    ///
    /// # Examples
    ///
    /// ```
    /// use bazaar_core::OpenApiValidator;
    ///
    /// let doc = r"
    /// openapi: 3.1.0
    /// info: { title: Echo, version: 1.0.0 }
    /// paths:
    ///   /echo:
    ///     post:
    ///       responses:
    ///         200: { description: echoed }
    /// ";
    /// assert!(OpenApiValidator::strict().validate_str(doc).valid);
    /// assert!(!OpenApiValidator::lenient().validate_str("openapi: 3.1.0").valid);
    /// ```
    #[must_use]
    pub fn validate_str(&self, text: &str) -> ValidationReport {
        match parse_document(text) {
            Ok(doc) => self.validate(&doc),
            Err(reason) => {
                let mut errors = ValidationErrors::new();
                errors.add(ValidationError::format("openapi", reason));
                ValidationReport::new(errors, Vec::new())
            }
        }
    }

    /// Validates an already-parsed document.
    #[must_use]
    pub fn validate(&self, document: &Value) -> ValidationReport {
        let mut errors = ValidationErrors::new();

        let Some(root) = document.as_object() else {
            errors.add(ValidationError::format(
                "openapi",
                "document must be a mapping at the top level",
            ));
            return ValidationReport::new(errors, Vec::new());
        };

        for section in ["info", "paths"] {
            if !root.contains_key(section) {
                errors.add(ValidationError::required(section));
            }
        }

        if self.mode == OpenApiMode::Strict {
            check_version(root, &mut errors);
            check_info(root, &mut errors);
            if let Some(paths) = root.get("paths") {
                check_paths(paths, &mut errors);
            }
            if root.get("components").is_some_and(|c| !c.is_object()) {
                errors.add(ValidationError::format("components", "must be a mapping"));
            }
        }

        ValidationReport::new(errors, Vec::new())
    }
}

/// Parses JSON first, then YAML, stringifying non-string YAML keys.
fn parse_document(text: &str) -> Result<Value, String> {
    if let Ok(doc) = serde_json::from_str::<Value>(text) {
        return Ok(doc);
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| format!("document is neither JSON nor YAML: {e}"))?;
    Ok(yaml_to_json(yaml))
}

/// Converts a YAML tree into JSON. YAML allows unquoted `200:` response keys,
/// which JSON objects can only hold as strings.
pub(crate) fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => serde_yaml::to_string(&other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Deserializes an optional OpenAPI document from either JSON or YAML input.
pub(crate) fn deserialize_document<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(raw.map(yaml_to_json))
}

fn check_version(root: &Map<String, Value>, errors: &mut ValidationErrors) {
    match root.get("openapi") {
        None => errors.add(ValidationError::required("openapi")),
        Some(Value::String(version)) => {
            let parts: Vec<&str> = version.split('.').collect();
            let is_31 = parts.len() == 3
                && parts[0] == "3"
                && parts[1] == "1"
                && !parts[2].is_empty()
                && parts[2].chars().all(|c| c.is_ascii_digit());
            if !is_31 {
                errors.add(ValidationError::constraint(
                    "openapi",
                    format!("unsupported OpenAPI version '{version}', expected 3.1.x"),
                ));
            }
        }
        Some(_) => errors.add(ValidationError::format("openapi", "must be a string")),
    }
}

fn check_info(root: &Map<String, Value>, errors: &mut ValidationErrors) {
    let Some(info) = root.get("info") else {
        return;
    };
    let Some(info) = info.as_object() else {
        errors.add(ValidationError::format("info", "must be a mapping"));
        return;
    };
    for field in ["title", "version"] {
        match info.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) | None => {
                errors.add(ValidationError::required(format!("info.{field}")));
            }
            Some(_) => errors.add(ValidationError::format(
                format!("info.{field}"),
                "must be a string",
            )),
        }
    }
}

fn check_paths(paths: &Value, errors: &mut ValidationErrors) {
    let Some(paths) = paths.as_object() else {
        errors.add(ValidationError::format("paths", "must be a mapping"));
        return;
    };

    let mut operation_ids = HashSet::new();

    for (template, item) in paths {
        let field = format!("paths.{template}");
        if !template.starts_with('/') {
            errors.add(ValidationError::format(&field, "path must start with '/'"));
        }
        let Some(item) = item.as_object() else {
            errors.add(ValidationError::format(&field, "path item must be a mapping"));
            continue;
        };

        let template_params = template_parameters(template);
        let shared = item.get("parameters");
        if let Some(params) = shared {
            check_parameters(&format!("{field}.parameters"), params, &template_params, errors);
        }

        for (key, value) in item {
            let method = key.as_str();
            if PATH_ITEM_FIELDS.contains(&method) || method.starts_with("x-") {
                continue;
            }
            if !HTTP_METHODS.contains(&method) {
                errors.add(ValidationError::format(
                    format!("{field}.{method}"),
                    format!("'{method}' is not an HTTP method or path item field"),
                ));
                continue;
            }
            check_operation(
                &format!("{field}.{method}"),
                value,
                &template_params,
                &mut operation_ids,
                errors,
            );
        }
    }
}

fn check_operation(
    field: &str,
    operation: &Value,
    template_params: &[&str],
    operation_ids: &mut HashSet<String>,
    errors: &mut ValidationErrors,
) {
    let Some(operation) = operation.as_object() else {
        errors.add(ValidationError::format(field, "operation must be a mapping"));
        return;
    };

    if let Some(id) = operation.get("operationId") {
        match id.as_str() {
            Some(id) if !operation_ids.insert(id.to_string()) => {
                errors.add(ValidationError::constraint(
                    format!("{field}.operationId"),
                    format!("operationId '{id}' is not unique"),
                ));
            }
            Some(_) => {}
            None => errors.add(ValidationError::format(
                format!("{field}.operationId"),
                "must be a string",
            )),
        }
    }

    if let Some(params) = operation.get("parameters") {
        check_parameters(&format!("{field}.parameters"), params, template_params, errors);
    }

    let responses_field = format!("{field}.responses");
    match operation.get("responses").and_then(Value::as_object) {
        None => errors.add(ValidationError::required(responses_field)),
        Some(responses) if responses.is_empty() => {
            errors.add(ValidationError::empty(responses_field));
        }
        Some(responses) => {
            for (code, response) in responses {
                let field = format!("{responses_field}.{code}");
                if !is_response_key(code) && !code.starts_with("x-") {
                    errors.add(ValidationError::format(
                        &field,
                        format!("'{code}' is not a valid response code"),
                    ));
                }
                let documented = response.as_object().is_some_and(|r| {
                    r.contains_key("$ref") || r.get("description").is_some_and(Value::is_string)
                });
                if !documented {
                    errors.add(ValidationError::required(format!("{field}.description")));
                }
            }
        }
    }
}

fn check_parameters(
    field: &str,
    params: &Value,
    template_params: &[&str],
    errors: &mut ValidationErrors,
) {
    let Some(params) = params.as_array() else {
        errors.add(ValidationError::format(field, "must be a list"));
        return;
    };

    for (i, param) in params.iter().enumerate() {
        let field = format!("{field}[{i}]");
        let Some(param) = param.as_object() else {
            errors.add(ValidationError::format(&field, "parameter must be a mapping"));
            continue;
        };
        if param.contains_key("$ref") {
            continue;
        }

        let name = param.get("name").and_then(Value::as_str);
        if name.is_none() {
            errors.add(ValidationError::required(format!("{field}.name")));
        }

        match param.get("in").and_then(Value::as_str) {
            None => errors.add(ValidationError::required(format!("{field}.in"))),
            Some(location) if !PARAMETER_LOCATIONS.contains(&location) => {
                errors.add(ValidationError::format(
                    format!("{field}.in"),
                    format!("'{location}' is not a parameter location"),
                ));
            }
            Some("path") => {
                if param.get("required") != Some(&Value::Bool(true)) {
                    errors.add(ValidationError::constraint(
                        format!("{field}.required"),
                        "path parameters must be required",
                    ));
                }
                if let Some(name) = name {
                    if !template_params.contains(&name) {
                        errors.add(ValidationError::constraint(
                            format!("{field}.name"),
                            format!("path parameter '{name}' does not appear in the path"),
                        ));
                    }
                }
            }
            Some(_) => {}
        }
    }
}

/// Extracts `{name}` segments from a path template.
fn template_parameters(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        names.push(&after[..end]);
        rest = &after[end + 1..];
    }
    names
}

fn is_response_key(code: &str) -> bool {
    if code == "default" {
        return true;
    }
    let bytes = code.as_bytes();
    if bytes.len() != 3 || !(b'1'..=b'5').contains(&bytes[0]) {
        return false;
    }
    let wildcard = bytes[1..].iter().all(|b| *b == b'X' || *b == b'x');
    let numeric = bytes[1..].iter().all(u8::is_ascii_digit);
    wildcard || numeric
}
