//! Parser de reportes: trait colaborador + implementación YAML estilo Puppet.
//!
//! El core sólo depende de `ReportParser`; la estructura concreta del documento
//! queda encapsulada aquí. `PuppetYamlParser` extrae únicamente los campos de
//! resumen que el core persiste:
//!
//! - `host` → fqdn (validado, ver `Fqdn::new`).
//! - `status` → `ReportState` (valor fuera del conjunto cerrado = error).
//! - `metrics.resources.values` → total / changed / failed / skipped.
//! - `metrics.time.values` → `total` como runtime.
//! - `role`, `branch` (o `environment`), `build_time` → metadata de despliegue,
//!   opcionales.
//!
//! Los reportes de Puppet llevan tags Ruby (`!ruby/object:...`); se descartan
//! antes de navegar el documento.

use std::collections::HashMap;

use serde_yaml::{Mapping, Value};

use crate::{ContentHash, Fqdn, ParseError, Report, ReportState};

/// Colaborador externo: bytes crudos → `Report`.
pub trait ReportParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Report, ParseError>;
}

/// Parser por defecto para reportes YAML de Puppet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PuppetYamlParser;

impl ReportParser for PuppetYamlParser {
    fn parse(&self, bytes: &[u8]) -> Result<Report, ParseError> {
        let doc: Value = serde_yaml::from_slice(bytes).map_err(|e| ParseError::Syntax(e.to_string()))?;
        let doc = strip_tags(doc);
        let root = doc.as_mapping()
                      .ok_or_else(|| ParseError::Syntax("el documento raíz no es un mapa".to_string()))?;

        let host = text_field(root, "host").ok_or(ParseError::MissingField("host"))?;
        let fqdn = Fqdn::new(&host)?;
        let status = text_field(root, "status").ok_or(ParseError::MissingField("status"))?;
        let state: ReportState = status.trim().parse()?;

        let metrics = root.get("metrics").and_then(Value::as_mapping);
        let resources = metric_values(metrics, "resources");
        let time = metric_values(metrics, "time");
        let count = |key: &str| resources.get(key).map(|v| *v as i64).unwrap_or(0);

        let branch = text_field(root, "branch").or_else(|| text_field(root, "environment"))
                                               .unwrap_or_default();
        let build_time = match root.get("build_time") {
            None | Some(Value::Null) => 0,
            Some(v) => epoch_value(v).ok_or_else(|| ParseError::InvalidField { field: "build_time",
                                                                               reason: format!("{v:?}") })?,
        };

        Ok(Report { fqdn,
                    state,
                    hash: Some(ContentHash::of(bytes)),
                    total: count("total"),
                    changed: count("changed"),
                    failed: count("failed"),
                    skipped: count("skipped"),
                    runtime: time.get("total").copied().unwrap_or(0.0),
                    role: text_field(root, "role").unwrap_or_default(),
                    branch,
                    build_time })
    }
}

/// Elimina recursivamente los tags YAML (`!ruby/object:...`, `!ruby/sym`).
fn strip_tags(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => strip_tags(tagged.value),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(strip_tags).collect()),
        Value::Mapping(map) => Value::Mapping(map.into_iter()
                                                 .map(|(k, v)| (strip_tags(k), strip_tags(v)))
                                                 .collect::<Mapping>()),
        other => other,
    }
}

fn text_field(map: &Mapping, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn epoch_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Lee `metrics.<name>.values`, una lista de tripletas `[clave, etiqueta, valor]`.
fn metric_values(metrics: Option<&Mapping>, name: &str) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    let Some(values) = metrics.and_then(|m| m.get(name))
                              .and_then(Value::as_mapping)
                              .and_then(|m| m.get("values"))
                              .and_then(Value::as_sequence)
    else {
        return out;
    };
    for entry in values {
        let Some(triple) = entry.as_sequence() else { continue };
        if let (Some(key), Some(value)) = (triple.first().and_then(Value::as_str), triple.get(2).and_then(Value::as_f64)) {
            out.insert(key.to_string(), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "host: db01.example.com\nstatus: unchanged\n";

    #[test]
    fn minimal_document_defaults_counters() {
        let report = PuppetYamlParser.parse(MINIMAL.as_bytes()).unwrap();
        assert_eq!(report.fqdn.as_str(), "db01.example.com");
        assert_eq!(report.state, ReportState::Unchanged);
        assert_eq!(report.total, 0);
        assert_eq!(report.build_time, 0);
        assert_eq!(report.hash, Some(ContentHash::of(MINIMAL.as_bytes())));
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = PuppetYamlParser.parse(b"status: failed\n").unwrap_err();
        assert_eq!(err, ParseError::MissingField("host"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = PuppetYamlParser.parse(b"host: a\nstatus: skipped\n").unwrap_err();
        assert!(matches!(err, ParseError::Domain(_)));
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        let err = PuppetYamlParser.parse(b"host: [unterminated").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
        let err = PuppetYamlParser.parse(b"- just\n- a list\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn environment_is_used_when_branch_is_absent() {
        let doc = "host: a\nstatus: changed\nenvironment: production\n";
        assert_eq!(PuppetYamlParser.parse(doc.as_bytes()).unwrap().branch, "production");
    }
}
