//! Parameter binder (spec §4.2).
//!
//! Each node declares a parameter schema mapping `name -> { type, pos?,
//! default?, match? }`. [`bind`] validates and merges the caller-supplied
//! named and positional arguments against that schema once, at graph
//! construction time, so every node downstream of the binder sees a fully
//! validated, typed configuration rather than loosely-typed DSL values.

use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// A bound or caller-supplied parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl ParamValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "string",
            ParamValue::Number(_) => "number",
            ParamValue::Boolean(_) => "boolean",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// The type tag a parameter is declared with in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    fn tag(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (ParamType::String, ParamValue::String(_))
                | (ParamType::Number, ParamValue::Number(_))
                | (ParamType::Boolean, ParamValue::Boolean(_))
        )
    }
}

/// A validation rule attached to a schema entry: a regex for string
/// parameters, or an arbitrary predicate for numeric ones.
#[derive(Clone)]
pub enum MatchRule {
    Regex(Regex),
    Predicate(Arc<dyn Fn(f64) -> bool + Send + Sync>),
}

impl std::fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRule::Regex(re) => write!(f, "Regex({re})"),
            MatchRule::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

impl MatchRule {
    fn check(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (MatchRule::Regex(re), ParamValue::String(s)) => re.is_match(s),
            (MatchRule::Predicate(pred), ParamValue::Number(n)) => pred(*n),
            _ => true,
        }
    }
}

/// One schema entry: `name -> { type, pos?, default?, match? }`.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub ty: ParamType,
    pub pos: Option<usize>,
    pub default: Option<ParamValue>,
    pub match_rule: Option<MatchRule>,
}

impl ParamSpec {
    pub fn string() -> Self {
        Self { ty: ParamType::String, pos: None, default: None, match_rule: None }
    }

    pub fn number() -> Self {
        Self { ty: ParamType::Number, pos: None, default: None, match_rule: None }
    }

    pub fn boolean() -> Self {
        Self { ty: ParamType::Boolean, pos: None, default: None, match_rule: None }
    }

    pub fn with_pos(mut self, pos: usize) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn with_default(mut self, default: ParamValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_match(mut self, rule: MatchRule) -> Self {
        self.match_rule = Some(rule);
        self
    }
}

/// A node's declared parameter schema.
pub type ParamSchema = HashMap<String, ParamSpec>;

/// A fully validated set of bound parameters, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct BoundParams(HashMap<String, ParamValue>);

impl BoundParams {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }
}

/// Bind `named` and `positional` arguments against `schema` for node `node_id`.
///
/// Implements the four-step binding rule from spec §4.2: named value wins,
/// then positional-by-index, then schema default, then a hard failure for a
/// missing required parameter. Afterwards rejects any named option the
/// schema doesn't declare and any positional argument no schema entry
/// claimed.
pub fn bind(
    node_id: &str,
    schema: &ParamSchema,
    named: &HashMap<String, ParamValue>,
    positional: &[ParamValue],
) -> Result<BoundParams, ConfigError> {
    let mut bound = HashMap::with_capacity(schema.len());
    let mut claimed_named: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut claimed_positions: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for (name, spec) in schema {
        if let Some(value) = named.get(name) {
            claimed_named.insert(name.as_str());
            check_value(node_id, name, spec, value)?;
            bound.insert(name.clone(), value.clone());
            continue;
        }

        if let Some(pos) = spec.pos {
            if let Some(value) = positional.get(pos) {
                claimed_positions.insert(pos);
                check_value(node_id, name, spec, value)?;
                bound.insert(name.clone(), value.clone());
                continue;
            }
        }

        if let Some(default) = &spec.default {
            bound.insert(name.clone(), default.clone());
            continue;
        }

        return Err(ConfigError::MissingParam {
            node: node_id.to_string(),
            param: name.clone(),
        });
    }

    for name in named.keys() {
        if !schema.contains_key(name) {
            return Err(ConfigError::UnknownNamedParam {
                node: node_id.to_string(),
                param: name.clone(),
            });
        }
    }

    for index in 0..positional.len() {
        if !claimed_positions.contains(&index) {
            return Err(ConfigError::UnclaimedPositional { node: node_id.to_string(), index });
        }
    }

    Ok(BoundParams(bound))
}

fn check_value(node_id: &str, name: &str, spec: &ParamSpec, value: &ParamValue) -> Result<(), ConfigError> {
    if !spec.ty.accepts(value) {
        return Err(ConfigError::WrongType {
            node: node_id.to_string(),
            param: name.to_string(),
            expected: spec.ty.tag(),
            got: value.type_tag(),
        });
    }
    if let Some(rule) = &spec.match_rule {
        if !rule.check(value) {
            return Err(ConfigError::FailedMatch {
                node: node_id.to_string(),
                param: name.to_string(),
                reason: format!("{rule:?}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_default() -> ParamSchema {
        let mut schema = ParamSchema::new();
        schema.insert("mode".into(), ParamSpec::string().with_pos(0).with_default(ParamValue::String("idle".into())));
        schema.insert(
            "gain".into(),
            ParamSpec::number().with_match(MatchRule::Predicate(Arc::new(|n| n >= 0.0 && n <= 1.0))),
        );
        schema
    }

    #[test]
    fn named_wins_over_positional_and_default() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("mode".to_string(), ParamValue::String("mute".into()));
        named.insert("gain".to_string(), ParamValue::Number(0.5));
        let bound = bind("n1", &schema, &named, &[]).unwrap();
        assert_eq!(bound.string("mode"), Some("mute"));
    }

    #[test]
    fn positional_fills_when_named_absent() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("gain".to_string(), ParamValue::Number(0.5));
        let positional = vec![ParamValue::String("measure".into())];
        let bound = bind("n1", &schema, &named, &positional).unwrap();
        assert_eq!(bound.string("mode"), Some("measure"));
    }

    #[test]
    fn default_used_when_nothing_supplied() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("gain".to_string(), ParamValue::Number(0.5));
        let bound = bind("n1", &schema, &named, &[]).unwrap();
        assert_eq!(bound.string("mode"), Some("idle"));
    }

    #[test]
    fn missing_required_param_fails() {
        let schema = schema_with_default();
        let named = HashMap::new();
        let err = bind("n1", &schema, &named, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam { .. }));
    }

    #[test]
    fn match_rule_rejects_out_of_range() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("gain".to_string(), ParamValue::Number(2.0));
        named.insert("mode".to_string(), ParamValue::String("x".into()));
        let err = bind("n1", &schema, &named, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::FailedMatch { .. }));
    }

    #[test]
    fn unknown_named_param_rejected() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("gain".to_string(), ParamValue::Number(0.2));
        named.insert("mode".to_string(), ParamValue::String("x".into()));
        named.insert("bogus".to_string(), ParamValue::Boolean(true));
        let err = bind("n1", &schema, &named, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNamedParam { .. }));
    }

    #[test]
    fn unclaimed_positional_rejected() {
        let schema = schema_with_default();
        let mut named = HashMap::new();
        named.insert("gain".to_string(), ParamValue::Number(0.2));
        let positional = vec![ParamValue::String("a".into()), ParamValue::String("b".into())];
        let err = bind("n1", &schema, &named, &positional).unwrap_err();
        assert!(matches!(err, ConfigError::UnclaimedPositional { .. }));
    }
}
