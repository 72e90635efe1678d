//! Portable component descriptors.
//!
//! A [`ComponentDescriptor`] is the only persisted / wire representation of a
//! rule graph. Its JSON form is
//!
//! ```json
//! {"type": "AndRule", "label": "entry", "parameters": {"threshold": 3}, "components": [...]}
//! ```
//!
//! with `label`, `parameters` and `components` omitted when empty. Parameter
//! maps keep insertion order and numeric values are carried as canonical
//! strings, so comparisons go through [`ComponentDescriptor::structurally_eq`]
//! rather than `==` whenever formatting may differ (`"5"` vs `"5.00"`).

use crate::domain::error::CodecError;
use crate::domain::num::{Num, NumFactory};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Param>),
    Component(Box<ComponentDescriptor>),
}

impl Param {
    fn kind(&self) -> &'static str {
        match self {
            Param::Bool(_) => "bool",
            Param::Int(_) => "integer",
            Param::Float(_) => "float",
            Param::Text(_) => "string",
            Param::List(_) => "list",
            Param::Component(_) => "component",
        }
    }

    /// Numeric reading of the value, if it has one. Text is parsed so that
    /// `"5"`, `"5.00"` and `5` all compare equal.
    fn numeric(&self) -> Option<Decimal> {
        match self {
            Param::Int(v) => Some(Decimal::from(*v)),
            Param::Float(v) => Decimal::from_f64(*v),
            Param::Text(s) => {
                let s = s.trim();
                Decimal::from_str(s)
                    .or_else(|_| Decimal::from_scientific(s))
                    .ok()
            }
            _ => None,
        }
    }

    fn structurally_eq(&self, other: &Param) -> bool {
        match (self, other) {
            (Param::List(a), Param::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structurally_eq(y))
            }
            (Param::Component(a), Param::Component(b)) => a.structurally_eq(b),
            (Param::Bool(a), Param::Bool(b)) => a == b,
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<usize> for Param {
    fn from(v: usize) -> Self {
        match i64::try_from(v) {
            Ok(i) => Param::Int(i),
            Err(_) => Param::Text(v.to_string()),
        }
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param::Int(i64::from(v))
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<Num> for Param {
    fn from(v: Num) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<ComponentDescriptor> for Param {
    fn from(v: ComponentDescriptor) -> Self {
        Param::Component(Box::new(v))
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Param::List(v.into_iter().map(Into::into).collect())
    }
}

/// Insertion-ordered parameter map. Inserting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(Vec<(String, Param)>);

impl Parameters {
    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Param) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn structurally_eq(&self, other: &Parameters) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, value)| {
                other
                    .get(key)
                    .is_some_and(|theirs| value.structurally_eq(theirs))
            })
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParametersVisitor;

        impl<'de> Visitor<'de> for ParametersVisitor {
            type Value = Parameters;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Parameters, A::Error> {
                let mut params = Parameters::default();
                while let Some((key, value)) = access.next_entry::<String, Param>()? {
                    params.insert(key, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParametersVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Blank only for descriptors read from malformed input; rejected by
    /// [`ComponentDescriptor::from_json`].
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Parameters::is_empty")]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentDescriptor>,
}

impl ComponentDescriptor {
    pub fn builder(type_name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            inner: ComponentDescriptor {
                type_name: type_name.into(),
                label: None,
                parameters: Parameters::default(),
                components: Vec::new(),
            },
        }
    }

    pub fn param(&self, key: &str) -> Option<&Param> {
        self.parameters.get(key)
    }

    /// Equality tolerant of numeric formatting: type and label compare
    /// exactly, parameters by key set then value, components positionally.
    pub fn structurally_eq(&self, other: &ComponentDescriptor) -> bool {
        self.type_name == other.type_name
            && self.label == other.label
            && self.parameters.structurally_eq(&other.parameters)
            && self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.structurally_eq(b))
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_pretty_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a descriptor and checks that every node, including descriptors
    /// nested inside parameters, carries a type.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let descriptor: ComponentDescriptor = serde_json::from_str(text)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.type_name.trim().is_empty() {
            return Err(CodecError::MissingType);
        }
        for (_, value) in self.parameters.iter() {
            validate_param(value)?;
        }
        self.components.iter().try_for_each(ComponentDescriptor::validate)
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::malformed(&self.type_name, reason)
    }

    fn required(&self, key: &str) -> Result<&Param, CodecError> {
        self.param(key)
            .ok_or_else(|| self.malformed(format!("missing parameter {key}")))
    }

    fn wrong_kind(&self, key: &str, expected: &str, found: &Param) -> CodecError {
        self.malformed(format!(
            "parameter {key} should be {expected}, found {}",
            found.kind()
        ))
    }

    pub fn bool_param(&self, key: &str) -> Result<bool, CodecError> {
        match self.required(key)? {
            Param::Bool(v) => Ok(*v),
            Param::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Param::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(self.wrong_kind(key, "a bool", other)),
        }
    }

    pub fn text_param(&self, key: &str) -> Result<&str, CodecError> {
        match self.required(key)? {
            Param::Text(s) => Ok(s),
            other => Err(self.wrong_kind(key, "a string", other)),
        }
    }

    pub fn int_param(&self, key: &str) -> Result<i64, CodecError> {
        let value = self.required(key)?;
        int_value(value).ok_or_else(|| self.wrong_kind(key, "an integer", value))
    }

    /// Integer parameter that must be non-negative.
    pub fn usize_param(&self, key: &str) -> Result<usize, CodecError> {
        let v = self.int_param(key)?;
        usize::try_from(v)
            .map_err(|_| self.malformed(format!("parameter {key} must be non-negative, got {v}")))
    }

    pub fn num_param(&self, key: &str, factory: NumFactory) -> Result<Num, CodecError> {
        let value = self.required(key)?;
        match value {
            Param::Text(s) => factory
                .parse(s)
                .map_err(|_| self.malformed(format!("parameter {key} is not a number: {s:?}"))),
            Param::Int(v) => Ok(factory.num_of_i64(*v)),
            Param::Float(v) => Ok(factory.num_of(*v)),
            other => Err(self.wrong_kind(key, "a number", other)),
        }
    }

    pub fn list_param(&self, key: &str) -> Result<&[Param], CodecError> {
        match self.required(key)? {
            Param::List(items) => Ok(items),
            other => Err(self.wrong_kind(key, "a list", other)),
        }
    }
}

pub(crate) fn int_value(value: &Param) -> Option<i64> {
    match value {
        Param::Int(v) => Some(*v),
        Param::Float(v) if v.fract() == 0.0 => Some(*v as i64),
        Param::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn validate_param(value: &Param) -> Result<(), CodecError> {
    match value {
        Param::Component(c) => c.validate(),
        Param::List(items) => items.iter().try_for_each(validate_param),
        _ => Ok(()),
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

pub struct DescriptorBuilder {
    inner: ComponentDescriptor,
}

impl DescriptorBuilder {
    pub fn label(mut self, label: Option<String>) -> Self {
        self.inner.label = label;
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Param>) -> Self {
        self.inner.parameters.insert(key, value.into());
        self
    }

    pub fn component(mut self, component: ComponentDescriptor) -> Self {
        self.inner.components.push(component);
        self
    }

    pub fn components(mut self, components: impl IntoIterator<Item = ComponentDescriptor>) -> Self {
        self.inner.components.extend(components);
        self
    }

    pub fn build(self) -> ComponentDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sma(bar_count: impl Into<Param>) -> ComponentDescriptor {
        ComponentDescriptor::builder("SMAIndicator")
            .param("barCount", bar_count)
            .component(ComponentDescriptor::builder("ClosePriceIndicator").build())
            .build()
    }

    #[test]
    fn json_omits_empty_fields() {
        let d = ComponentDescriptor::builder("FixedRule").build();
        assert_eq!(d.to_json().unwrap(), r#"{"type":"FixedRule"}"#);
    }

    #[test]
    fn json_keeps_parameter_order() {
        let d = ComponentDescriptor::builder("StopLossRule")
            .label(Some("stop".into()))
            .param("percentage", "5")
            .param("barCount", 3usize)
            .param("alpha", true)
            .build();
        assert_eq!(
            d.to_json().unwrap(),
            r#"{"type":"StopLossRule","label":"stop","parameters":{"percentage":"5","barCount":3,"alpha":true}}"#
        );
        let parsed = ComponentDescriptor::from_json(&d.to_json().unwrap()).unwrap();
        let keys: Vec<_> = parsed.parameters.keys().collect();
        assert_eq!(keys, vec!["percentage", "barCount", "alpha"]);
        assert_eq!(parsed, d);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut params = Parameters::default();
        params.insert("a", Param::Int(1));
        params.insert("b", Param::Int(2));
        params.insert("a", Param::Int(3));
        assert_eq!(params.len(), 2);
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&Param::Int(3)));
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = ComponentDescriptor::from_json(r#"{"label":"x"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));

        let nested = r#"{"type":"NotRule","components":[{"parameters":{"a":1}}]}"#;
        assert!(matches!(
            ComponentDescriptor::from_json(nested).unwrap_err(),
            CodecError::MissingType
        ));
    }

    #[test]
    fn invalid_json_is_a_json_error() {
        assert!(matches!(
            ComponentDescriptor::from_json("{not json").unwrap_err(),
            CodecError::Json(_)
        ));
    }

    #[test]
    fn nested_component_parameter_parses() {
        let text = r#"{"type":"X","parameters":{"inner":{"type":"ClosePriceIndicator"},"list":[1,"two",false]}}"#;
        let d = ComponentDescriptor::from_json(text).unwrap();
        assert!(matches!(d.param("inner"), Some(Param::Component(c)) if c.type_name == "ClosePriceIndicator"));
        assert_eq!(
            d.param("list"),
            Some(&Param::List(vec![
                Param::Int(1),
                Param::Text("two".into()),
                Param::Bool(false)
            ]))
        );
    }

    #[test]
    fn structural_equality_tolerates_numeric_formatting() {
        assert!(sma("5").structurally_eq(&sma("5.00")));
        assert!(sma(5usize).structurally_eq(&sma("5.0")));
        assert!(!sma("5").structurally_eq(&sma("6")));
        assert_ne!(sma("5"), sma("5.00"));
    }

    #[test]
    fn structural_equality_is_exact_on_type_and_label() {
        let a = ComponentDescriptor::builder("AndRule").label(Some("x".into())).build();
        let b = ComponentDescriptor::builder("AndRule").label(Some("X".into())).build();
        let c = ComponentDescriptor::builder("OrRule").label(Some("x".into())).build();
        assert!(!a.structurally_eq(&b));
        assert!(!a.structurally_eq(&c));
        assert!(a.structurally_eq(&a.clone()));
    }

    #[test]
    fn structural_equality_compares_key_sets() {
        let a = ComponentDescriptor::builder("R").param("a", 1i64).build();
        let b = ComponentDescriptor::builder("R")
            .param("a", 1i64)
            .param("b", 2i64)
            .build();
        assert!(!a.structurally_eq(&b));
        assert!(!b.structurally_eq(&a));
    }

    #[test]
    fn structural_equality_ignores_parameter_order() {
        let a = ComponentDescriptor::builder("R")
            .param("a", "1")
            .param("b", "2")
            .build();
        let b = ComponentDescriptor::builder("R")
            .param("b", "2.0")
            .param("a", 1i64)
            .build();
        assert!(a.structurally_eq(&b));
    }

    #[test]
    fn structural_equality_compares_components_positionally() {
        let first = ComponentDescriptor::builder("AndRule")
            .component(ComponentDescriptor::builder("A").build())
            .component(ComponentDescriptor::builder("B").build())
            .build();
        let swapped = ComponentDescriptor::builder("AndRule")
            .component(ComponentDescriptor::builder("B").build())
            .component(ComponentDescriptor::builder("A").build())
            .build();
        assert!(!first.structurally_eq(&swapped));
    }

    #[test]
    fn typed_accessors() {
        let d = ComponentDescriptor::builder("R")
            .param("n", 4usize)
            .param("neg", -1i64)
            .param("text_n", "7")
            .param("pct", "2.5")
            .param("flag", true)
            .param("xs", vec![1i64, 2])
            .build();
        assert_eq!(d.int_param("n").unwrap(), 4);
        assert_eq!(d.usize_param("text_n").unwrap(), 7);
        assert!(d.usize_param("neg").is_err());
        assert_eq!(
            d.num_param("pct", NumFactory::Decimal).unwrap().to_string(),
            "2.5"
        );
        assert!(d.bool_param("flag").unwrap());
        assert_eq!(d.list_param("xs").unwrap().len(), 2);
        assert!(matches!(
            d.int_param("missing").unwrap_err(),
            CodecError::Malformed { .. }
        ));
        assert!(d.text_param("n").is_err());
    }

    #[test]
    fn display_is_compact_json() {
        let d = sma(3usize);
        assert_eq!(d.to_string(), d.to_json().unwrap());
        assert!(d.to_pretty_json().unwrap().contains('\n'));
    }
}
