//! Declarative schemas and the generic validator.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s plus cross-field
//! [`Constraint`]s. [`Schema::validate`] coerces a raw document into a
//! normalized [`Record`], collecting every violation instead of stopping at
//! the first one.
//!
//! ```
//! use catalyst_engine::schema::{FieldSpec, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new(vec![
//!     FieldSpec::str("name").required().max_len(32),
//!     FieldSpec::str("priority").choices(&["P1", "P2", "P3", "P4"]).default("P1"),
//!     FieldSpec::int("occurrences").range(1, 60),
//! ]);
//!
//! let record = schema.validate(&json!({"name": "link flap", "priority": "p2"})).unwrap();
//! assert_eq!(record.get_str("priority"), Some("P2"));
//!
//! let errors = schema.validate(&json!({"occurrences": "many"})).unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```

use std::fmt;

use catalyst_core::record::type_name;
use catalyst_core::Record;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Dotted path to the offending field.
    pub path: String,
    /// What is wrong with it.
    pub reason: String,
}

impl Violation {
    /// Create a violation.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// The declared type of a field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// String. Numbers and booleans are stringified.
    Str,
    /// Integer. Integral floats and numeric strings are accepted.
    Int,
    /// Float. Numeric strings are accepted.
    Float,
    /// Boolean. `yes`/`no`, `on`/`off`, `true`/`false` and `1`/`0` are accepted.
    Bool,
    /// Any JSON value, passed through unchecked.
    Raw,
    /// List whose elements have the given type.
    List(Box<FieldType>),
    /// Nested object validated by its own schema.
    Dict(Box<Schema>),
}

impl FieldType {
    /// Defaults applied inside a nested value, or `None` if nothing nests.
    fn with_defaults(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Dict(schema), Value::Object(map)) => {
                let record = Record::from(map.clone());
                Some(schema.with_defaults(&record).into_value())
            }
            (Self::List(element), Value::Array(items)) if matches!(**element, Self::Dict(_)) => {
                Some(Value::Array(
                    items
                        .iter()
                        .map(|item| element.with_defaults(item).unwrap_or_else(|| item.clone()))
                        .collect(),
                ))
            }
            _ => None,
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Raw => "raw",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }
}

/// Specification of one field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    ty: FieldType,
    required: bool,
    choices: Vec<&'static str>,
    max_len: Option<usize>,
    range: Option<(f64, f64)>,
    default: Option<Value>,
}

impl FieldSpec {
    /// A field of the given type.
    #[must_use]
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            choices: Vec::new(),
            max_len: None,
            range: None,
            default: None,
        }
    }

    /// A string field.
    #[must_use]
    pub const fn str(name: &'static str) -> Self {
        Self::new(name, FieldType::Str)
    }

    /// An integer field.
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldType::Int)
    }

    /// A float field.
    #[must_use]
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, FieldType::Float)
    }

    /// A boolean field.
    #[must_use]
    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    /// A list of elements of `element` type.
    #[must_use]
    pub fn list(name: &'static str, element: FieldType) -> Self {
        Self::new(name, FieldType::List(Box::new(element)))
    }

    /// A list of nested records.
    #[must_use]
    pub fn records(name: &'static str, schema: Schema) -> Self {
        Self::list(name, FieldType::Dict(Box::new(schema)))
    }

    /// A nested record.
    #[must_use]
    pub fn dict(name: &'static str, schema: Schema) -> Self {
        Self::new(name, FieldType::Dict(Box::new(schema)))
    }

    /// Mark the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict string values (or list elements) to a set.
    ///
    /// Matching is case-insensitive; the canonical spelling is stored.
    #[must_use]
    pub fn choices(mut self, choices: &[&'static str]) -> Self {
        self.choices = choices.to_vec();
        self
    }

    /// Maximum string length.
    #[must_use]
    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Inclusive numeric range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min as f64, max as f64));
        self
    }

    /// Value used when the field is unset on create.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// A cross-field rule.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// If any of these fields is set, all must be.
    RequiredTogether(Vec<&'static str>),
    /// At most one of these fields may be set.
    MutuallyExclusive(Vec<&'static str>),
    /// At least one of these fields must be set.
    RequiredOneOf(Vec<&'static str>),
    /// When `field` equals `value`, every field in `requires` must be set.
    RequiredIf {
        /// Field whose value triggers the rule.
        field: &'static str,
        /// Triggering value, compared case-insensitively.
        value: &'static str,
        /// Fields that become required.
        requires: Vec<&'static str>,
    },
}

/// An ordered set of field specs and constraints.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    constraints: Vec<Constraint>,
}

impl Schema {
    /// Create a schema from field specs.
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            constraints: Vec::new(),
        }
    }

    /// Add a required-together group.
    #[must_use]
    pub fn required_together(mut self, fields: &[&'static str]) -> Self {
        self.constraints
            .push(Constraint::RequiredTogether(fields.to_vec()));
        self
    }

    /// Add a mutually-exclusive group.
    #[must_use]
    pub fn mutually_exclusive(mut self, fields: &[&'static str]) -> Self {
        self.constraints
            .push(Constraint::MutuallyExclusive(fields.to_vec()));
        self
    }

    /// Add a required-one-of group.
    #[must_use]
    pub fn required_one_of(mut self, fields: &[&'static str]) -> Self {
        self.constraints.push(Constraint::RequiredOneOf(fields.to_vec()));
        self
    }

    /// Add a required-if rule.
    #[must_use]
    pub fn required_if(
        mut self,
        field: &'static str,
        value: &'static str,
        requires: &[&'static str],
    ) -> Self {
        self.constraints.push(Constraint::RequiredIf {
            field,
            value,
            requires: requires.to_vec(),
        });
        self
    }

    /// The field specs in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field spec by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn default_of(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(|spec| spec.default.as_ref())
    }

    /// Fill unset fields with their declared defaults, nested records
    /// included.
    ///
    /// Validation leaves defaults out so that undeclared fields never take
    /// part in a diff; they only apply when a resource is created.
    #[must_use]
    pub fn with_defaults(&self, record: &Record) -> Record {
        let mut filled = record.clone();
        for spec in &self.fields {
            match filled.get(spec.name).filter(|v| !v.is_null()) {
                None => {
                    if let Some(default) = &spec.default {
                        filled.insert(spec.name, default.clone());
                    }
                }
                Some(value) => {
                    if let Some(value) = spec.ty.with_defaults(value) {
                        filled.insert(spec.name, value);
                    }
                }
            }
        }
        filled
    }

    /// Validate a raw document, reporting paths relative to its root.
    ///
    /// # Errors
    ///
    /// Returns every violation found.
    pub fn validate(&self, raw: &Value) -> Result<Record, Vec<Violation>> {
        self.validate_at(raw, "")
    }

    /// Validate a raw document, prefixing reported paths with `base`.
    ///
    /// # Errors
    ///
    /// Returns every violation found.
    pub fn validate_at(&self, raw: &Value, base: &str) -> Result<Record, Vec<Violation>> {
        let mut violations = Vec::new();
        let record = match raw {
            Value::Object(map) => self.validate_object(map, base, &mut violations),
            other => {
                violations.push(Violation::new(
                    display_path(base),
                    format!("expected dict, found {}", type_name(other)),
                ));
                Record::new()
            }
        };

        if violations.is_empty() {
            Ok(record)
        } else {
            Err(violations)
        }
    }

    fn validate_object(
        &self,
        map: &Map<String, Value>,
        base: &str,
        violations: &mut Vec<Violation>,
    ) -> Record {
        for key in map.keys() {
            if self.field(key).is_none() {
                violations.push(Violation::new(join(base, key), "unknown field"));
            }
        }

        let mut record = Record::new();
        for spec in &self.fields {
            let path = join(base, spec.name);
            match map.get(spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if let Some(normalized) = spec.check(value, &path, violations) {
                        record.insert(spec.name, normalized);
                    }
                }
                None if spec.required => {
                    violations.push(Violation::new(path, "required field is missing"));
                }
                None => {}
            }
        }

        let is_set = |name: &str| map.get(name).is_some_and(|v| !v.is_null());
        for constraint in &self.constraints {
            match constraint {
                Constraint::RequiredTogether(group) => {
                    if group.iter().any(|f| is_set(f)) && !group.iter().all(|f| is_set(f)) {
                        violations.push(Violation::new(
                            display_path(base),
                            format!("parameters are required together: {}", group.join(", ")),
                        ));
                    }
                }
                Constraint::MutuallyExclusive(group) => {
                    if group.iter().filter(|f| is_set(f)).count() > 1 {
                        violations.push(Violation::new(
                            display_path(base),
                            format!("parameters are mutually exclusive: {}", group.join(", ")),
                        ));
                    }
                }
                Constraint::RequiredOneOf(group) => {
                    if !group.iter().any(|f| is_set(f)) {
                        violations.push(Violation::new(
                            display_path(base),
                            format!("one of the following is required: {}", group.join(", ")),
                        ));
                    }
                }
                Constraint::RequiredIf {
                    field,
                    value,
                    requires,
                } => {
                    let triggered = record
                        .get_str(field)
                        .or_else(|| self.default_of(field).and_then(Value::as_str))
                        .is_some_and(|v| v.eq_ignore_ascii_case(value));
                    let missing: Vec<&str> =
                        requires.iter().copied().filter(|f| !is_set(f)).collect();
                    if triggered && !missing.is_empty() {
                        violations.push(Violation::new(
                            display_path(base),
                            format!("{field} is {value} but missing: {}", missing.join(", ")),
                        ));
                    }
                }
            }
        }

        record
    }
}

impl FieldSpec {
    fn check(&self, value: &Value, path: &str, violations: &mut Vec<Violation>) -> Option<Value> {
        let coerced = coerce(&self.ty, value, path, violations)?;
        let before = violations.len();

        match &coerced {
            Value::String(s) => {
                if let Some(max) = self.max_len {
                    if s.chars().count() > max {
                        violations.push(Violation::new(
                            path,
                            format!("length {} exceeds maximum {max}", s.chars().count()),
                        ));
                    }
                }
            }
            Value::Number(n) => {
                if let (Some((min, max)), Some(v)) = (self.range, n.as_f64()) {
                    if v < min || v > max {
                        violations.push(Violation::new(
                            path,
                            format!("value {n} is outside the range {min}..={max}"),
                        ));
                    }
                }
            }
            _ => {}
        }

        let normalized = if self.choices.is_empty() {
            coerced
        } else {
            match coerced {
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| {
                            self.canonical_choice(item, &format!("{path}[{i}]"), violations)
                        })
                        .collect(),
                ),
                other => self.canonical_choice(other, path, violations),
            }
        };

        (violations.len() == before).then_some(normalized)
    }

    fn canonical_choice(&self, value: Value, path: &str, violations: &mut Vec<Violation>) -> Value {
        let Some(text) = value.as_str() else {
            return value;
        };
        match self
            .choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(text))
        {
            Some(choice) => Value::String((*choice).to_string()),
            None => {
                violations.push(Violation::new(
                    path,
                    format!(
                        "value '{text}' is not one of: {}",
                        self.choices.join(", ")
                    ),
                ));
                value
            }
        }
    }
}

fn coerce(ty: &FieldType, value: &Value, path: &str, violations: &mut Vec<Violation>) -> Option<Value> {
    let mismatch = |violations: &mut Vec<Violation>| {
        violations.push(Violation::new(
            path,
            format!("expected {}, found {}", ty.name(), type_name(value)),
        ));
        None
    };

    match (ty, value) {
        (FieldType::Raw, v) => Some(v.clone()),

        (FieldType::Str, Value::String(s)) => Some(Value::String(s.clone())),
        (FieldType::Str, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldType::Str, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (FieldType::Int, Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(Value::from(i)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .and_then(float_to_i64)
                .map(Value::from)
                .or_else(|| mismatch(violations)),
        },
        (FieldType::Int, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Some(Value::from(i)),
            Err(_) => mismatch(violations),
        },

        (FieldType::Float, Value::Number(n)) => Some(Value::Number(n.clone())),
        (FieldType::Float, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) => Number::from_f64(f).map(Value::Number).or_else(|| mismatch(violations)),
            Err(_) => mismatch(violations),
        },

        (FieldType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (FieldType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => mismatch(violations),
        },
        (FieldType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => mismatch(violations),
        },

        (FieldType::List(element), Value::Array(items)) => {
            let before = violations.len();
            let coerced: Vec<Value> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| coerce(element, item, &format!("{path}[{i}]"), violations))
                .collect();
            (violations.len() == before).then_some(Value::Array(coerced))
        }

        (FieldType::Dict(schema), Value::Object(map)) => {
            let before = violations.len();
            let record = schema.validate_object(map, path, violations);
            (violations.len() == before).then(|| record.into_value())
        }

        _ => mismatch(violations),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_i64(f: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; stay strictly inside the range.
    (f >= -9.2e18 && f <= 9.2e18).then_some(f as i64)
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

fn display_path(base: &str) -> String {
    if base.is_empty() {
        "<root>".to_string()
    } else {
        base.to_string()
    }
}
