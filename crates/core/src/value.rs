//! Value types for keystone
//!
//! This module defines:
//! - Value: typed scalar carried by rows and bound statement parameters
//! - KeyTuple: an ordered primary-key tuple
//!
//! ## Ordering
//!
//! `Value` has a total order so it can key ordered tables:
//! `Null < Bool < numbers < String < Bytes < Timestamp < Array`.
//! `Int` and `Float` compare numerically with each other.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Typed column or parameter value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// Array of values (used for `IN UNNEST(@p)` parameters)
    Array(Vec<Value>),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Timestamp(_) => "Timestamp",
            Value::Array(_) => "Array",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow as string, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Timestamp value; RFC 3339 strings are accepted as timestamps too
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Convert to a JSON value for serde-based row decoding
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Convert from a JSON value produced by serializing an entity
    ///
    /// Nested objects are not valid column values and are rejected.
    pub fn from_json(json: serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            serde_json::Value::Object(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Timestamp(_) => 5,
            Value::Array(_) => 6,
        }
    }

    /// Total order over values
    ///
    /// Integers and floats compare by exact numeric value, `-0.0` equals
    /// `0.0`, and NaNs sort beyond every number by sign.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// `f` as an `i64` when it is integral and in range
fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&f).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered primary-key tuple identifying one row within a table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyTuple(pub Vec<Value>);

impl KeyTuple {
    /// Key from its ordered parts
    pub fn new(parts: Vec<Value>) -> Self {
        KeyTuple(parts)
    }

    /// Single-column key
    pub fn single(value: impl Into<Value>) -> Self {
        KeyTuple(vec![value.into()])
    }

    /// Number of key parts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the tuple has no parts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            // Integral floats equal the matching Int
            Value::Int(i) => i.hash(state),
            Value::Float(x) => match integral(*x) {
                Some(i) => i.hash(state),
                None => x.to_bits().hash(state),
            },
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Array(items) => items.hash(state),
        }
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn test_value_ordering_across_types() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Bool(true) < Value::Int(0));
        assert!(Value::Int(5) < Value::String("a".into()));
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(1) < Value::Float(1.5));
    }

    #[test]
    fn test_int_float_order_is_exact_beyond_f64_precision() {
        let big = 1i64 << 53;
        let float = Value::Float(big as f64);
        assert_eq!(Value::Int(big), float);
        assert!(float < Value::Int(big + 1));
        assert!(Value::Int(big) < Value::Int(big + 1));
        assert!(Value::Int(i64::MAX) < Value::Float(TWO_POW_63));
        assert_eq!(Value::Int(i64::MIN), Value::Float(-TWO_POW_63));
        assert!(Value::Int(-1) > Value::Float(-1.5));
        assert!(Value::Int(i64::MAX) < Value::Float(f64::NAN));
        assert!(Value::Int(i64::MIN) > Value::Float(-f64::NAN));

        let set: BTreeSet<Value> = [Value::Int(big + 1), float, Value::Int(big)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_equal_numbers_hash_alike() {
        let set: HashSet<Value> = [
            Value::Int(3),
            Value::Float(3.0),
            Value::Int(0),
            Value::Float(-0.0),
            Value::Float(0.0),
            Value::Float(3.5),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_numeric_order_is_transitive(a in -8i64..8, b in -8i64..8, c in -8i64..8) {
            // Above 2^53 neighbouring integers share one f64
            let base = 1i64 << 53;
            let x = Value::Int(base + a);
            let y = Value::Float((base + b) as f64);
            let z = Value::Int(base + c);
            if x <= y && y <= z {
                prop_assert!(x <= z);
            }
            if x == y && y == z {
                prop_assert_eq!(&x, &z);
            }
            prop_assert_eq!(x.cmp(&y), y.cmp(&x).reverse());
        }
    }

    #[test]
    fn test_key_tuple_ordering() {
        let a = KeyTuple(vec![Value::from("g1"), Value::from("f1")]);
        let b = KeyTuple(vec![Value::from("g1"), Value::from("f2")]);
        assert!(a < b);
        assert_eq!(KeyTuple::single("x"), KeyTuple::new(vec![Value::from("x")]));
    }

    #[test]
    fn test_json_conversion() {
        let v = Value::from_json(serde_json::json!(["a", 1, 2.5, null, true])).unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::from("a"),
                Value::Int(1),
                Value::Float(2.5),
                Value::Null,
                Value::Bool(true)
            ])
        );
        assert!(Value::from_json(serde_json::json!({"nested": 1})).is_none());
    }

    #[test]
    fn test_timestamp_round_trips_through_json_string() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let json = Value::Timestamp(t).to_json();
        let back = Value::from_json(json).unwrap();
        assert_eq!(back.as_timestamp(), Some(t));
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<String> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
