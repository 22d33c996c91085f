//! Field values, records and prototypes.
//!
//! Entities expose their data to the aggregate as [`FieldValue`]s looked up by
//! name. A [`Record`] is a named set of such values, and a [`Prototype`] is
//! what a mapper hands to an aggregate to seed one member: either a bare id or
//! a record that carries the id plus whatever fields are already known.

use core::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, AggregateResult};
use crate::id::Identifier;

/// A single named field value.
///
/// Values are totally ordered so that aggregates can sort on any field:
/// `Null < Bool < numbers < Text`. Integers and floats compare numerically
/// with each other, and floats use IEEE total ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) | FieldValue::Float(_) => 2,
            FieldValue::Text(_) => 3,
        }
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Int(a), Float(b)) => cmp_int_float(*a, *b),
            (Float(a), Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Text(a), Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact comparison of an integer against a float, without going through a
/// lossy cast. NaNs sit outside the numbers: negative ones below, positive above.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, exactly representable.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }

    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&float).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Named field values, ordered by field name.
pub type Record = BTreeMap<String, FieldValue>;

/// Build a [`Record`] from `(name, value)` pairs.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Seed for one aggregate member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prototype<Id> {
    /// Only the identifier is known; the entity is loaded lazily.
    Id(Id),
    /// A structured record holding the identifier under the mapper's id field.
    Record(Record),
}

impl<Id: Identifier> Prototype<Id> {
    /// Extract the identifier, reading `id_field` for structured prototypes.
    pub fn identifier(&self, id_field: &str) -> AggregateResult<Id> {
        match self {
            Prototype::Id(id) => Ok(id.clone()),
            Prototype::Record(fields) => {
                let value = fields.get(id_field).ok_or_else(|| {
                    AggregateError::invalid_prototype(format!(
                        "prototype does not contain id field '{id_field}'"
                    ))
                })?;
                Id::from_field_value(value).ok_or_else(|| {
                    AggregateError::invalid_prototype(format!(
                        "id field '{id_field}' holds an unusable value: {value:?}"
                    ))
                })
            }
        }
    }

    /// Whether the prototype carries fields beyond the identifier, i.e. enough
    /// to build the entity without a fetch.
    pub fn is_structured(&self) -> bool {
        matches!(self, Prototype::Record(fields) if fields.len() > 1)
    }

    /// Convert into a record, placing a bare id under `id_field`.
    pub fn into_record(self, id_field: &str) -> Record {
        match self {
            Prototype::Id(id) => {
                let mut fields = Record::new();
                fields.insert(id_field.to_string(), id.to_field_value());
                fields
            }
            Prototype::Record(fields) => fields,
        }
    }
}

impl<Id> From<Record> for Prototype<Id> {
    fn from(value: Record) -> Self {
        Prototype::Record(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(FieldValue::Int(2) > FieldValue::Float(1.5));
        assert_eq!(FieldValue::Int(3), FieldValue::Float(3.0));
        assert!(FieldValue::Null < FieldValue::Bool(false));
        assert!(FieldValue::Int(i64::MAX) < FieldValue::Text(String::new()));
    }

    #[test]
    fn int_float_comparison_is_exact_beyond_f64_precision() {
        let big = 1i64 << 53;
        let float = FieldValue::Float(big as f64);

        assert_eq!(FieldValue::Int(big), float);
        assert!(FieldValue::Int(big + 1) > float);
        assert!(FieldValue::Int(-big - 1) < FieldValue::Float(-(big as f64)));
        assert!(FieldValue::Int(i64::MAX) < FieldValue::Float(9.3e18));
        assert!(FieldValue::Int(i64::MIN) == FieldValue::Float(-9_223_372_036_854_775_808.0));
        assert!(FieldValue::Int(i64::MIN) > FieldValue::Float(f64::NEG_INFINITY));
        assert!(FieldValue::Int(2) < FieldValue::Float(2.5));
        assert!(FieldValue::Int(-2) > FieldValue::Float(-2.5));
        assert!(FieldValue::Int(0) < FieldValue::Float(f64::NAN));
    }

    #[test]
    fn signed_zeros_are_equal_to_each_other_and_to_zero() {
        assert_eq!(FieldValue::Float(-0.0), FieldValue::Float(0.0));
        assert_eq!(FieldValue::Int(0), FieldValue::Float(-0.0));
    }

    #[test]
    fn sorting_mixed_numbers_is_consistent() {
        let big = 1i64 << 53;
        let mut values = vec![
            FieldValue::Int(big + 1),
            FieldValue::Float(big as f64),
            FieldValue::Int(big),
            FieldValue::Float(0.5),
            FieldValue::Int(0),
        ];
        values.sort();

        assert_eq!(
            values,
            vec![
                FieldValue::Int(0),
                FieldValue::Float(0.5),
                FieldValue::Float(big as f64),
                FieldValue::Int(big),
                FieldValue::Int(big + 1),
            ]
        );
        assert!(matches!(values[4], FieldValue::Int(v) if v == big + 1));
    }

    #[test]
    fn bare_prototype_yields_its_id() {
        let proto: Prototype<i64> = Prototype::Id(9);
        assert_eq!(proto.identifier("id"), Ok(9));
        assert!(!proto.is_structured());
    }

    #[test]
    fn record_without_id_field_is_rejected() {
        let proto: Prototype<i64> = Prototype::Record(record([("name", "x")]));
        assert!(matches!(
            proto.identifier("id"),
            Err(AggregateError::InvalidPrototype(_))
        ));
    }

    #[test]
    fn record_with_only_id_is_not_structured() {
        let proto: Prototype<i64> = Prototype::Record(record([("id", 4)]));
        assert_eq!(proto.identifier("id"), Ok(4));
        assert!(!proto.is_structured());

        let proto: Prototype<i64> = Prototype::Record(record([
            ("id", FieldValue::Int(4)),
            ("name", FieldValue::from("four")),
        ]));
        assert!(proto.is_structured());
    }

    #[test]
    fn bare_id_becomes_single_field_record() {
        let proto: Prototype<i64> = Prototype::Id(5);
        assert_eq!(proto.into_record("pk"), record([("pk", 5)]));
    }

    #[test]
    fn prototypes_deserialize_untagged() {
        let protos: Vec<Prototype<i64>> =
            serde_json::from_str(r#"[1, {"id": 2, "name": "b"}]"#).unwrap();
        assert_eq!(protos[0], Prototype::Id(1));
        assert!(protos[1].is_structured());
    }
}
