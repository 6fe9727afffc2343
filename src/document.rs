//! Documents and the expressions that select and change them.
//!
//! A [`Document`] is an insertion-ordered JSON object. Filters are flat equality
//! matches, updates either merge or replace top-level fields, and every document
//! carries an identity under [`ID_FIELD`].

use crate::{Error, Result, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered mapping from field name to value.
pub type Document = Map<String, Value>;

/// A flat equality query: every listed field must be present and deep-equal.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Filter(Document);

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self(Document::new())
    }

    /// Builds a filter from a document, rejecting operator fields.
    pub fn new(fields: Document) -> Result<Self> {
        if let Some(key) = fields.keys().find(|k| k.starts_with('$')) {
            return Err(Error::Validation(format!(
                "unsupported query operator {:?}: only equality matching is available",
                key
            )));
        }
        Ok(Self(fields))
    }

    /// A single-field equality filter.
    pub fn eq(field: &str, value: impl Into<Value>) -> Result<Self> {
        let mut fields = Document::new();
        fields.insert(field.to_string(), value.into());
        Self::new(fields)
    }

    /// Adds another equality condition.
    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        if field.starts_with('$') {
            return Err(Error::Validation(format!("unsupported query operator {:?}", field)));
        }
        self.0.insert(field.to_string(), value.into());
        Ok(self)
    }

    /// True when the filter matches every document.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The field/value pairs a document must carry.
    pub fn fields(&self) -> &Document {
        &self.0
    }

    /// Whether every listed field is present in `doc` and equal by [`values_equal`].
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| doc.get(field).map_or(false, |actual| values_equal(actual, expected)))
    }
}

impl TryFrom<Value> for Filter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(fields) => Self::new(fields),
            other => Err(Error::Validation(format!(
                "query must be a mapping of field to value, got {}",
                type_name(&other)
            ))),
        }
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        Value::Object(filter.0)
    }
}

/// How `update_one` changes the matched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Update {
    /// Merge the named top-level fields, leaving every other field untouched.
    Set(Document),
    /// Replace every top-level field, keeping the document's identity.
    Replace(Document),
}

impl Update {
    /// Shorthand for a single-field [`Update::Set`].
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        let mut fields = Document::new();
        fields.insert(field.to_string(), value.into());
        Update::Set(fields)
    }

    /// Parses a driver-style update expression.
    ///
    /// `{"$set": {...}}` and a bare document both merge; any other `$` operator is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(Error::Validation(format!(
                    "update must be a mapping, got {}",
                    type_name(&other)
                )))
            }
        };

        if let Some(set) = fields.remove("$set") {
            if let Some(key) = fields.keys().next() {
                return Err(Error::Validation(format!(
                    "cannot combine $set with {:?} in one update",
                    key
                )));
            }
            fields = match set {
                Value::Object(set) => set,
                other => {
                    return Err(Error::Validation(format!(
                        "$set must be a mapping, got {}",
                        type_name(&other)
                    )))
                }
            };
        }

        let update = Update::Set(fields);
        update.validate()?;
        Ok(update)
    }

    fn fields(&self) -> &Document {
        match self {
            Update::Set(fields) | Update::Replace(fields) => fields,
        }
    }

    /// Checks the expression before any document is touched.
    pub fn validate(&self) -> Result<()> {
        match self.fields().keys().find(|k| k.starts_with('$')) {
            Some(key) => Err(Error::Validation(format!("unsupported update operator {:?}", key))),
            None => Ok(()),
        }
    }

    /// Applies the update to `doc`. Returns whether any field actually changed.
    ///
    /// The identity may be restated but never changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool> {
        self.validate()?;
        if let (Some(current), Some(requested)) = (doc.get(ID_FIELD), self.fields().get(ID_FIELD)) {
            if !values_equal(current, requested) {
                return Err(Error::Validation(format!(
                    "the {} field is immutable",
                    ID_FIELD
                )));
            }
        }

        let before = doc.clone();
        match self {
            Update::Set(fields) => {
                for (k, v) in fields {
                    doc.insert(k.clone(), v.clone());
                }
            }
            Update::Replace(fields) => {
                let id = doc.remove(ID_FIELD);
                doc.clear();
                if let Some(id) = id {
                    doc.insert(ID_FIELD.to_string(), id);
                }
                for (k, v) in fields {
                    doc.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(*doc != before)
    }
}

impl TryFrom<Value> for Update {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Update::from_value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Makes sure `doc` carries an identity and returns it.
///
/// A missing identity becomes a fresh UUID string placed first in the document.
pub fn ensure_id(doc: &mut Document) -> Result<Value> {
    if let Some(key) = doc.keys().find(|k| k.starts_with('$')) {
        return Err(Error::Validation(format!("field names may not start with '$': {:?}", key)));
    }
    match doc.get(ID_FIELD) {
        Some(Value::Array(_)) => Err(Error::Validation(format!(
            "the {} field may not be an array",
            ID_FIELD
        ))),
        Some(id) => Ok(id.clone()),
        None => {
            let id = Value::String(uuid::Uuid::new_v4().to_string());
            let mut with_id = Document::with_capacity(doc.len() + 1);
            with_id.insert(ID_FIELD.to_string(), id.clone());
            with_id.append(doc);
            *doc = with_id;
            Ok(id)
        }
    }
}

/// Collects the unique values of `field`, in first-seen order.
pub fn distinct_values<'a, I>(docs: I, field: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut values: Vec<Value> = Vec::new();
    for value in docs.into_iter().filter_map(|d| d.get(field)) {
        if !values.iter().any(|seen| values_equal(seen, value)) {
            values.push(value.clone());
        }
    }
    values
}

/// Deep equality where numbers compare by value, so `5` and `5.0` are equal.
///
/// Integers are compared exactly; a float equals an integer only when it has no
/// fractional part and converts without loss.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    match (as_integer(x), as_integer(y)) {
        (Some(i), Some(j)) => i == j,
        (Some(i), None) => float_equals_integer(y.as_f64(), i),
        (None, Some(j)) => float_equals_integer(x.as_f64(), j),
        (None, None) => x.as_f64() == y.as_f64(),
    }
}

fn as_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

fn float_equals_integer(f: Option<f64>, i: i128) -> bool {
    match f {
        // 2^64 bounds the u64 range; anything outside cannot equal a stored integer.
        Some(f) if f.fract() == 0.0 && f.abs() < 18_446_744_073_709_551_616.0 => f as i128 == i,
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_filter_matches_by_deep_equality() {
        let d = doc(json!({"product_id": 5, "tags": ["a", "b"], "meta": {"x": 1}}));

        assert!(Filter::all().matches(&d));
        assert!(Filter::eq("product_id", 5).unwrap().matches(&d));
        assert!(Filter::eq("tags", json!(["a", "b"])).unwrap().matches(&d));
        assert!(Filter::eq("meta", json!({"x": 1})).unwrap().matches(&d));
        assert!(!Filter::eq("tags", json!(["b", "a"])).unwrap().matches(&d));
        assert!(!Filter::eq("product_id", "5").unwrap().matches(&d));
    }

    #[test]
    fn test_filter_missing_field_never_matches() {
        let d = doc(json!({"a": 1}));
        assert!(!Filter::eq("b", Value::Null).unwrap().matches(&d));

        let f = Filter::eq("a", 1).unwrap().and("b", 2).unwrap();
        assert!(!f.matches(&d));
    }

    #[test]
    fn test_filter_rejects_non_mapping_and_operators() {
        assert!(matches!(Filter::try_from(json!([1, 2])), Err(Error::Validation(_))));
        assert!(matches!(Filter::try_from(json!("x")), Err(Error::Validation(_))));
        assert!(matches!(Filter::try_from(json!({"$or": []})), Err(Error::Validation(_))));
        assert!(matches!(Filter::eq("$where", 1), Err(Error::Validation(_))));
        assert!(Filter::try_from(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_filter_deserialize_validates() {
        let f: Filter = serde_json::from_value(json!({"product_id": 101})).unwrap();
        assert_eq!(f, Filter::eq("product_id", 101).unwrap());
        assert!(serde_json::from_value::<Filter>(json!(3)).is_err());
    }

    #[test]
    fn test_update_set_merges_named_fields() {
        let mut d = doc(json!({"_id": "x", "product_id": 101, "name": "X"}));
        let changed = Update::set("name", "Y").apply(&mut d).unwrap();

        assert!(changed);
        assert_eq!(Value::Object(d), json!({"_id": "x", "product_id": 101, "name": "Y"}));
    }

    #[test]
    fn test_update_replace_keeps_identity() {
        let mut d = doc(json!({"_id": "x", "product_id": 101, "name": "X"}));
        Update::Replace(doc(json!({"name": "Z"}))).apply(&mut d).unwrap();

        assert_eq!(Value::Object(d), json!({"_id": "x", "name": "Z"}));
    }

    #[test]
    fn test_update_reports_no_change() {
        let mut d = doc(json!({"_id": "x", "name": "X"}));
        assert!(!Update::set("name", "X").apply(&mut d).unwrap());
    }

    #[test]
    fn test_update_rejects_identity_change() {
        let mut d = doc(json!({"_id": "x", "name": "X"}));
        let res = Update::set(ID_FIELD, "y").apply(&mut d);
        assert!(matches!(res, Err(Error::Validation(_))));
        assert_eq!(d.get("_id"), Some(&json!("x")));

        assert!(Update::set(ID_FIELD, "x").apply(&mut d).is_ok());
    }

    #[test]
    fn test_update_from_value() {
        assert_eq!(
            Update::from_value(json!({"$set": {"name": "Y"}})).unwrap(),
            Update::set("name", "Y")
        );
        assert_eq!(Update::from_value(json!({"name": "Y"})).unwrap(), Update::set("name", "Y"));
        assert!(matches!(
            Update::from_value(json!({"$inc": {"stock": 1}})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(Update::from_value(json!({"$set": 1})), Err(Error::Validation(_))));
        assert!(matches!(
            Update::from_value(json!({"$set": {"a": 1}, "b": 2})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(Update::from_value(json!(null)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_ensure_id_assigns_once() {
        let mut d = doc(json!({"name": "X"}));
        let id = ensure_id(&mut d).unwrap();

        assert!(id.is_string());
        assert_eq!(d.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(ensure_id(&mut d).unwrap(), id);
    }

    #[test]
    fn test_ensure_id_keeps_caller_identity() {
        let mut d = doc(json!({"_id": 7, "name": "X"}));
        assert_eq!(ensure_id(&mut d).unwrap(), json!(7));

        let mut bad = doc(json!({"_id": [1]}));
        assert!(matches!(ensure_id(&mut bad), Err(Error::Validation(_))));

        let mut op = doc(json!({"$where": "1"}));
        assert!(matches!(ensure_id(&mut op), Err(Error::Validation(_))));
    }

    #[test]
    fn test_values_equal_compares_numbers_by_value() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(values_equal(&json!(5.0), &json!(5)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(values_equal(&json!(-3), &json!(-3.0)));
        assert!(!values_equal(&json!(5), &json!(5.5)));
        assert!(!values_equal(&json!(5), &json!("5")));
        assert!(!values_equal(&json!(9_007_199_254_740_993i64), &json!(9_007_199_254_740_992.0)));
        assert!(values_equal(&json!([1, {"a": 2.0}]), &json!([1.0, {"a": 2}])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_filter_matches_float_written_field() {
        let d = doc(json!({"product_id": 5.0}));
        assert!(Filter::eq("product_id", 5).unwrap().matches(&d));
    }

    #[test]
    fn test_update_allows_restating_identity_numerically() {
        let mut d = doc(json!({"_id": 7, "n": 1}));
        assert!(Update::set(ID_FIELD, 7.0).apply(&mut d).is_ok());
    }

    #[test]
    fn test_distinct_values_collapses_and_skips_missing() {
        let docs = vec![
            doc(json!({"category": "Electronics"})),
            doc(json!({"category": "Footwear"})),
            doc(json!({"category": "Electronics"})),
            doc(json!({"name": "no category"})),
            doc(json!({"category": ["a"]})),
            doc(json!({"category": ["a"]})),
        ];

        let values = distinct_values(&docs, "category");
        assert_eq!(values, vec![json!("Electronics"), json!("Footwear"), json!(["a"])]);
    }

    #[test]
    fn test_distinct_values_collapses_equal_numbers() {
        let docs = vec![doc(json!({"product_id": 5.0})), doc(json!({"product_id": 5}))];
        assert_eq!(distinct_values(&docs, "product_id").len(), 1);
    }
}
