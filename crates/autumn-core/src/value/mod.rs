//! Values that cross the bridge.
//!
//! `Value` covers what callers pass in (scalars, sequences, arrays) and what
//! the payload container can hand back (text, cells, structs).
//!
//! # Normalization
//!
//! On the way into the engine every value goes through [`normalize`]:
//! integral scalars and integral arrays are widened to the session's
//! [`FloatPolicy`], and sequences become rectangular arrays. The engine and
//! the container disagree on default integer widths, so integers never
//! travel as integers.

mod array;
mod json;

pub use array::{Array, ArrayData, FloatPolicy};

use crate::error::{BridgeError, Result};

/// A value passed to or returned from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// A native list; becomes an array or a cell row on the way in.
    Sequence(Vec<Value>),
    Array(Array),
    Cell(Vec<Value>),
    Struct(StructArray),
}

impl Value {
    /// Scalar view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Array(a) if a.len() == 1 => a.to_f64_vec().first().copied(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten numeric content to f64 (column-major for arrays).
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::Array(a) => Some(a.to_f64_vec()),
            Value::Sequence(items) => items.iter().map(Value::as_f64).collect(),
            other => other.as_f64().map(|x| vec![x]),
        }
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Sequence(_) => "sequence",
            Value::Array(_) => "array",
            Value::Cell(_) => "cell",
            Value::Struct(_) => "struct",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

/// A struct array: every element carries the same fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructArray {
    fields: Vec<String>,
    elements: Vec<Vec<Value>>,
}

impl StructArray {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            elements: Vec::new(),
        }
    }

    /// Append one element; `values` are in field order.
    pub fn push(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(BridgeError::Validation {
                field: "struct".to_string(),
                message: format!(
                    "element has {} values for {} fields",
                    values.len(),
                    self.fields.len()
                ),
            });
        }
        self.elements.push(values);
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Vec<Value>] {
        &self.elements
    }

    /// One field across every element, or `None` if the field is unknown.
    pub fn column(&self, field: &str) -> Option<Vec<&Value>> {
        let idx = self.fields.iter().position(|f| f == field)?;
        Some(self.elements.iter().map(|e| &e[idx]).collect())
    }

    pub fn get(&self, element: usize, field: &str) -> Option<&Value> {
        let idx = self.fields.iter().position(|f| f == field)?;
        self.elements.get(element).map(|e| &e[idx])
    }
}

/// Apply the inbound normalization rules to one value.
///
/// `name` only labels errors.
pub fn normalize(name: &str, value: &Value, policy: FloatPolicy) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(float_scalar(*i as f64, policy)),
        Value::Float(_) | Value::Bool(_) | Value::Text(_) => Ok(value.clone()),
        Value::Array(a) => Ok(Value::Array(a.clone().widen_integral(policy))),
        Value::Sequence(items) => sequence_to_value(name, items, policy),
        Value::Cell(items) => items
            .iter()
            .map(|item| normalize(name, item, policy))
            .collect::<Result<Vec<_>>>()
            .map(Value::Cell),
        Value::Struct(_) => Err(BridgeError::encoding(
            name,
            "struct values cannot be sent to the engine",
        )),
    }
}

fn float_scalar(x: f64, policy: FloatPolicy) -> Value {
    match policy {
        FloatPolicy::F64 => Value::Float(x),
        FloatPolicy::F32 => Value::Array(Array::f32_scalar(x as f32)),
    }
}

fn sequence_to_value(name: &str, items: &[Value], policy: FloatPolicy) -> Result<Value> {
    if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Text(_))) {
        return Ok(Value::Cell(items.to_vec()));
    }
    let array = sequence_to_array(name, items)?;
    Ok(Value::Array(array.widen_integral(policy)))
}

/// Stack a (possibly nested) sequence into one array, numpy style: the
/// outermost sequence index becomes the first dimension.
fn sequence_to_array(name: &str, items: &[Value]) -> Result<Array> {
    if items.is_empty() {
        return Ok(Array::vector(Vec::new()));
    }

    let children = items
        .iter()
        .map(|item| match item {
            Value::Int(i) => Array::scalar(ArrayData::I64(vec![*i])),
            Value::Float(f) => Array::scalar(ArrayData::F64(vec![*f])),
            Value::Bool(b) => Array::scalar(ArrayData::Bool(vec![*b])),
            Value::Sequence(inner) => sequence_to_array(name, inner),
            Value::Array(a) => Ok(a.clone()),
            other => Err(BridgeError::encoding(
                name,
                format!("a sequence cannot hold a {} value", other.kind()),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    let inner_shape = children[0].shape().to_vec();
    if children.iter().any(|c| c.shape() != inner_shape.as_slice()) {
        return Err(BridgeError::encoding(
            name,
            "sequence is ragged and has no rectangular shape",
        ));
    }

    let n = children.len();
    let inner_len: usize = inner_shape.iter().product();
    let mut shape = Vec::with_capacity(inner_shape.len() + 1);
    shape.push(n);
    shape.extend_from_slice(&inner_shape);

    let data = if children.iter().all(|c| matches!(c.data(), ArrayData::Bool(_))) {
        let flat: Vec<Vec<bool>> = children
            .iter()
            .map(|c| c.to_f64_vec().into_iter().map(|x| x != 0.0).collect())
            .collect();
        ArrayData::Bool(interleave(&flat, n, inner_len))
    } else if children
        .iter()
        .all(|c| c.data().is_integral() || matches!(c.data(), ArrayData::Bool(_)))
    {
        let flat: Vec<Vec<i64>> = children
            .iter()
            .map(|c| c.to_f64_vec().into_iter().map(|x| x as i64).collect())
            .collect();
        ArrayData::I64(interleave(&flat, n, inner_len))
    } else {
        let flat: Vec<Vec<f64>> = children.iter().map(Array::to_f64_vec).collect();
        ArrayData::F64(interleave(&flat, n, inner_len))
    };

    Array::new(shape, data)
}

/// Column-major stacking: element `k` of child `i` lands at `i + n * k`.
fn interleave<T: Copy + Default>(children: &[Vec<T>], n: usize, inner_len: usize) -> Vec<T> {
    let mut out = vec![T::default(); n * inner_len];
    for (i, child) in children.iter().enumerate() {
        for (k, x) in child.iter().enumerate() {
            out[i + n * k] = *x;
        }
    }
    out
}
