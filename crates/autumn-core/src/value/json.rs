//! JSON conversion for values.

use serde_json::{Map, Number, Value as Json};

use super::{Array, ArrayData, Value};
use crate::error::{BridgeError, Result};

impl Value {
    /// Build a value from JSON. Objects and nulls have no inbound meaning.
    pub fn from_json(json: &Json) -> Result<Value> {
        match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| BridgeError::encoding("json", format!("{n} is out of range"))),
            },
            Json::String(s) => Ok(Value::Text(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Json::Null => Err(BridgeError::encoding("json", "null has no engine value")),
            Json::Object(_) => Err(BridgeError::encoding(
                "json",
                "objects cannot be sent to the engine",
            )),
        }
    }

    /// Render a value as JSON. Arrays become nested row-major lists.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => float_json(*f),
            Value::Bool(b) => Json::Bool(*b),
            Value::Text(s) => Json::String(s.clone()),
            Value::Sequence(items) | Value::Cell(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Array(a) => array_json(a),
            Value::Struct(s) => {
                let records: Vec<Json> = s
                    .elements()
                    .iter()
                    .map(|element| {
                        let map: Map<String, Json> = s
                            .fields()
                            .iter()
                            .cloned()
                            .zip(element.iter().map(Value::to_json))
                            .collect();
                        Json::Object(map)
                    })
                    .collect();
                if records.len() == 1 {
                    records.into_iter().next().unwrap_or(Json::Null)
                } else {
                    Json::Array(records)
                }
            }
        }
    }
}

fn float_json(f: f64) -> Json {
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}

fn element_json(data: &ArrayData, i: usize) -> Json {
    match data {
        ArrayData::Bool(v) => Json::Bool(v[i]),
        ArrayData::F64(v) => float_json(v[i]),
        ArrayData::F32(v) => float_json(f64::from(v[i])),
        ArrayData::I8(v) => Json::from(v[i]),
        ArrayData::I16(v) => Json::from(v[i]),
        ArrayData::I32(v) => Json::from(v[i]),
        ArrayData::I64(v) => Json::from(v[i]),
        ArrayData::U8(v) => Json::from(v[i]),
        ArrayData::U16(v) => Json::from(v[i]),
        ArrayData::U32(v) => Json::from(v[i]),
        ArrayData::U64(v) => Json::from(v[i]),
    }
}

fn array_json(a: &Array) -> Json {
    let shape = a.shape();
    if shape.is_empty() {
        return element_json(a.data(), 0);
    }
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for dim in shape {
        strides.push(stride);
        stride *= dim;
    }
    nest(a.data(), shape, &strides, 0, 0)
}

fn nest(data: &ArrayData, shape: &[usize], strides: &[usize], dim: usize, offset: usize) -> Json {
    if dim == shape.len() {
        return element_json(data, offset);
    }
    Json::Array(
        (0..shape[dim])
            .map(|i| nest(data, shape, strides, dim + 1, offset + i * strides[dim]))
            .collect(),
    )
}
