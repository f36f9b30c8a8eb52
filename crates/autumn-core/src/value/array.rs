//! Rectangular typed arrays.
//!
//! Data is stored column-major, the layout the engine and the MAT container
//! use. A shape of `[]` is a 0-d array holding exactly one element.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Float width used when widening integral values on the way in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatPolicy {
    #[default]
    F64,
    F32,
}

/// Element storage of an [`Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
}

macro_rules! each_numeric {
    ($data:expr, $v:ident => $body:expr, bool $b:ident => $bool_body:expr) => {
        match $data {
            ArrayData::F64($v) => $body,
            ArrayData::F32($v) => $body,
            ArrayData::I8($v) => $body,
            ArrayData::I16($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::U8($v) => $body,
            ArrayData::U16($v) => $body,
            ArrayData::U32($v) => $body,
            ArrayData::U64($v) => $body,
            ArrayData::Bool($b) => $bool_body,
        }
    };
}

impl ArrayData {
    pub fn len(&self) -> usize {
        each_numeric!(self, v => v.len(), bool b => b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the element type is an integer type (bool is not).
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ArrayData::I8(_)
                | ArrayData::I16(_)
                | ArrayData::I32(_)
                | ArrayData::I64(_)
                | ArrayData::U8(_)
                | ArrayData::U16(_)
                | ArrayData::U32(_)
                | ArrayData::U64(_)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ArrayData::F64(_) | ArrayData::F32(_))
    }

    /// Short dtype name, numpy style.
    pub fn dtype_name(&self) -> &'static str {
        match self {
            ArrayData::F64(_) => "float64",
            ArrayData::F32(_) => "float32",
            ArrayData::I8(_) => "int8",
            ArrayData::I16(_) => "int16",
            ArrayData::I32(_) => "int32",
            ArrayData::I64(_) => "int64",
            ArrayData::U8(_) => "uint8",
            ArrayData::U16(_) => "uint16",
            ArrayData::U32(_) => "uint32",
            ArrayData::U64(_) => "uint64",
            ArrayData::Bool(_) => "bool",
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_numeric!(
            self,
            v => v.iter().map(|x| *x as f64).collect(),
            bool b => b.iter().map(|x| if *x { 1.0 } else { 0.0 }).collect()
        )
    }

    /// Cast to the float width of `policy`.
    pub fn cast_float(&self, policy: FloatPolicy) -> ArrayData {
        match policy {
            FloatPolicy::F64 => ArrayData::F64(self.to_f64_vec()),
            FloatPolicy::F32 => match self {
                ArrayData::F32(v) => ArrayData::F32(v.clone()),
                other => ArrayData::F32(other.to_f64_vec().into_iter().map(|x| x as f32).collect()),
            },
        }
    }
}

/// A rectangular array of one element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    data: ArrayData,
}

impl Array {
    /// Build an array from a shape and column-major data.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(BridgeError::Validation {
                field: "shape".to_string(),
                message: format!(
                    "shape {:?} needs {} elements, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// A 1-D float array.
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::F64(values),
        }
    }

    /// A 0-d array holding one element.
    pub fn scalar(data: ArrayData) -> Result<Self> {
        Self::new(Vec::new(), data)
    }

    pub fn f32_scalar(x: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: ArrayData::F32(vec![x]),
        }
    }

    /// A 2-D float array from row-major rows. Rows must have equal length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(BridgeError::Validation {
                field: "rows".to_string(),
                message: "rows have different lengths".to_string(),
            });
        }
        let mut data = Vec::with_capacity(nrows * ncols);
        for c in 0..ncols {
            for row in rows {
                data.push(row[c]);
            }
        }
        Self::new(vec![nrows, ncols], ArrayData::F64(data))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Elements as f64, column-major.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.to_f64_vec()
    }

    /// Element at a full index, as f64.
    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        let mut stride = 1;
        for (i, dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset += i * stride;
            stride *= dim;
        }
        self.to_f64_vec().get(offset).copied()
    }

    /// Cast integral arrays to the policy's float width. Other arrays are
    /// returned unchanged.
    pub fn widen_integral(self, policy: FloatPolicy) -> Self {
        if self.data.is_integral() {
            Self {
                data: self.data.cast_float(policy),
                shape: self.shape,
            }
        } else {
            self
        }
    }

    /// Drop every dimension of length one.
    pub fn squeeze(self) -> Self {
        let shape = self.shape.into_iter().filter(|d| *d != 1).collect();
        Self {
            shape,
            data: self.data,
        }
    }
}
