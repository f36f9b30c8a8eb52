//! Level-5 MAT writer.
//!
//! Every variable is written as one uncompressed `miMATRIX`. 0-d and 1-D
//! arrays are written as rows (`1 x n`), struct arrays as columns (`n x 1`).
//! Variables past the format's 2 GiB element limit, or with a dimension
//! above `i32::MAX`, are encoding errors.

use bytes::{BufMut, BytesMut};

use super::format::*;
use crate::error::{BridgeError, Result};
use crate::value::{Array, ArrayData, Value};

pub(super) fn write_file(vars: &[(String, Value)]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 64 * vars.len());
    write_header(&mut buf);
    for (name, value) in vars {
        write_matrix(&mut buf, name, name, value)?;
    }
    Ok(buf.to_vec())
}

fn write_header(buf: &mut BytesMut) {
    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: autumn-bridge {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );
    let mut header = text.into_bytes();
    header.resize(HEADER_TEXT_LEN, b' ');
    buf.put_slice(&header);
    // Subsystem data offset: unused.
    buf.put_bytes(0, 8);
    buf.put_u16_le(VERSION);
    buf.put_slice(ENDIAN_LE);
}

/// Largest element body a level-5 file can describe.
const MAX_ELEMENT_LEN: usize = i32::MAX as usize;

fn element_len(label: &str, len: usize) -> Result<u32> {
    if len > MAX_ELEMENT_LEN {
        return Err(BridgeError::encoding(
            label,
            format!("{len} bytes exceeds the MAT element limit of {MAX_ELEMENT_LEN}"),
        ));
    }
    u32::try_from(len).map_err(|_| BridgeError::encoding(label, format!("{len} bytes is too large")))
}

fn dimension(label: &str, d: usize) -> Result<i32> {
    i32::try_from(d)
        .map_err(|_| BridgeError::encoding(label, format!("dimension {d} exceeds {}", i32::MAX)))
}

/// Write a tagged element and pad it to 8 bytes.
fn write_element(buf: &mut BytesMut, label: &str, ty: u32, data: &[u8]) -> Result<()> {
    buf.put_u32_le(ty);
    buf.put_u32_le(element_len(label, data.len())?);
    buf.put_slice(data);
    buf.put_bytes(0, padding(data.len()));
    Ok(())
}

/// Write one `miMATRIX`. `label` names the top-level variable in errors.
fn write_matrix(buf: &mut BytesMut, label: &str, name: &str, value: &Value) -> Result<()> {
    let mut body = BytesMut::new();
    match value {
        Value::Float(f) => {
            write_header_parts(&mut body, label, MX_DOUBLE, 0, &[1, 1], name)?;
            write_element(&mut body, label, MI_DOUBLE, &f.to_le_bytes())?;
        }
        Value::Int(i) => {
            write_header_parts(&mut body, label, MX_INT64, 0, &[1, 1], name)?;
            write_element(&mut body, label, MI_INT64, &i.to_le_bytes())?;
        }
        Value::Bool(b) => {
            write_header_parts(&mut body, label, MX_UINT8, FLAG_LOGICAL, &[1, 1], name)?;
            write_element(&mut body, label, MI_UINT8, &[u8::from(*b)])?;
        }
        Value::Text(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let dims = if units.is_empty() { [0, 0] } else { [1, units.len()] };
            write_header_parts(&mut body, label, MX_CHAR, 0, &dims, name)?;
            let mut data = BytesMut::with_capacity(units.len() * 2);
            for u in units {
                data.put_u16_le(u);
            }
            write_element(&mut body, label, MI_UINT16, &data)?;
        }
        Value::Array(a) => write_array(&mut body, label, a, name)?,
        Value::Cell(items) => {
            let dims = if items.is_empty() { [0, 0] } else { [1, items.len()] };
            write_header_parts(&mut body, label, MX_CELL, 0, &dims, name)?;
            for item in items {
                write_matrix(&mut body, label, "", item)?;
            }
        }
        Value::Sequence(_) => {
            return Err(BridgeError::encoding(
                label,
                "sequences must be normalized to arrays before encoding",
            ))
        }
        Value::Struct(s) => {
            let dims = [s.len(), 1];
            write_header_parts(&mut body, label, MX_STRUCT, 0, &dims, name)?;
            let name_len = s.fields().iter().map(String::len).max().unwrap_or(0) + 1;
            write_element(
                &mut body,
                label,
                MI_INT32,
                &dimension(label, name_len)?.to_le_bytes(),
            )?;
            let mut names = BytesMut::with_capacity(name_len * s.fields().len());
            for field in s.fields() {
                names.put_slice(field.as_bytes());
                names.put_bytes(0, name_len - field.len());
            }
            write_element(&mut body, label, MI_INT8, &names)?;
            for element in s.elements() {
                for item in element {
                    write_matrix(&mut body, label, "", item)?;
                }
            }
        }
    }
    write_element(buf, label, MI_MATRIX, &body)
}

fn write_header_parts(
    body: &mut BytesMut,
    label: &str,
    class: u32,
    flags: u32,
    dims: &[usize],
    name: &str,
) -> Result<()> {
    let mut flag_data = BytesMut::with_capacity(8);
    flag_data.put_u32_le(class | flags);
    flag_data.put_u32_le(0);
    write_element(body, label, MI_UINT32, &flag_data)?;

    let mut dim_data = BytesMut::with_capacity(dims.len() * 4);
    for d in dims {
        dim_data.put_i32_le(dimension(label, *d)?);
    }
    write_element(body, label, MI_INT32, &dim_data)?;

    write_element(body, label, MI_INT8, name.as_bytes())
}

fn write_array(body: &mut BytesMut, label: &str, array: &Array, name: &str) -> Result<()> {
    let dims: Vec<usize> = match array.shape() {
        [] => vec![1, 1],
        [n] => vec![1, *n],
        shape => shape.to_vec(),
    };

    macro_rules! numeric {
        ($class:expr, $mi:expr, $values:expr, $put:ident) => {{
            write_header_parts(body, label, $class, 0, &dims, name)?;
            let mut data = BytesMut::with_capacity($values.len() * 8);
            for x in $values {
                data.$put(*x);
            }
            write_element(body, label, $mi, &data)
        }};
    }

    match array.data() {
        ArrayData::F64(v) => numeric!(MX_DOUBLE, MI_DOUBLE, v, put_f64_le),
        ArrayData::F32(v) => numeric!(MX_SINGLE, MI_SINGLE, v, put_f32_le),
        ArrayData::I8(v) => numeric!(MX_INT8, MI_INT8, v, put_i8),
        ArrayData::I16(v) => numeric!(MX_INT16, MI_INT16, v, put_i16_le),
        ArrayData::I32(v) => numeric!(MX_INT32, MI_INT32, v, put_i32_le),
        ArrayData::I64(v) => numeric!(MX_INT64, MI_INT64, v, put_i64_le),
        ArrayData::U8(v) => numeric!(MX_UINT8, MI_UINT8, v, put_u8),
        ArrayData::U16(v) => numeric!(MX_UINT16, MI_UINT16, v, put_u16_le),
        ArrayData::U32(v) => numeric!(MX_UINT32, MI_UINT32, v, put_u32_le),
        ArrayData::U64(v) => numeric!(MX_UINT64, MI_UINT64, v, put_u64_le),
        ArrayData::Bool(v) => {
            write_header_parts(body, label, MX_UINT8, FLAG_LOGICAL, &dims, name)?;
            let data: Vec<u8> = v.iter().map(|b| u8::from(*b)).collect();
            write_element(body, label, MI_UINT8, &data)
        }
    }
}
