//! Level-5 MAT reader.
//!
//! Handles what `save` produces by default: uncompressed and zlib-compressed
//! (`miCOMPRESSED`) variables, packed small elements, numeric data stored in
//! a narrower type than its class, logical, char, cell and struct arrays.

use std::io::Read;

use bytes::Buf;
use flate2::read::ZlibDecoder;

use super::format::*;
use super::Workspace;
use crate::error::{BridgeError, Result};
use crate::value::{Array, ArrayData, StructArray, Value};

pub(super) fn read_file(bytes: &[u8], squeeze: bool) -> Result<Workspace> {
    if bytes.len() < HEADER_LEN {
        return Err(BridgeError::decoding(format!(
            "file is {} bytes, shorter than a MAT header",
            bytes.len()
        )));
    }
    if bytes.starts_with(b"MATLAB 7.3") || bytes[HEADER_LEN..].starts_with(b"\x89HDF") {
        return Err(BridgeError::decoding("v7.3 (HDF5) MAT files are not supported"));
    }
    match &bytes[126..128] {
        e if e == ENDIAN_LE => {}
        e if e == ENDIAN_BE => {
            return Err(BridgeError::decoding("big-endian MAT files are not supported"))
        }
        _ => return Err(BridgeError::decoding("not a level-5 MAT file")),
    }

    let mut workspace = Workspace::new();
    read_elements(&bytes[HEADER_LEN..], squeeze, &mut workspace)?;
    Ok(workspace)
}

fn read_elements(mut buf: &[u8], squeeze: bool, workspace: &mut Workspace) -> Result<()> {
    while let Some(element) = next_element(&mut buf)? {
        match element.ty {
            MI_MATRIX => {
                let (name, value) = read_matrix(element.data, squeeze)?;
                workspace.insert(name, value);
            }
            MI_COMPRESSED => {
                let inflated = inflate(element.data)?;
                read_elements(&inflated, squeeze, workspace)?;
            }
            other => {
                return Err(BridgeError::decoding(format!(
                    "unexpected top-level element type {other}"
                )))
            }
        }
    }
    Ok(())
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| BridgeError::decoding(format!("corrupt compressed element: {e}")))?;
    Ok(out)
}

struct Element<'a> {
    ty: u32,
    data: &'a [u8],
}

/// Read one tagged element and advance past it (and its padding).
fn next_element<'a>(buf: &mut &'a [u8]) -> Result<Option<Element<'a>>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.remaining() < 8 {
        return Err(BridgeError::decoding("truncated element tag"));
    }
    let raw = buf.get_u32_le();

    // Small element: type and size share the first word, data the second.
    if raw >> 16 != 0 {
        let ty = raw & 0xffff;
        let size = (raw >> 16) as usize;
        if size > 4 {
            return Err(BridgeError::decoding("small element larger than 4 bytes"));
        }
        let whole: &'a [u8] = *buf;
        *buf = &whole[4..];
        return Ok(Some(Element {
            ty,
            data: &whole[..size],
        }));
    }

    let ty = raw;
    let size = buf.get_u32_le() as usize;
    let whole: &'a [u8] = *buf;
    if whole.len() < size {
        return Err(BridgeError::decoding(format!(
            "element of {size} bytes overruns the file"
        )));
    }
    let skip = if ty == MI_COMPRESSED {
        size
    } else {
        (size + padding(size)).min(whole.len())
    };
    *buf = &whole[skip..];
    Ok(Some(Element {
        ty,
        data: &whole[..size],
    }))
}

fn expect_element<'a>(buf: &mut &'a [u8], what: &str) -> Result<Element<'a>> {
    next_element(buf)?
        .ok_or_else(|| BridgeError::decoding(format!("matrix ends before its {what}")))
}

/// Numbers as stored on disk, before conversion to the array class.
enum Raw {
    Float(Vec<f64>),
    Int(Vec<i128>),
}

impl Raw {
    fn len(&self) -> usize {
        match self {
            Raw::Float(v) => v.len(),
            Raw::Int(v) => v.len(),
        }
    }
}

fn read_raw(element: &Element<'_>) -> Result<Raw> {
    let mut d = element.data;
    macro_rules! ints {
        ($width:expr, $get:ident) => {
            Raw::Int((0..d.len() / $width).map(|_| i128::from(d.$get())).collect())
        };
    }
    let raw = match element.ty {
        MI_DOUBLE => Raw::Float((0..d.len() / 8).map(|_| d.get_f64_le()).collect()),
        MI_SINGLE => Raw::Float((0..d.len() / 4).map(|_| f64::from(d.get_f32_le())).collect()),
        MI_INT8 => ints!(1, get_i8),
        MI_UINT8 => ints!(1, get_u8),
        MI_INT16 => ints!(2, get_i16_le),
        MI_UINT16 => ints!(2, get_u16_le),
        MI_INT32 => ints!(4, get_i32_le),
        MI_UINT32 => ints!(4, get_u32_le),
        MI_INT64 => ints!(8, get_i64_le),
        MI_UINT64 => ints!(8, get_u64_le),
        other => {
            return Err(BridgeError::decoding(format!(
                "element type {other} does not hold numbers"
            )))
        }
    };
    Ok(raw)
}

fn to_class(raw: Raw, class: u32, logical: bool) -> Result<ArrayData> {
    macro_rules! cast {
        ($variant:ident, $t:ty) => {
            ArrayData::$variant(match raw {
                Raw::Float(v) => v.into_iter().map(|x| x as $t).collect(),
                Raw::Int(v) => v.into_iter().map(|x| x as $t).collect(),
            })
        };
    }
    if logical {
        return Ok(ArrayData::Bool(match raw {
            Raw::Float(v) => v.into_iter().map(|x| x != 0.0).collect(),
            Raw::Int(v) => v.into_iter().map(|x| x != 0).collect(),
        }));
    }
    let data = match class {
        MX_DOUBLE => cast!(F64, f64),
        MX_SINGLE => cast!(F32, f32),
        MX_INT8 => cast!(I8, i8),
        MX_UINT8 => cast!(U8, u8),
        MX_INT16 => cast!(I16, i16),
        MX_UINT16 => cast!(U16, u16),
        MX_INT32 => cast!(I32, i32),
        MX_UINT32 => cast!(U32, u32),
        MX_INT64 => cast!(I64, i64),
        MX_UINT64 => cast!(U64, u64),
        other => return Err(BridgeError::decoding(format!("class {other} is not numeric"))),
    };
    Ok(data)
}

fn read_matrix(data: &[u8], squeeze: bool) -> Result<(String, Value)> {
    // MATLAB writes empty cell elements as zero-length matrices.
    if data.is_empty() {
        let empty = Array::new(vec![0, 0], ArrayData::F64(Vec::new()))?;
        return Ok((String::new(), Value::Array(empty)));
    }

    let mut buf = data;
    let flags_el = expect_element(&mut buf, "array flags")?;
    let mut flags_data = flags_el.data;
    if flags_data.remaining() < 4 {
        return Err(BridgeError::decoding("array flags element is too short"));
    }
    let flags = flags_data.get_u32_le();
    let class = flags & 0xff;

    let dims_el = expect_element(&mut buf, "dimensions")?;
    let mut dims_data = dims_el.data;
    let dims: Vec<usize> = (0..dims_data.len() / 4)
        .map(|_| dims_data.get_i32_le().max(0) as usize)
        .collect();
    let count: usize = dims.iter().product();

    let name_el = expect_element(&mut buf, "name")?;
    let name = String::from_utf8_lossy(name_el.data).into_owned();

    if flags & FLAG_COMPLEX != 0 {
        return Err(BridgeError::decoding(format!("{name}: complex arrays are not supported")));
    }

    let value = match class {
        MX_CELL => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let el = expect_element(&mut buf, "cell element")?;
                let (_, item) = read_matrix(el.data, squeeze)?;
                items.push(item);
            }
            if squeeze && items.len() == 1 {
                items.pop().unwrap_or(Value::Cell(Vec::new()))
            } else {
                Value::Cell(items)
            }
        }
        MX_STRUCT => Value::Struct(read_struct(&mut buf, count, squeeze)?),
        MX_CHAR => read_char(&expect_element(&mut buf, "char data")?, &dims)?,
        MX_DOUBLE | MX_SINGLE | MX_INT8 | MX_UINT8 | MX_INT16 | MX_UINT16 | MX_INT32
        | MX_UINT32 | MX_INT64 | MX_UINT64 => {
            let raw = if count == 0 {
                Raw::Float(Vec::new())
            } else {
                read_raw(&expect_element(&mut buf, "real part")?)?
            };
            if raw.len() != count {
                return Err(BridgeError::decoding(format!(
                    "{name}: {} values for dimensions {:?}",
                    raw.len(),
                    dims
                )));
            }
            let array = Array::new(dims, to_class(raw, class, flags & FLAG_LOGICAL != 0)?)?;
            numeric_value(array, squeeze)
        }
        MX_OBJECT => return Err(BridgeError::decoding(format!("{name}: objects are not supported"))),
        MX_SPARSE => {
            return Err(BridgeError::decoding(format!(
                "{name}: sparse arrays are not supported"
            )))
        }
        other => {
            return Err(BridgeError::decoding(format!(
                "{name}: array class {other} is not supported"
            )))
        }
    };
    Ok((name, value))
}

fn numeric_value(array: Array, squeeze: bool) -> Value {
    if !squeeze {
        return Value::Array(array);
    }
    let array = array.squeeze();
    if !array.shape().is_empty() {
        return Value::Array(array);
    }
    match array.into_data() {
        ArrayData::F64(v) => Value::Float(v[0]),
        ArrayData::F32(v) => Value::Float(f64::from(v[0])),
        ArrayData::Bool(v) => Value::Bool(v[0]),
        ArrayData::I8(v) => Value::Int(v[0].into()),
        ArrayData::I16(v) => Value::Int(v[0].into()),
        ArrayData::I32(v) => Value::Int(v[0].into()),
        ArrayData::I64(v) => Value::Int(v[0]),
        ArrayData::U8(v) => Value::Int(v[0].into()),
        ArrayData::U16(v) => Value::Int(v[0].into()),
        ArrayData::U32(v) => Value::Int(v[0].into()),
        ArrayData::U64(v) => match i64::try_from(v[0]) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(v[0] as f64),
        },
    }
}

fn read_char(element: &Element<'_>, dims: &[usize]) -> Result<Value> {
    let mut d = element.data;
    let units: Vec<u32> = match element.ty {
        MI_UINT16 | MI_UTF16 => (0..d.len() / 2).map(|_| u32::from(d.get_u16_le())).collect(),
        MI_UINT8 | MI_INT8 => d.iter().map(|b| u32::from(*b)).collect(),
        MI_UTF8 => String::from_utf8_lossy(d).chars().map(u32::from).collect(),
        MI_UTF32 => (0..d.len() / 4).map(|_| d.get_u32_le()).collect(),
        other => {
            return Err(BridgeError::decoding(format!(
                "element type {other} does not hold characters"
            )))
        }
    };

    let rows = dims.first().copied().unwrap_or(0);
    if rows <= 1 {
        return Ok(Value::Text(units_to_string(&units, element.ty)));
    }
    // Column-major char matrix: one text per row.
    let cols = units.len() / rows;
    let texts = (0..rows)
        .map(|r| {
            let row: Vec<u32> = (0..cols).map(|c| units[r + rows * c]).collect();
            Value::Text(units_to_string(&row, element.ty))
        })
        .collect();
    Ok(Value::Cell(texts))
}

fn units_to_string(units: &[u32], ty: u32) -> String {
    if ty == MI_UINT16 || ty == MI_UTF16 {
        let wide: Vec<u16> = units.iter().map(|u| *u as u16).collect();
        String::from_utf16_lossy(&wide)
    } else {
        units
            .iter()
            .map(|u| char::from_u32(*u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

fn read_struct(buf: &mut &[u8], count: usize, squeeze: bool) -> Result<StructArray> {
    let len_el = expect_element(buf, "field name length")?;
    let mut len_data = len_el.data;
    if len_data.remaining() < 4 {
        return Err(BridgeError::decoding("field name length element is too short"));
    }
    let name_len = len_data.get_i32_le().max(1) as usize;

    let names_el = expect_element(buf, "field names")?;
    let fields: Vec<String> = names_el
        .data
        .chunks(name_len)
        .map(|chunk| {
            let end = chunk.iter().position(|b| *b == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        })
        .filter(|f| !f.is_empty())
        .collect();

    let mut out = StructArray::new(fields.clone());
    for _ in 0..count {
        let mut values = Vec::with_capacity(fields.len());
        for _ in &fields {
            let el = expect_element(buf, "struct field")?;
            let (_, value) = read_matrix(el.data, squeeze)?;
            values.push(value);
        }
        out.push(values)?;
    }
    Ok(out)
}
