//! ESRF Data Format (EDF) frames.
//!
//! An EDF file is an ASCII header of `key = value ;` lines wrapped in braces
//! and padded to a multiple of 512 bytes, followed by the raw pixel block.
//! `Dim_1` is the fast (column) axis and `Dim_2` the row axis.

use ndarray::Array2;
use std::collections::BTreeMap;

/// Header blocks are padded to this size.
const HEADER_BLOCK: usize = 512;

/// Pixel storage types found in EDF headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdfDataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl EdfDataType {
    /// Parse a `DataType` header value (case-insensitive, common aliases).
    pub fn parse(s: &str) -> Option<Self> {
        let t = match s.trim().to_lowercase().as_str() {
            "signedbyte" => Self::I8,
            "unsignedbyte" => Self::U8,
            "signedshort" => Self::I16,
            "unsignedshort" | "unsignedshortinteger" => Self::U16,
            "signedinteger" | "signedlong" | "signed32" => Self::I32,
            "unsignedinteger" | "unsignedlong" | "unsigned32" => Self::U32,
            "signed64" => Self::I64,
            "unsigned64" => Self::U64,
            "floatvalue" | "float" | "floatieee32" | "float32" | "real" => Self::F32,
            "doublevalue" | "double" | "doubleieee64" | "float64" => Self::F64,
            _ => return None,
        };
        Some(t)
    }

    /// Bytes per pixel.
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn read(self, bytes: &[u8], little_endian: bool) -> f64 {
        macro_rules! num {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                if little_endian {
                    <$t>::from_le_bytes(buf) as f64
                } else {
                    <$t>::from_be_bytes(buf) as f64
                }
            }};
        }
        match self {
            Self::I8 => bytes[0] as i8 as f64,
            Self::U8 => bytes[0] as f64,
            Self::I16 => num!(i16, 2),
            Self::U16 => num!(u16, 2),
            Self::I32 => num!(i32, 4),
            Self::U32 => num!(u32, 4),
            Self::I64 => num!(i64, 8),
            Self::U64 => num!(u64, 8),
            Self::F32 => num!(f32, 4),
            Self::F64 => num!(f64, 8),
        }
    }
}

/// A decoded EDF frame.
#[derive(Debug, Clone)]
pub struct EdfFrame {
    /// Header key/value pairs as written in the file
    pub header: BTreeMap<String, String>,
    /// Pixel values, shape (rows, cols)
    pub data: Array2<f64>,
}

/// Returns true if `bytes` start like an EDF header.
pub fn looks_like_edf(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Parse an EDF file held in memory.
///
/// Errors are plain messages; the caller attaches the path.
pub fn parse(bytes: &[u8]) -> Result<EdfFrame, String> {
    let open = bytes
        .iter()
        .position(|&b| b == b'{')
        .ok_or("missing EDF header start '{'")?;
    let close = bytes[open..]
        .iter()
        .position(|&b| b == b'}')
        .map(|p| open + p)
        .ok_or("missing EDF header end '}'")?;

    let header_text = std::str::from_utf8(&bytes[open + 1..close])
        .map_err(|_| "EDF header is not valid ASCII".to_string())?;
    let header = parse_header(header_text);

    let mut data_start = close + 1;
    if bytes.get(data_start) == Some(&b'\r') {
        data_start += 1;
    }
    if bytes.get(data_start) == Some(&b'\n') {
        data_start += 1;
    }

    let cols = dimension(&header, "Dim_1")?;
    let rows = dimension(&header, "Dim_2")?;
    let data_type = header
        .get("DataType")
        .map(|v| EdfDataType::parse(v).ok_or_else(|| format!("unknown EDF DataType {v:?}")))
        .transpose()?
        .unwrap_or(EdfDataType::U16);
    let little_endian = match header.get("ByteOrder").map(|v| v.to_lowercase()) {
        None => true,
        Some(order) if order == "lowbytefirst" => true,
        Some(order) if order == "highbytefirst" => false,
        Some(order) => return Err(format!("unknown EDF ByteOrder {order:?}")),
    };

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(data_type.size()))
        .ok_or("EDF dimensions overflow")?;
    if let Some(size) = header.get("Size") {
        let declared: usize = size
            .parse()
            .map_err(|_| format!("invalid EDF Size {size:?}"))?;
        if declared < expected {
            return Err(format!(
                "EDF Size {declared} is smaller than {rows}x{cols} pixels of {data_type:?}"
            ));
        }
    }

    let payload = &bytes[data_start.min(bytes.len())..];
    if payload.len() < expected {
        return Err(format!(
            "truncated EDF data: expected {expected} bytes, found {}",
            payload.len()
        ));
    }

    let values: Vec<f64> = payload[..expected]
        .chunks_exact(data_type.size())
        .map(|px| data_type.read(px, little_endian))
        .collect();
    let data = Array2::from_shape_vec((rows, cols), values).map_err(|e| e.to_string())?;

    Ok(EdfFrame { header, data })
}

fn parse_header(text: &str) -> BTreeMap<String, String> {
    text.split(';')
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn dimension(header: &BTreeMap<String, String>, key: &str) -> Result<usize, String> {
    let value = header
        .get(key)
        .ok_or_else(|| format!("EDF header missing {key}"))?;
    match value.parse::<usize>() {
        Ok(0) => Err(format!("EDF {key} is zero")),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("invalid EDF {key} {value:?}")),
    }
}

/// Encode a 16-bit frame as a little-endian EDF file.
pub fn encode_u16(data: &Array2<u16>) -> Vec<u8> {
    let (rows, cols) = data.dim();
    let size = rows * cols * 2;
    let mut header = format!(
        "{{\nHeaderID = EH:000001:000000:000000 ;\nImage = 1 ;\nByteOrder = LowByteFirst ;\n\
         DataType = UnsignedShort ;\nDim_1 = {cols} ;\nDim_2 = {rows} ;\nSize = {size} ;\n"
    );
    // Pad so that header plus the closing "}\n" fills whole blocks
    let used = header.len() + 2;
    let padded = used.div_ceil(HEADER_BLOCK) * HEADER_BLOCK;
    header.push_str(&" ".repeat(padded - used));
    header.push_str("}\n");

    let mut out = header.into_bytes();
    out.reserve(size);
    for v in data.iter() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse_u16() {
        let data = Array2::from_shape_fn((3, 4), |(r, c)| (r * 100 + c) as u16);
        let bytes = encode_u16(&data);
        assert_eq!((bytes.len() - 24) % HEADER_BLOCK, 0);

        let frame = parse(&bytes).unwrap();
        assert_eq!(frame.data.dim(), (3, 4));
        assert_eq!(frame.data[[2, 3]], 203.0);
        assert_eq!(frame.header.get("DataType").unwrap(), "UnsignedShort");
    }

    #[test]
    fn test_header_block_is_padded() {
        let data = Array2::<u16>::zeros((2, 2));
        let bytes = encode_u16(&data);
        let header_end = bytes.iter().position(|&b| b == b'}').unwrap() + 2;
        assert_eq!(header_end % HEADER_BLOCK, 0);
    }

    #[test]
    fn test_big_endian_float() {
        let mut bytes = b"{\nByteOrder = HighByteFirst ;\nDataType = FloatValue ;\nDim_1 = 2 ;\nDim_2 = 1 ;\n}\n"
            .to_vec();
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_be_bytes());

        let frame = parse(&bytes).unwrap();
        assert_eq!(frame.data.dim(), (1, 2));
        assert_eq!(frame.data[[0, 0]], 1.5);
        assert_eq!(frame.data[[0, 1]], -2.0);
    }

    #[test]
    fn test_signed_integer() {
        let mut bytes =
            b"{\nDataType = SignedInteger ;\nDim_1 = 1 ;\nDim_2 = 2 ;\n}\n".to_vec();
        bytes.extend_from_slice(&(-7i32).to_le_bytes());
        bytes.extend_from_slice(&42i32.to_le_bytes());

        let frame = parse(&bytes).unwrap();
        assert_eq!(frame.data[[0, 0]], -7.0);
        assert_eq!(frame.data[[1, 0]], 42.0);
    }

    #[test]
    fn test_truncated_data_is_error() {
        let mut bytes = b"{\nDataType = UnsignedShort ;\nDim_1 = 4 ;\nDim_2 = 4 ;\n}\n".to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let err = parse(&bytes).unwrap_err();
        assert!(err.contains("truncated"));
    }

    #[test]
    fn test_missing_dimension_is_error() {
        let bytes = b"{\nDataType = UnsignedShort ;\nDim_1 = 4 ;\n}\n".to_vec();
        let err = parse(&bytes).unwrap_err();
        assert!(err.contains("Dim_2"));
    }

    #[test]
    fn test_unknown_data_type_is_error() {
        let bytes = b"{\nDataType = Complex ;\nDim_1 = 1 ;\nDim_2 = 1 ;\n}\n".to_vec();
        assert!(parse(&bytes).unwrap_err().contains("DataType"));
    }

    #[test]
    fn test_looks_like_edf() {
        assert!(looks_like_edf(b"{\nDim_1 = 1 ;"));
        assert!(looks_like_edf(b"\n {"));
        assert!(!looks_like_edf(b"II*\0"));
        assert!(!looks_like_edf(b""));
    }
}
