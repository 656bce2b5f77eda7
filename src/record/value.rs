use std::fmt;

use super::error::{RecordError, RecordResult};

/// Column data type. Every type has a fixed on-page width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,         // 4 bytes
    Float,       // 8 bytes
    Char(usize), // n bytes, zero padded
}

impl DataType {
    /// Size in bytes of a value of this type inside a record slot
    pub fn size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Float => 8,
            DataType::Char(n) => *n,
        }
    }

    /// Parse a type name as written in catalog files and on the command line:
    /// `INT`, `FLOAT`, `CHAR(n)` (case insensitive, `VARCHAR(n)` accepted as `CHAR(n)`).
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INT" | "INTEGER" => return Some(DataType::Int),
            "FLOAT" | "DOUBLE" => return Some(DataType::Float),
            _ => {}
        }

        let inner = upper
            .strip_prefix("VARCHAR(")
            .or_else(|| upper.strip_prefix("CHAR("))?
            .strip_suffix(')')?;
        match inner.trim().parse::<usize>() {
            Ok(n) if n > 0 => Some(DataType::Char(n)),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
        }
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    String(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value can be stored in a column of `data_type`.
    /// NULL fits every type; a string fits `CHAR(n)` if it is at most `n` bytes.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _)
            | (Value::Int(_), DataType::Int)
            | (Value::Float(_), DataType::Float) => true,
            (Value::String(s), DataType::Char(n)) => s.len() <= *n,
            _ => false,
        }
    }

    /// Parse a textual cell (CSV input) as a value of `data_type`.
    /// An empty cell is NULL.
    pub fn parse_as(text: &str, data_type: &DataType) -> RecordResult<Self> {
        if text.is_empty() {
            return Ok(Value::Null);
        }

        let trimmed = text.trim();
        match data_type {
            DataType::Int => trimmed.parse::<i32>().map(Value::Int).map_err(|e| {
                RecordError::Deserialization(format!("'{}' is not an INT: {}", text, e))
            }),
            DataType::Float => trimmed.parse::<f64>().map(Value::Float).map_err(|e| {
                RecordError::Deserialization(format!("'{}' is not a FLOAT: {}", text, e))
            }),
            DataType::Char(_) => Ok(Value::String(text.to_string())),
        }
    }

    /// Serialize to exactly `data_type.size()` bytes
    pub fn serialize(&self, data_type: &DataType) -> RecordResult<Vec<u8>> {
        match (self, data_type) {
            (Value::Int(i), DataType::Int) => Ok(i.to_le_bytes().to_vec()),
            (Value::Float(f), DataType::Float) => Ok(f.to_le_bytes().to_vec()),
            (Value::String(s), DataType::Char(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len {
                    return Err(RecordError::Serialization(format!(
                        "String length {} exceeds CHAR({})",
                        bytes.len(),
                        max_len
                    )));
                }
                let mut result = vec![0u8; *max_len];
                result[..bytes.len()].copy_from_slice(bytes);
                Ok(result)
            }
            (Value::Null, _) => Ok(vec![0u8; data_type.size()]),
            _ => Err(RecordError::TypeMismatch {
                expected: data_type.to_string(),
                actual: format!("{:?}", self),
            }),
        }
    }

    pub fn deserialize(bytes: &[u8], data_type: &DataType, is_null: bool) -> RecordResult<Self> {
        if is_null {
            return Ok(Value::Null);
        }

        if bytes.len() != data_type.size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes for {}, got {}",
                data_type.size(),
                data_type,
                bytes.len()
            )));
        }

        match data_type {
            DataType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Value::Int(i32::from_le_bytes(buf)))
            }
            DataType::Float => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Float(f64::from_le_bytes(buf)))
            }
            DataType::Char(_) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Value::String(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NULL"),
        }
    }
}
