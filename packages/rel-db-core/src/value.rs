//! Closed column type set and typed cell values.
//!
//! Every stored cell is a [`Value`]; every column declares a [`ColumnType`].
//! Conversions between types go through the explicit table in [`Value::cast`],
//! which succeeds or fails per value. There is no open-ended dynamic casting.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Bool => "bool",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    /// Whether values of the two types have a defined ordering between them.
    pub fn comparable_with(&self, other: ColumnType) -> bool {
        *self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed cell. `Null` doubles as the empty cell of a tombstone row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The column type this value inhabits, if any. `Null` has none.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Bool(_) => Some(ColumnType::Bool),
        }
    }

    /// Whether this value may be stored in a column of the given type.
    /// `Null` is storable under any type.
    pub fn matches(&self, ty: ColumnType) -> bool {
        match self.column_type() {
            None => true,
            Some(own) => own == ty,
        }
    }

    /// Ordering between two values where one is defined: same-type
    /// comparisons plus cross-numeric Int/Float. `Null` compares with
    /// nothing, so predicates over it never match.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used by sorting and by B-tree key placement: `Null`
    /// sorts first, numerics intermix, otherwise values rank by type.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            _ => match self.compare(other) {
                Some(ord) => ord,
                None => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    /// Converts this value to the target type. The conversion table is
    /// closed; any pairing outside it fails with `SchemaMismatch`.
    /// `Null` converts to `Null` under every target.
    pub fn cast(&self, target: ColumnType) -> Result<Value> {
        let fail = || {
            DbError::SchemaMismatch(format!(
                "cannot convert {self} to {target}"
            ))
        };
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),

            (Value::Int(n), ColumnType::Int) => Ok(Value::Int(*n)),
            (Value::Int(n), ColumnType::Float) => Ok(Value::Float(*n as f64)),
            (Value::Int(n), ColumnType::Text) => Ok(Value::Text(n.to_string())),
            (Value::Int(0), ColumnType::Bool) => Ok(Value::Bool(false)),
            (Value::Int(1), ColumnType::Bool) => Ok(Value::Bool(true)),
            (Value::Int(_), ColumnType::Bool) => Err(fail()),

            (Value::Float(x), ColumnType::Float) => Ok(Value::Float(*x)),
            (Value::Float(x), ColumnType::Int) if x.is_finite() => Ok(Value::Int(*x as i64)),
            (Value::Float(x), ColumnType::Text) => Ok(Value::Text(x.to_string())),
            (Value::Float(_), _) => Err(fail()),

            (Value::Text(s), ColumnType::Text) => Ok(Value::Text(s.clone())),
            (Value::Text(s), ColumnType::Int) => {
                s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail())
            }
            (Value::Text(s), ColumnType::Float) => {
                s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail())
            }
            (Value::Text(s), ColumnType::Bool) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },

            (Value::Bool(b), ColumnType::Bool) => Ok(Value::Bool(*b)),
            (Value::Bool(b), ColumnType::Int) => Ok(Value::Int(i64::from(*b))),
            (Value::Bool(b), ColumnType::Text) => Ok(Value::Text(b.to_string())),
            (Value::Bool(_), ColumnType::Float) => Err(fail()),
        }
    }

    /// Parses a textual field into a value of the given type. The empty
    /// string parses to `Null` for every type.
    pub fn parse_text(field: &str, ty: ColumnType) -> Result<Value> {
        if field.is_empty() {
            return Ok(Value::Null);
        }
        Value::Text(field.to_string()).cast(ty)
    }

    /// Appends a canonical byte encoding of this value: a type tag
    /// followed by a fixed or length-prefixed payload. Used for hashing
    /// and for distinct-row deduplication.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => buf.push(0),
            Value::Int(n) => {
                buf.push(1);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Value::Float(x) => {
                buf.push(2);
                buf.extend_from_slice(&x.to_bits().to_le_bytes());
            }
            Value::Text(s) => {
                buf.push(3);
                buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bool(b) => {
                buf.push(4);
                buf.push(u8::from(*b));
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}
