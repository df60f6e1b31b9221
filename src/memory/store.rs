//! Runtime value cells and per-segment storage
//!
//! A [`MemoryStore`] backs exactly one segment instance: the single
//! global store, the single constant store, or the local/temporal pair
//! inside one activation record. Cells are addressed by `(type, offset)`
//! as produced by [`crate::memory::MemoryMapper::context_offset`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::semantics::types::{SegmentSizes, ValueType};

/// A runtime value held in a memory cell
///
/// Pointer cells hold the target address as an `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    Str(String),
    /// Boolean value
    Bool(bool),
}

impl Value {
    /// Human-readable type name, matching [`ValueType`] display
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    /// Integer view, truncating floats
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(f) => Ok(*f as i64),
            other => Err(Error::TypeError {
                expected: "int".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// Float view, widening integers
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            other => Err(Error::TypeError {
                expected: "float".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// Boolean view, booleans only
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::TypeError {
                expected: "bool".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// String view, strings only
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Error::TypeError {
                expected: "string".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// Converts the value to fit a cell of the given type
    ///
    /// Numeric narrowing truncates (`float` into an `int` cell drops the
    /// fraction); any non-numeric mismatch is a type error.
    pub fn coerce(self, vt: ValueType) -> Result<Value> {
        match vt {
            ValueType::Int | ValueType::Pointer => Ok(Value::Int(self.as_int()?)),
            ValueType::Float => Ok(Value::Float(self.as_float()?)),
            ValueType::Str => match self {
                Value::Str(_) => Ok(self),
                other => Err(Error::TypeError {
                    expected: "string".to_string(),
                    got: other.type_name().to_string(),
                }),
            },
            ValueType::Bool => Ok(Value::Bool(self.as_bool()?)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Typed cell arrays for one segment instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    cells: Vec<(ValueType, Vec<Option<Value>>)>,
}

impl MemoryStore {
    /// Allocates cell arrays sized by a recorded footprint
    pub fn new(sizes: &SegmentSizes) -> Self {
        let cells = ValueType::ALL
            .iter()
            .map(|vt| (*vt, vec![None; sizes.get(*vt)]))
            .collect();
        MemoryStore { cells }
    }

    /// A store with no cells at all, used for the boot frame
    pub fn empty() -> Self {
        Self::new(&SegmentSizes::default())
    }

    fn slot(&self, vt: ValueType, offset: usize) -> Result<&Option<Value>> {
        let (_, arr) = self
            .cells
            .iter()
            .find(|(t, _)| *t == vt)
            .ok_or_else(|| Error::address(format!("no {} cells in this store", vt)))?;
        arr.get(offset).ok_or_else(|| {
            Error::address(format!(
                "offset {} exceeds the {} cells reserved for type {}",
                offset,
                arr.len(),
                vt
            ))
        })
    }

    /// Reads a cell, failing on never-written slots
    pub fn read(&self, vt: ValueType, offset: usize) -> Result<Value> {
        self.slot(vt, offset)?
            .clone()
            .ok_or_else(|| Error::address(format!("read of uninitialized {} cell {}", vt, offset)))
    }

    /// Writes a cell, coercing the value to the cell type
    pub fn write(&mut self, vt: ValueType, offset: usize, value: Value) -> Result<()> {
        let coerced = value.coerce(vt)?;
        let (_, arr) = self
            .cells
            .iter_mut()
            .find(|(t, _)| *t == vt)
            .ok_or_else(|| Error::address(format!("no {} cells in this store", vt)))?;
        let len = arr.len();
        let slot = arr.get_mut(offset).ok_or_else(|| {
            Error::address(format!(
                "offset {} exceeds the {} cells reserved for type {}",
                offset, len, vt
            ))
        })?;
        *slot = Some(coerced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(&SegmentSizes::uniform(4))
    }

    #[test]
    fn test_write_then_read() {
        let mut s = store();
        s.write(ValueType::Str, 2, Value::Str("hi".to_string()))
            .unwrap();
        assert_eq!(s.read(ValueType::Str, 2).unwrap(), Value::Str("hi".to_string()));
    }

    #[test]
    fn test_uninitialized_read_fails() {
        let s = store();
        let err = s.read(ValueType::Int, 0).unwrap_err();
        assert!(matches!(err, Error::AddressError { .. }));
    }

    #[test]
    fn test_out_of_backing_fails() {
        let mut s = store();
        let err = s.write(ValueType::Bool, 4, Value::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::AddressError { .. }));
    }

    #[test]
    fn test_write_coerces_to_cell_type() {
        let mut s = store();
        s.write(ValueType::Int, 0, Value::Float(3.9)).unwrap();
        assert_eq!(s.read(ValueType::Int, 0).unwrap(), Value::Int(3));

        s.write(ValueType::Float, 0, Value::Int(2)).unwrap();
        assert_eq!(s.read(ValueType::Float, 0).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_cross_kind_write_rejected() {
        let mut s = store();
        let err = s
            .write(ValueType::Bool, 0, Value::Str("no".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }
}
