//! Host-side arithmetic for quadruple execution
//!
//! Operand types were settled by the semantic cube at compile time, so
//! these helpers only distinguish the cases the cube admits; anything
//! else is a corrupted program and reported as an invalid operation.

use crate::error::{Error, Result};
use crate::memory::Value;
use crate::semantics::types::Operation;

fn invalid(op: Operation, lhs: &Value, rhs: &Value) -> Error {
    Error::InvalidOperation {
        op: format!("{:?}", op),
        left_type: lhs.type_name().to_string(),
        right_type: rhs.type_name().to_string(),
    }
}

fn both_int(lhs: &Value, rhs: &Value) -> bool {
    matches!((lhs, rhs), (Value::Int(_), Value::Int(_)))
}

/// Applies a binary quadruple operation to two runtime values
pub fn binary(op: Operation, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        Operation::Add => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ if both_int(lhs, rhs) => Ok(Value::Int(lhs.as_int()? + rhs.as_int()?)),
            _ => Ok(Value::Float(lhs.as_float()? + rhs.as_float()?)),
        },
        Operation::Sub => {
            if both_int(lhs, rhs) {
                Ok(Value::Int(lhs.as_int()? - rhs.as_int()?))
            } else {
                Ok(Value::Float(lhs.as_float()? - rhs.as_float()?))
            }
        }
        Operation::Mul => {
            if both_int(lhs, rhs) {
                Ok(Value::Int(lhs.as_int()? * rhs.as_int()?))
            } else {
                Ok(Value::Float(lhs.as_float()? * rhs.as_float()?))
            }
        }
        // division always lands in a float cell
        Operation::Div => Ok(Value::Float(lhs.as_float()? / rhs.as_float()?)),

        Operation::Lt => Ok(Value::Bool(lhs.as_float()? < rhs.as_float()?)),
        Operation::Gt => Ok(Value::Bool(lhs.as_float()? > rhs.as_float()?)),
        Operation::Le => Ok(Value::Bool(lhs.as_float()? <= rhs.as_float()?)),
        Operation::Ge => Ok(Value::Bool(lhs.as_float()? >= rhs.as_float()?)),

        Operation::Eq => equality(lhs, rhs).map(Value::Bool),
        Operation::Ne => equality(lhs, rhs).map(|eq| Value::Bool(!eq)),

        Operation::And => Ok(Value::Bool(lhs.as_bool()? && rhs.as_bool()?)),
        Operation::Or => Ok(Value::Bool(lhs.as_bool()? || rhs.as_bool()?)),

        _ => Err(invalid(op, lhs, rhs)),
    }
}

fn equality(lhs: &Value, rhs: &Value) -> Result<bool> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(lhs.as_float()? == rhs.as_float()?)
        }
        _ => Err(invalid(Operation::Eq, lhs, rhs)),
    }
}
