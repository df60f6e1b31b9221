//! Semantic cube: the operator/operand compatibility matrix
//!
//! A pure lookup table from `(operator, left type, right type)` to the
//! result type. A missing entry means the combination is a compile-time
//! type error. The cube never sees `pointer`: the code generator resolves
//! pointer operands to their element type before asking.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::semantics::types::{Operator, ValueType};

type Key = (Operator, ValueType, ValueType);

lazy_static! {
    static ref CUBE: HashMap<Key, ValueType> = {
        use Operator::*;
        use ValueType::*;

        let mut cube = HashMap::new();

        // Arithmetic: int/int stays int, any float operand widens
        for op in [Add, Sub, Mul] {
            cube.insert((op, Int, Int), Int);
            cube.insert((op, Int, Float), Float);
            cube.insert((op, Float, Int), Float);
            cube.insert((op, Float, Float), Float);
        }

        // Division always yields float, including int / int
        for (l, r) in [(Int, Int), (Int, Float), (Float, Int), (Float, Float)] {
            cube.insert((Div, l, r), Float);
        }

        // String concatenation
        cube.insert((Add, Str, Str), Str);

        // Relational operators: numeric operands only
        for op in [Lt, Gt, Le, Ge] {
            for (l, r) in [(Int, Int), (Int, Float), (Float, Int), (Float, Float)] {
                cube.insert((op, l, r), Bool);
            }
        }

        // Equality: numeric pairs, string pairs, bool pairs
        for op in [Eq, Ne] {
            for (l, r) in [(Int, Int), (Int, Float), (Float, Int), (Float, Float)] {
                cube.insert((op, l, r), Bool);
            }
            cube.insert((op, Str, Str), Bool);
            cube.insert((op, Bool, Bool), Bool);
        }

        // Logical operators: bools only
        for op in [And, Or] {
            cube.insert((op, Bool, Bool), Bool);
        }

        // Assignment: numeric cells accept either numeric type (the
        // store coerces), string and bool cells accept only themselves
        cube.insert((Assign, Int, Int), Int);
        cube.insert((Assign, Int, Float), Int);
        cube.insert((Assign, Float, Int), Float);
        cube.insert((Assign, Float, Float), Float);
        cube.insert((Assign, Str, Str), Str);
        cube.insert((Assign, Bool, Bool), Bool);

        cube
    };
}

/// Result type of applying `op` to operands of the given types
pub fn result_type(op: Operator, left: ValueType, right: ValueType) -> Result<ValueType> {
    CUBE.get(&(op, left, right))
        .copied()
        .ok_or_else(|| Error::InvalidOperation {
            op: op.to_string(),
            left_type: left.to_string(),
            right_type: right.to_string(),
        })
}

/// Whether a value of type `source` may be stored into a `target` cell
pub fn assignable(target: ValueType, source: ValueType) -> bool {
    CUBE.contains_key(&(Operator::Assign, target, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::types::{Operator::*, ValueType::*};

    #[test]
    fn test_arithmetic_widening() {
        assert_eq!(result_type(Add, Int, Int).unwrap(), Int);
        assert_eq!(result_type(Mul, Int, Float).unwrap(), Float);
        assert_eq!(result_type(Sub, Float, Int).unwrap(), Float);
    }

    #[test]
    fn test_division_is_always_float() {
        assert_eq!(result_type(Div, Int, Int).unwrap(), Float);
        assert_eq!(result_type(Div, Float, Float).unwrap(), Float);
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(result_type(Add, Str, Str).unwrap(), Str);
        assert!(result_type(Add, Str, Int).is_err());
        assert!(result_type(Sub, Str, Str).is_err());
    }

    #[test]
    fn test_relational_and_logical() {
        assert_eq!(result_type(Lt, Int, Float).unwrap(), Bool);
        assert!(result_type(Lt, Str, Str).is_err());
        assert_eq!(result_type(And, Bool, Bool).unwrap(), Bool);
        assert!(result_type(Or, Int, Int).is_err());
    }

    #[test]
    fn test_equality_families() {
        assert_eq!(result_type(Eq, Str, Str).unwrap(), Bool);
        assert_eq!(result_type(Ne, Bool, Bool).unwrap(), Bool);
        assert!(result_type(Eq, Str, Bool).is_err());
        assert!(result_type(Eq, Int, Bool).is_err());
    }

    #[test]
    fn test_assignability() {
        assert!(assignable(Int, Float));
        assert!(assignable(Float, Int));
        assert!(assignable(Str, Str));
        assert!(!assignable(Str, Int));
        assert!(!assignable(Bool, Int));
    }
}
