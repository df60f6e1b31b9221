//! Property-based tests for the memory mapper, the literal table and
//! the scanner
//!
//! These verify structural invariants over random inputs:
//! 1. Any allocated address resolves back to exactly the segment and
//!    type it was allocated from, with a consistent offset
//! 2. Literal interning is idempotent and type-stable
//! 3. The scanner never panics on arbitrary input

use pagescript::memory::MemoryMapper;
use pagescript::semantics::types::{Segment, ValueType};
use pagescript::{CodeGenerator, Scanner};
use proptest::prelude::*;

fn arbitrary_segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        Just(Segment::Global),
        Just(Segment::Local),
        Just(Segment::Temporal),
        Just(Segment::Constant),
    ]
}

fn arbitrary_value_type() -> impl Strategy<Value = ValueType> {
    prop_oneof![
        Just(ValueType::Int),
        Just(ValueType::Float),
        Just(ValueType::Str),
        Just(ValueType::Bool),
        Just(ValueType::Pointer),
    ]
}

proptest! {
    /// Every allocation resolves to the segment and type it came from
    #[test]
    fn prop_allocation_partition(
        requests in prop::collection::vec(
            (arbitrary_segment(), arbitrary_value_type()),
            1..200,
        )
    ) {
        let mut mapper = MemoryMapper::default_layout().unwrap();
        for (segment, vt) in requests {
            let addr = mapper.allocate(vt, segment).unwrap();
            prop_assert_eq!(mapper.resolve(addr).unwrap(), (segment, vt));
        }
    }

    /// Offsets within a type sub-range are dense and start at zero
    #[test]
    fn prop_offsets_are_dense(count in 1usize..500) {
        let mut mapper = MemoryMapper::default_layout().unwrap();
        for expected in 0..count {
            let addr = mapper.allocate(ValueType::Int, Segment::Local).unwrap();
            prop_assert_eq!(mapper.context_offset(addr).unwrap(), expected);
        }
    }

    /// Interning the same literal twice yields the same address
    #[test]
    fn prop_int_literal_idempotent(n in any::<i64>()) {
        let mut gen = CodeGenerator::new(MemoryMapper::default_layout().unwrap());
        let a = gen.int_literal(n).unwrap();
        let b = gen.int_literal(n).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Distinct integer literals get distinct constant cells
    #[test]
    fn prop_distinct_int_literals_distinct(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let mut gen = CodeGenerator::new(MemoryMapper::default_layout().unwrap());
        let addr_a = gen.int_literal(a).unwrap();
        let addr_b = gen.int_literal(b).unwrap();
        prop_assert_ne!(addr_a, addr_b);
    }

    /// String literal interning is idempotent and lands in string cells
    #[test]
    fn prop_string_literal_idempotent(s in "[a-zA-Z0-9 ]{0,40}") {
        let mut gen = CodeGenerator::new(MemoryMapper::default_layout().unwrap());
        let mapper = MemoryMapper::default_layout().unwrap();
        let a = gen.string_literal(&s).unwrap();
        let b = gen.string_literal(&s).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(mapper.resolve(a).unwrap(), (Segment::Constant, ValueType::Str));
    }

    /// The scanner returns tokens or an error, never panics
    #[test]
    fn prop_scanner_never_panics(source in "[\\x00-\\x7F]{0,300}") {
        let _ = Scanner::new(&source).scan_tokens();
    }
}
