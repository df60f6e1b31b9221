//! Virtual machine: quadruple interpreter and host value operations

mod machine;
pub mod ops;

pub use machine::VirtualMachine;
