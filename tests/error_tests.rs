//! Error taxonomy coverage: compile-time and runtime failures

use pagescript::{compile, Error, ErrorPhase, VirtualMachine};

fn compile_err(source: &str) -> Error {
    compile(source).expect_err("compilation should fail")
}

fn run_err(source: &str) -> Error {
    let page = compile(source).expect("compilation failed");
    let mut vm = VirtualMachine::new(page).expect("vm init failed");
    vm.run().expect_err("execution should fail")
}

#[test]
fn test_syntax_error_from_scanner() {
    let err = compile_err("page p; int x @ 3; render { }");
    assert!(matches!(err, Error::SyntaxError { .. }));
    assert_eq!(err.phase(), ErrorPhase::Parse);
}

#[test]
fn test_unexpected_token() {
    let err = compile_err("page p; int 5; render { }");
    assert!(matches!(err, Error::UnexpectedToken { .. }));
}

#[test]
fn test_unexpected_eof() {
    let err = compile_err("page p; render {");
    assert_eq!(err, Error::UnexpectedEof);
}

#[test]
fn test_invalid_operation() {
    let err = compile_err(r#"page p; render { print("a" - 1); }"#);
    assert!(matches!(err, Error::InvalidOperation { .. }));
    assert_eq!(err.phase(), ErrorPhase::Semantic);
}

#[test]
fn test_non_bool_condition_rejected() {
    let err = compile_err("page p; render { if (1) { print(1); } }");
    assert!(matches!(err, Error::TypeError { .. }));
}

#[test]
fn test_incompatible_assignment() {
    let err = compile_err("page p; render { string s; s = 3; }");
    assert_eq!(
        err,
        Error::TypeError {
            expected: "string".to_string(),
            got: "int".to_string(),
        }
    );
}

#[test]
fn test_duplicate_identifier() {
    let err = compile_err("page p; int x; float x; render { }");
    assert!(matches!(err, Error::DuplicateIdentifier { .. }));
}

#[test]
fn test_duplicate_function() {
    let err = compile_err(
        "page p; void f() { print(1); } void f() { print(2); } render { }",
    );
    assert!(matches!(err, Error::DuplicateFunction { .. }));
}

#[test]
fn test_undefined_identifier() {
    let err = compile_err("page p; render { print(missing); }");
    assert_eq!(
        err,
        Error::UndefinedIdentifier {
            name: "missing".to_string(),
        }
    );
}

#[test]
fn test_undefined_function() {
    let err = compile_err("page p; render { ghost(); }");
    assert_eq!(
        err,
        Error::UndefinedFunction {
            name: "ghost".to_string(),
        }
    );
}

#[test]
fn test_missing_arguments() {
    let err = compile_err(
        "page p; int f(int a, int b) { return a + b; } render { print(f(1)); }",
    );
    assert_eq!(
        err,
        Error::MissingArguments {
            func: "f".to_string(),
            expected: 2,
            got: 1,
        }
    );
}

#[test]
fn test_too_many_arguments() {
    let err = compile_err(
        "page p; int f(int a) { return a; } render { print(f(1, 2)); }",
    );
    assert_eq!(
        err,
        Error::TooManyArguments {
            func: "f".to_string(),
            expected: 1,
        }
    );
}

#[test]
fn test_wrong_argument_type() {
    let err = compile_err(
        r#"page p; int f(int a) { return a; } render { print(f("s")); }"#,
    );
    assert!(matches!(err, Error::TypeError { .. }));
}

#[test]
fn test_return_type_checked_exactly() {
    let err = compile_err("page p; int f() { return 1.5; } render { }");
    assert_eq!(
        err,
        Error::TypeError {
            expected: "int".to_string(),
            got: "float".to_string(),
        }
    );
}

#[test]
fn test_return_in_render_rejected() {
    let err = compile_err("page p; render { return; }");
    assert_eq!(err, Error::ReturnOutsideFunction);
}

#[test]
fn test_void_call_in_expression_rejected() {
    let err = compile_err(
        "page p; void f() { print(1); } render { print(f()); }",
    );
    assert!(matches!(err, Error::TypeError { .. }));
}

#[test]
fn test_scalar_indexing_rejected() {
    let err = compile_err("page p; int x; render { x[0] = 1; }");
    assert_eq!(
        err,
        Error::NotIndexable {
            name: "x".to_string(),
        }
    );
}

#[test]
fn test_dimension_mismatch() {
    let err = compile_err("page p; int m[2][2]; render { m[0] = 1; }");
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}

#[test]
fn test_runtime_bounds_check() {
    let err = run_err(
        "page p; int arr[2]; render { int i; i = 2; arr[i] = 1; }",
    );
    assert_eq!(err, Error::IndexOutOfBounds { index: 2, bound: 2 });
    assert_eq!(err.phase(), ErrorPhase::Runtime);
}

#[test]
fn test_uninitialized_read_is_runtime_error() {
    let err = run_err("page p; int x; render { print(x); }");
    assert!(matches!(err, Error::AddressError { .. }));
}

#[test]
fn test_global_temporal_faults_at_runtime() {
    // the boot frame carries no temporal cells: a global initializer
    // needing one compiles but cannot run
    let err = run_err("page p; int x = 2 + 3; render { print(x); }");
    assert!(matches!(err, Error::AddressError { .. }));
}
