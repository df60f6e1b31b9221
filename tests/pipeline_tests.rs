//! End-to-end pipeline tests: source text through the VM

use pagescript::{compile, CompilationOutput, Error, RenderTag, RenderValue, VirtualMachine};

fn run(source: &str) -> VirtualMachine {
    let page = compile(source).expect("compilation failed");
    let mut vm = VirtualMachine::new(page).expect("vm init failed");
    vm.run().expect("execution failed");
    vm
}

#[test]
fn test_operator_precedence() {
    let vm = run(r#"
        page p;
        render {
            print(2 + 3 * 4);
            print((2 + 3) * 4);
        }
    "#);
    assert_eq!(vm.printed(), ["14", "20"]);
}

#[test]
fn test_division_always_float() {
    let vm = run(r#"
        page p;
        render {
            print(7 / 2);
            print(10 / 5);
        }
    "#);
    assert_eq!(vm.printed(), ["3.5", "2"]);
}

#[test]
fn test_mixed_arithmetic_widens() {
    let vm = run(r#"
        page p;
        render {
            print(2.5 + 1);
            print(2 * 1.5);
        }
    "#);
    assert_eq!(vm.printed(), ["3.5", "3"]);
}

#[test]
fn test_string_concatenation() {
    let vm = run(r#"
        page p;
        string prefix = "page";
        render {
            string title;
            title = prefix + "script";
            print(title);
        }
    "#);
    assert_eq!(vm.printed(), ["pagescript"]);
}

#[test]
fn test_comparisons_and_logic() {
    let vm = run(r#"
        page p;
        render {
            print(1 < 2 && 2 <= 2);
            print(3 != 3 || 4 > 5);
            print("a" == "a");
        }
    "#);
    assert_eq!(vm.printed(), ["true", "false", "true"]);
}

#[test]
fn test_if_else_branches() {
    let vm = run(r#"
        page p;
        render {
            int n;
            n = 7;
            if (n > 5) {
                print("big");
            } else {
                print("small");
            }
            if (n < 5) {
                print("unreached");
            }
        }
    "#);
    assert_eq!(vm.printed(), ["big"]);
}

#[test]
fn test_while_loop() {
    let vm = run(r#"
        page p;
        render {
            int i;
            i = 0;
            while (i < 3) {
                print(i);
                i = i + 1;
            }
        }
    "#);
    assert_eq!(vm.printed(), ["0", "1", "2"]);
}

#[test]
fn test_for_loop_exclusive_bound() {
    let vm = run(r#"
        page p;
        render {
            int i;
            for (i = 0 to 3) {
                print(i);
            }
        }
    "#);
    assert_eq!(vm.printed(), ["0", "1", "2"]);
}

#[test]
fn test_for_loop_with_step() {
    let vm = run(r#"
        page p;
        render {
            int i;
            for (i = 0 to 10 step 3) {
                print(i);
            }
        }
    "#);
    assert_eq!(vm.printed(), ["0", "3", "6", "9"]);
}

#[test]
fn test_for_limit_snapshot_ignores_mutation() {
    // the bound is snapshotted before the loop head, so growing it
    // inside the body does not extend the loop
    let vm = run(r#"
        page p;
        render {
            int i;
            int bound;
            bound = 3;
            for (i = 0 to bound) {
                bound = 100;
                print(i);
            }
        }
    "#);
    assert_eq!(vm.printed(), ["0", "1", "2"]);
}

#[test]
fn test_function_call_and_caller_state() {
    let vm = run(r#"
        page p;
        int addOne(int n) {
            return n + 1;
        }
        render {
            int x;
            x = 10;
            print(addOne(4));
            print(x);
        }
    "#);
    assert_eq!(vm.printed(), ["5", "10"]);
}

#[test]
fn test_nested_calls() {
    let vm = run(r#"
        page p;
        int twice(int n) {
            return n * 2;
        }
        int add(int a, int b) {
            return a + b;
        }
        render {
            print(add(twice(3), 4));
        }
    "#);
    assert_eq!(vm.printed(), ["10"]);
}

#[test]
fn test_recursion() {
    let vm = run(r#"
        page p;
        int fact(int n) {
            if (n < 2) {
                return 1;
            }
            return n * fact(n - 1);
        }
        render {
            print(fact(6));
        }
    "#);
    assert_eq!(vm.printed(), ["720"]);
}

#[test]
fn test_early_return() {
    let vm = run(r#"
        page p;
        int sign(int n) {
            if (n > 0) {
                return 1;
            }
            return -1;
        }
        render {
            print(sign(5));
            print(sign(-3));
        }
    "#);
    assert_eq!(vm.printed(), ["1", "-1"]);
}

#[test]
fn test_mixed_type_parameters() {
    // two string parameters straddling an int one: exercises per-type
    // parameter placement
    let vm = run(r#"
        page p;
        string join(string a, int n, string b) {
            if (n > 0) {
                return a + b;
            }
            return b + a;
        }
        render {
            print(join("x", 1, "y"));
            print(join("x", 0, "y"));
        }
    "#);
    assert_eq!(vm.printed(), ["xy", "yx"]);
}

#[test]
fn test_void_function_statement_call() {
    let vm = run(r#"
        page p;
        int counter = 0;
        void bump() {
            counter = counter + 1;
        }
        render {
            bump();
            bump();
            print(counter);
        }
    "#);
    assert_eq!(vm.printed(), ["2"]);
}

#[test]
fn test_globals_execute_before_render() {
    let vm = run(r#"
        page p;
        int x = 41;
        render {
            print(x + 1);
        }
    "#);
    assert_eq!(vm.printed(), ["42"]);
}

#[test]
fn test_global_after_function_still_initializes() {
    // the skip jump lets inline globals placed after a function body
    // run before render, and the body itself is not executed inline
    let vm = run(r#"
        page p;
        void shout() {
            print("called");
        }
        int x = 5;
        render {
            print(x);
        }
    "#);
    assert_eq!(vm.printed(), ["5"]);
}

#[test]
fn test_array_read_write() {
    let vm = run(r#"
        page p;
        int arr[3];
        render {
            int i;
            for (i = 0 to 3) {
                arr[i] = i * 10;
            }
            print(arr[0] + arr[1] + arr[2]);
        }
    "#);
    assert_eq!(vm.printed(), ["30"]);
}

#[test]
fn test_array_initializer_list() {
    let vm = run(r#"
        page p;
        int primes[4] = [2, 3, 5, 7];
        render {
            print(primes[3]);
        }
    "#);
    assert_eq!(vm.printed(), ["7"]);
}

#[test]
fn test_matrix_linear_addressing() {
    let vm = run(r#"
        page p;
        int m[2][3];
        render {
            m[0][1] = 5;
            m[1][2] = 7;
            print(m[0][1] + m[1][2]);
        }
    "#);
    assert_eq!(vm.printed(), ["12"]);
}

#[test]
fn test_index_out_of_bounds_at_runtime() {
    let page = compile(r#"
        page p;
        int arr[3];
        render {
            int i;
            i = 5;
            print(arr[i]);
        }
    "#)
    .expect("compilation failed");
    let mut vm = VirtualMachine::new(page).expect("vm init failed");
    let err = vm.run().expect_err("bounds check should fire");
    assert_eq!(err, Error::IndexOutOfBounds { index: 5, bound: 3 });
}

#[test]
fn test_render_stream_shape() {
    let vm = run(r#"
        page p;
        string title = "Report";
        render {
            container(width: 800) {
                heading(text: title, level: 1);
                paragraph(text: "body " + "text");
            }
        }
    "#);

    let ops = vm.render_ops();
    assert_eq!(ops.len(), 7);

    assert_eq!(ops[0].tag, RenderTag::Container);
    assert_eq!(ops[0].attribute, None);
    assert_eq!(ops[1].tag, RenderTag::Container);
    assert_eq!(ops[1].attribute.as_deref(), Some("width"));
    assert_eq!(ops[1].value, Some(RenderValue::Int(800)));

    assert_eq!(ops[2].tag, RenderTag::Heading);
    assert_eq!(ops[2].attribute, None);
    assert_eq!(ops[3].attribute.as_deref(), Some("text"));
    assert_eq!(ops[3].value, Some(RenderValue::Str("Report".to_string())));
    assert_eq!(ops[4].attribute.as_deref(), Some("level"));
    assert_eq!(ops[4].value, Some(RenderValue::Int(1)));

    assert_eq!(ops[5].tag, RenderTag::Paragraph);
    assert_eq!(ops[5].attribute, None);
    assert_eq!(
        ops[6].value,
        Some(RenderValue::Str("body text".to_string()))
    );
}

#[test]
fn test_compilation_output_serde_roundtrip() {
    let page = compile(r#"
        page p;
        int x = 1;
        int f(int n) {
            return n + x;
        }
        render {
            print(f(2));
            heading(text: "t", level: 2);
        }
    "#)
    .expect("compilation failed");

    let json = serde_json::to_string(&page.output).expect("serialize");
    let back: CompilationOutput = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, page.output);
}
