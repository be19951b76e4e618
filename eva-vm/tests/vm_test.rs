// eva-vm - End-to-end VM tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use eva_vm::error::EvaError;
use eva_vm::{RuntimeError, Value, Vm};

fn eval(source: &str) -> (Vm, Value) {
    let mut vm = Vm::new();
    let value = vm.exec(source).expect("exec failed");
    (vm, value)
}

fn eval_number(source: &str) -> f64 {
    let (_, value) = eval(source);
    value.as_number().expect("expected a number")
}

fn eval_bool(source: &str) -> bool {
    let (_, value) = eval(source);
    value.as_bool().expect("expected a boolean")
}

fn eval_string(source: &str) -> String {
    let (vm, value) = eval(source);
    vm.string_value(&value).expect("expected a string").to_string()
}

#[test]
fn test_literals() {
    assert_eq!(eval_number("42"), 42.0);
    assert_eq!(eval_number("-7"), -7.0);
    assert_eq!(eval_number("3.5"), 3.5);
    assert!(eval_bool("true"));
    assert!(!eval_bool("false"));
    assert_eq!(eval_string("\"hello\""), "hello");
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval_number("(+ 1 2)"), 3.0);
    assert_eq!(eval_number("(- 5 2)"), 3.0);
    assert_eq!(eval_number("(* 3 4)"), 12.0);
    assert_eq!(eval_number("(/ 10 4)"), 2.5);
    assert_eq!(eval_number("(+ (* 2 3) (- 10 4))"), 12.0);
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval_string("(+ \"a\" \"b\")"), "ab");
    assert_eq!(eval_string("(+ (+ \"foo\" \" \") \"bar\")"), "foo bar");
    assert_eq!(
        eval_string("(var a \"foo\") (var b \"bar\") (+ a b)"),
        "foobar"
    );
}

#[test]
fn test_comparisons() {
    assert!(eval_bool("(< 1 2)"));
    assert!(!eval_bool("(> 1 2)"));
    assert!(eval_bool("(== 3 3)"));
    assert!(eval_bool("(>= 2 2)"));
    assert!(eval_bool("(<= 1 2)"));
    assert!(eval_bool("(!= 1 2)"));
}

#[test]
fn test_string_comparisons() {
    assert!(eval_bool("(< \"a\" \"b\")"));
    assert!(eval_bool("(== \"x\" \"x\")"));
    assert!(eval_bool("(!= \"x\" \"y\")"));
}

#[test]
fn test_if() {
    assert_eq!(eval_number("(if (== 1 1) 10 20)"), 10.0);
    assert_eq!(eval_number("(if (== 1 2) 10 20)"), 20.0);
    assert_eq!(eval_string("(if (== 1 1) \"yes\" \"no\")"), "yes");
    // A missing alternate still produces a value
    assert_eq!(eval("(if (> 1 2) 10)").1, Value::Bool(false));
    assert_eq!(eval_number("(if (< 1 2) 10)"), 10.0);
}

#[test]
fn test_global_variables() {
    assert_eq!(eval_number("(var x 10) x"), 10.0);
    assert_eq!(eval_number("(var x 10) (set x (+ x 5)) x"), 15.0);
    assert_eq!(eval_number("(var x 1) (var y 2) (+ x y)"), 3.0);
}

#[test]
fn test_set_is_an_expression() {
    assert_eq!(eval_number("(var x 1) (set x (set x 5)) x"), 5.0);
    assert_eq!(eval_number("(var x 1) (set x 9)"), 9.0);
}

#[test]
fn test_blocks_and_locals() {
    assert_eq!(eval_number("(begin 1 2 3)"), 3.0);
    assert_eq!(eval_number("(begin (var x 1) (var y 2) (+ x y))"), 3.0);
    // Nested blocks see enclosing locals
    assert_eq!(
        eval_number("(begin (var x 10) (begin (var y 20) (+ x y)))"),
        30.0
    );
}

#[test]
fn test_block_shadowing() {
    assert_eq!(eval_number("(var x 10) (begin (var x 20) x)"), 20.0);
    // The outer binding is untouched after the block exits
    assert_eq!(eval_number("(var x 10) (begin (var x 20) x) x"), 10.0);
}

#[test]
fn test_block_references_global() {
    assert_eq!(eval_number("(var x 10) (begin (var y 20) (+ x y))"), 30.0);
}

#[test]
fn test_while() {
    assert_eq!(
        eval_number(
            "(var i 0) (var sum 0)
             (while (< i 5)
               (begin
                 (set sum (+ sum i))
                 (set i (+ i 1))))
             sum"
        ),
        10.0
    );
}

#[test]
fn test_while_zero_iterations() {
    assert_eq!(eval_number("(var i 9) (while (< i 5) (set i (+ i 1))) i"), 9.0);
}

#[test]
fn test_functions() {
    assert_eq!(eval_number("(def square (x) (* x x)) (square 7)"), 49.0);
    assert_eq!(eval_number("(def add (a b) (+ a b)) (add 3 4)"), 7.0);
    assert_eq!(eval_number("(def value () 42) (value)"), 42.0);
}

#[test]
fn test_function_with_block_body() {
    assert_eq!(
        eval_number(
            "(def calc (x y)
               (begin
                 (var z 30)
                 (+ (* x y) z)))
             (calc 10 2)"
        ),
        50.0
    );
}

#[test]
fn test_inline_lambda_call() {
    assert_eq!(eval_number("((lambda (x) (* x x)) 6)"), 36.0);
    assert_eq!(eval_number("((lambda () 5))"), 5.0);
}

#[test]
fn test_lambda_bound_to_var() {
    assert_eq!(eval_number("(var dbl (lambda (x) (* x 2))) (dbl 21)"), 42.0);
}

#[test]
fn test_recursion() {
    assert_eq!(
        eval_number(
            "(def factorial (n)
               (if (== n 1)
                 1
                 (* n (factorial (- n 1)))))
             (factorial 5)"
        ),
        120.0
    );
    assert_eq!(
        eval_number(
            "(def fib (n)
               (if (< n 2)
                 n
                 (+ (fib (- n 1)) (fib (- n 2)))))
             (fib 10)"
        ),
        55.0
    );
}

#[test]
fn test_local_functions() {
    assert_eq!(
        eval_number(
            "(def outer (x)
               (begin
                 (def inner (y) (* y 10))
                 (inner x)))
             (outer 4)"
        ),
        40.0
    );
}

#[test]
fn test_higher_order_functions() {
    assert_eq!(
        eval_number("(def apply-twice (f x) (f (f x))) (def inc (n) (+ n 1)) (apply-twice inc 5)"),
        7.0
    );
}

#[test]
fn test_preregistered_globals() {
    assert_eq!(eval_number("VERSION"), 1.0);
    assert_eq!(eval_number("(native-square 4)"), 16.0);
    assert_eq!(eval_number("(sum 3 4)"), 7.0);
    assert_eq!(eval_number("(native-square (sum 1 2))"), 9.0);
}

#[test]
fn test_state_persists_across_exec() {
    let mut vm = Vm::new();
    vm.exec("(var x 1)").expect("first program");
    let value = vm.exec("(set x (+ x 41)) x").expect("second program");
    assert_eq!(value.as_number(), Some(42.0));
    assert_eq!(
        vm.global_value("x").and_then(|v| v.as_number()),
        Some(42.0)
    );
}

#[test]
fn test_render() {
    let mut vm = Vm::new();
    let value = vm.exec("(+ 1 2)").expect("exec");
    assert_eq!(vm.render(&value), "3");
    let value = vm.exec("\"hi\"").expect("exec");
    assert_eq!(vm.render(&value), "\"hi\"");
    let value = vm.exec("(lambda (x) x)").expect("exec");
    assert_eq!(vm.render(&value), "#<fn lambda/1>");
    let value = vm.exec("2.5").expect("exec");
    assert_eq!(vm.render(&value), "2.5");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_undefined_variable_is_a_compile_error() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("undefined-name"),
        Err(EvaError::Compile(_))
    ));
    assert!(matches!(vm.exec("(missing 1)"), Err(EvaError::Compile(_))));
    assert!(matches!(
        vm.exec("(set missing 1)"),
        Err(EvaError::Compile(_))
    ));
}

#[test]
fn test_parse_errors() {
    let mut vm = Vm::new();
    assert!(matches!(vm.exec("(+ 1 2"), Err(EvaError::Parse(_))));
    assert!(matches!(vm.exec(")"), Err(EvaError::Parse(_))));
}

#[test]
fn test_type_errors() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(+ 1 \"a\")"),
        Err(EvaError::Runtime(RuntimeError::TypeError { .. }))
    ));
    assert!(matches!(
        vm.exec("(* \"a\" \"b\")"),
        Err(EvaError::Runtime(RuntimeError::TypeError { .. }))
    ));
    // Conditions must be booleans
    assert!(matches!(
        vm.exec("(if 1 2 3)"),
        Err(EvaError::Runtime(RuntimeError::TypeError { .. }))
    ));
    // Mixed-shape comparison fails loudly
    assert!(matches!(
        vm.exec("(< 1 \"a\")"),
        Err(EvaError::Runtime(RuntimeError::TypeError { .. }))
    ));
}

#[test]
fn test_not_callable() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(var x 1) (x 2)"),
        Err(EvaError::Runtime(RuntimeError::NotCallable(_)))
    ));
}

#[test]
fn test_arity_errors() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(def f (x) x) (f 1 2)"),
        Err(EvaError::Runtime(RuntimeError::ArityError { .. }))
    ));
    assert!(matches!(
        vm.exec("(native-square 1 2)"),
        Err(EvaError::Runtime(RuntimeError::ArityError { .. }))
    ));
}

#[test]
fn test_runaway_recursion_overflows() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(def spin (n) (spin (+ n 1))) (spin 0)"),
        Err(EvaError::Runtime(RuntimeError::StackOverflow))
    ));
}

#[test]
fn test_vm_usable_after_error() {
    let mut vm = Vm::new();
    assert!(vm.exec("(+ 1 \"a\")").is_err());
    let value = vm.exec("(+ 1 2)").expect("recovered");
    assert_eq!(value.as_number(), Some(3.0));
}
