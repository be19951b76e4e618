// eva-vm - Disassembler tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use eva_vm::Vm;

fn disassembly(source: &str) -> String {
    let mut vm = Vm::new();
    vm.exec(source).expect("exec failed");
    vm.disassemble()
}

#[test]
fn test_arithmetic_listing() {
    let out = disassembly("(+ 1 2)");
    assert!(out.contains("Disassembly: main"));
    assert!(out.contains("CONST"));
    assert!(out.contains("ADD"));
    assert!(out.contains("HALT"));
    // Constant annotations show the pool values
    assert!(out.contains("(1)"));
    assert!(out.contains("(2)"));
}

#[test]
fn test_branch_listing() {
    let out = disassembly("(if (< 1 2) 10 20)");
    assert!(out.contains("COMPARE"));
    assert!(out.contains("(<)"));
    assert!(out.contains("JMP_IF_FALSE"));
    assert!(out.contains("JMP"));
}

#[test]
fn test_global_annotations() {
    let out = disassembly("(var x 10) (set x 1) x");
    assert!(out.contains("SET_GLOBAL"));
    assert!(out.contains("GET_GLOBAL"));
    assert!(out.contains("(x)"));
}

#[test]
fn test_function_listing() {
    let out = disassembly("(def square (x) (* x x)) (square 2)");
    // One section per code object
    assert!(out.contains("Disassembly: main"));
    assert!(out.contains("Disassembly: square"));
    assert!(out.contains("MUL"));
    assert!(out.contains("SCOPE_EXIT"));
    assert!(out.contains("RETURN"));
    assert!(out.contains("CALL"));
    // The function constant is annotated with its name and arity
    assert!(out.contains("square/1"));
}

#[test]
fn test_closure_listing() {
    let out = disassembly("(var make (lambda (n) (lambda () n))) (make 1)");
    assert!(out.contains("LOAD_CELL"));
    assert!(out.contains("MAKE_FUNCTION"));
    assert!(out.contains("SET_CELL"));
    assert!(out.contains("GET_CELL"));
    // Cell operands carry the variable name
    assert!(out.contains("(n)"));
}

#[test]
fn test_offsets_are_hex() {
    let out = disassembly("1");
    assert!(out.contains("0000"));
}

#[test]
fn test_disassembly_is_deterministic() {
    let source = "(var x 10)
                  (def f (n) (if (< n x) \"lo\" \"hi\"))
                  (f 3)";
    assert_eq!(disassembly(source), disassembly(source));
}
