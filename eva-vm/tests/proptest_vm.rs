// eva-vm - Property-based VM tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use eva_vm::Vm;
use proptest::prelude::*;

fn eval_number(source: &str) -> f64 {
    let mut vm = Vm::new();
    let value = vm.exec(source).expect("exec failed");
    value.as_number().expect("expected a number")
}

fn eval_bool(source: &str) -> bool {
    let mut vm = Vm::new();
    let value = vm.exec(source).expect("exec failed");
    value.as_bool().expect("expected a boolean")
}

proptest! {
    #[test]
    fn prop_addition_matches_host(a in -1000i64..1000, b in -1000i64..1000) {
        prop_assert_eq!(eval_number(&format!("(+ {} {})", a, b)), (a + b) as f64);
    }

    #[test]
    fn prop_subtraction_matches_host(a in -1000i64..1000, b in -1000i64..1000) {
        prop_assert_eq!(eval_number(&format!("(- {} {})", a, b)), (a - b) as f64);
    }

    #[test]
    fn prop_multiplication_matches_host(a in -1000i64..1000, b in -1000i64..1000) {
        prop_assert_eq!(eval_number(&format!("(* {} {})", a, b)), (a * b) as f64);
    }

    #[test]
    fn prop_division_matches_host(a in -1000i64..1000, b in 1i64..1000) {
        prop_assert_eq!(eval_number(&format!("(/ {} {})", a, b)), a as f64 / b as f64);
    }

    #[test]
    fn prop_comparison_table(a in -50i64..50, b in -50i64..50, op in 0usize..6) {
        let symbols = ["<", ">", "==", ">=", "<=", "!="];
        let expected = match op {
            0 => a < b,
            1 => a > b,
            2 => a == b,
            3 => a >= b,
            4 => a <= b,
            _ => a != b,
        };
        prop_assert_eq!(
            eval_bool(&format!("({} {} {})", symbols[op], a, b)),
            expected
        );
    }

    #[test]
    fn prop_set_of_set_leaves_value(v in -1000i64..1000) {
        prop_assert_eq!(
            eval_number(&format!("(var x 0) (set x (set x {})) x", v)),
            v as f64
        );
    }

    #[test]
    fn prop_block_yields_last_expression(values in proptest::collection::vec(-100i64..100, 1..6)) {
        let body = values
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let last = *values.last().unwrap();
        prop_assert_eq!(eval_number(&format!("(begin {})", body)), last as f64);
    }

    #[test]
    fn prop_while_sums_arithmetic_series(n in 0i64..25) {
        let source = format!(
            "(var i 0) (var sum 0)
             (while (< i {n})
               (begin
                 (set sum (+ sum i))
                 (set i (+ i 1))))
             sum"
        );
        prop_assert_eq!(eval_number(&source), (n * (n - 1) / 2).max(0) as f64);
    }

    #[test]
    fn prop_closure_captures_value(a in -100i64..100, b in -100i64..100) {
        let source = format!(
            "(var make-adder (lambda (n) (lambda (x) (+ x n))))
             ((make-adder {a}) {b})"
        );
        prop_assert_eq!(eval_number(&source), (a + b) as f64);
    }

    #[test]
    fn prop_heap_accounting_holds_after_any_run(n in 0usize..20) {
        let mut vm = Vm::new();
        // A mix of runtime allocations: strings, cells, closures
        let source = format!(
            "(var s \"\")
             (var i 0)
             (while (< i {n})
               (begin
                 (set s (+ s \"a\"))
                 (set i (+ i 1))))
             (var f (lambda (k) (lambda () k)))
             (f 1)
             s"
        );
        vm.exec(&source).expect("exec failed");
        prop_assert_eq!(vm.heap().bytes_allocated(), vm.heap().live_bytes());
        vm.collect_garbage();
        prop_assert_eq!(vm.heap().bytes_allocated(), vm.heap().live_bytes());
        prop_assert!(vm.heap().all_marks_clear());
    }
}
