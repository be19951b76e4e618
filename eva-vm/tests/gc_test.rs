// eva-vm - Garbage collection tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use eva_vm::{STACK_LIMIT, Vm};

#[test]
fn test_byte_accounting_invariant_after_run() {
    let mut vm = Vm::new();
    vm.exec("(def square (x) (* x x)) (square 7)").expect("exec");
    let heap = vm.heap();
    assert_eq!(heap.bytes_allocated(), heap.live_bytes());
    assert!(heap.all_marks_clear());
}

#[test]
fn test_constants_survive_collection() {
    let mut vm = Vm::new();
    vm.exec("(def f (x) (* x x)) (f 2)").expect("exec");
    let freed = vm.collect_garbage();
    // Code objects, functions, interned strings and natives are all
    // rooted through the constant-object set and the globals
    assert_eq!(freed, 0);
    // The compiled function still runs after the cycle
    let value = vm.exec("(f 3)").expect("exec after gc");
    assert_eq!(value.as_number(), Some(9.0));
}

#[test]
fn test_unreachable_closures_are_reclaimed() {
    // Effectively disable the automatic collector so the forced cycle
    // below observes all the garbage at once
    let mut vm = Vm::with_config(STACK_LIMIT, usize::MAX);
    vm.exec("(var waste (lambda (n) (lambda () n))) (waste 1) (waste 2) 0")
        .expect("exec");
    let before = vm.heap().object_count();
    let freed = vm.collect_garbage();
    // The discarded closures (and at least one orphaned cell) go away
    assert!(freed >= 2, "freed only {} objects", freed);
    assert_eq!(vm.heap().object_count(), before - freed);
    assert_eq!(vm.heap().bytes_allocated(), vm.heap().live_bytes());
}

#[test]
fn test_reachable_closure_survives_collection() {
    let mut vm = Vm::new();
    vm.exec("(var make (lambda (n) (lambda () n))) (var keep (make 42))")
        .expect("exec");
    vm.collect_garbage();
    let value = vm.exec("(keep)").expect("closure after gc");
    assert_eq!(value.as_number(), Some(42.0));
}

#[test]
fn test_threshold_triggers_collection_during_run() {
    // A tiny threshold forces cycles while the loop churns strings
    let mut vm = Vm::with_config(STACK_LIMIT, 256);
    let value = vm
        .exec(
            "(var i 0)
             (var s \"\")
             (while (< i 50)
               (begin
                 (set s (+ s \"x\"))
                 (set i (+ i 1))))
             s",
        )
        .expect("exec");
    assert_eq!(vm.string_value(&value).map(str::len), Some(50));
    let stats = vm.heap_stats();
    assert!(stats.collections > 0, "expected at least one collection");
    assert_eq!(vm.heap().bytes_allocated(), vm.heap().live_bytes());
}

#[test]
fn test_live_cells_survive_collection_pressure() {
    let mut vm = Vm::with_config(STACK_LIMIT, 256);
    let value = vm
        .exec(
            "(var make-counter
               (lambda ()
                 (begin
                   (var n 0)
                   (lambda ()
                     (begin
                       (set n (+ n 1))
                       n)))))
             (var c (make-counter))
             (var i 0)
             (var junk \"\")
             (while (< i 30)
               (begin
                 (set junk (+ junk \"y\"))
                 (c)
                 (set i (+ i 1))))
             (c)",
        )
        .expect("exec");
    // The counter's cell lived through every collection cycle
    assert_eq!(value.as_number(), Some(31.0));
    assert!(vm.heap_stats().collections > 0);
}

#[test]
fn test_instance_garbage_is_reclaimed() {
    let mut vm = Vm::with_config(STACK_LIMIT, usize::MAX);
    vm.exec(
        "(class Box null
           (def constructor (self v)
             (begin
               (set (prop self v) v)
               self)))
         (var i 0)
         (while (< i 10)
           (begin
             (new Box i)
             (set i (+ i 1))))
         0",
    )
    .expect("exec");
    let freed = vm.collect_garbage();
    assert!(freed >= 10, "freed only {} instances", freed);
    assert_eq!(vm.heap().bytes_allocated(), vm.heap().live_bytes());
}

#[test]
fn test_stats_display() {
    let mut vm = Vm::new();
    vm.exec("1").expect("exec");
    let rendered = vm.heap_stats().to_string();
    assert!(rendered.contains("objects:"));
    assert!(rendered.contains("bytes:"));
}
