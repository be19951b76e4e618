// eva-vm - Class, instance and property tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use eva_vm::error::EvaError;
use eva_vm::{RuntimeError, Vm};

const POINT: &str = "
(class Point null
  (begin
    (def constructor (self x y)
      (begin
        (set (prop self x) x)
        (set (prop self y) y)
        self))
    (def calc (self)
      (+ (prop self x) (prop self y)))))
";

const POINT_3D: &str = "
(class Point3D Point
  (begin
    (def constructor (self x y z)
      (begin
        ((prop (super Point3D) constructor) self x y)
        (set (prop self z) z)
        self))
    (def calc (self)
      (+ ((prop (super Point3D) calc) self) (prop self z)))))
";

fn eval_number(source: &str) -> f64 {
    let mut vm = Vm::new();
    let value = vm.exec(source).expect("exec failed");
    value.as_number().expect("expected a number")
}

#[test]
fn test_instantiation_and_method_call() {
    let source = format!(
        "{POINT}
         (var p (new Point 10 20))
         ((prop p calc) p)"
    );
    assert_eq!(eval_number(&source), 30.0);
}

#[test]
fn test_instance_properties() {
    let source = format!(
        "{POINT}
         (var p (new Point 3 4))
         (prop p x)"
    );
    assert_eq!(eval_number(&source), 3.0);
}

#[test]
fn test_property_assignment_after_construction() {
    let source = format!(
        "{POINT}
         (var p (new Point 1 2))
         (set (prop p x) 99)
         (prop p x)"
    );
    assert_eq!(eval_number(&source), 99.0);
}

#[test]
fn test_property_assignment_is_an_expression() {
    let source = format!(
        "{POINT}
         (var p (new Point 1 2))
         (set (prop p x) 41)"
    );
    assert_eq!(eval_number(&source), 41.0);
}

#[test]
fn test_inheritance_and_super() {
    let source = format!(
        "{POINT}
         {POINT_3D}
         (var q (new Point3D 10 20 30))
         ((prop q calc) q)"
    );
    assert_eq!(eval_number(&source), 60.0);
}

#[test]
fn test_inherited_method_resolves_through_chain() {
    // Point3D does not define `calc2`; resolution climbs to Point
    let source = format!(
        "{POINT}
         (class Point3D Point
           (begin
             (def constructor (self x y z)
               (begin
                 ((prop (super Point3D) constructor) self x y)
                 (set (prop self z) z)
                 self))))
         (var q (new Point3D 7 8 9))
         ((prop q calc) q)"
    );
    assert_eq!(eval_number(&source), 15.0);
}

#[test]
fn test_class_fields() {
    assert_eq!(
        eval_number(
            "(class Config null
               (var max 100))
             (prop Config max)"
        ),
        100.0
    );
}

#[test]
fn test_two_instances_have_separate_state() {
    let source = format!(
        "{POINT}
         (var a (new Point 1 2))
         (var b (new Point 10 20))
         (set (prop a x) 100)
         (+ (prop a x) (prop b x))"
    );
    assert_eq!(eval_number(&source), 110.0);
}

#[test]
fn test_render_of_class_values() {
    let mut vm = Vm::new();
    let value = vm
        .exec(&format!("{POINT} (new Point 1 2)"))
        .expect("exec failed");
    assert_eq!(vm.render(&value), "#<instance Point>");
    let value = vm.exec("Point").expect("exec failed");
    assert_eq!(vm.render(&value), "#<class Point>");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unknown_property() {
    let mut vm = Vm::new();
    let source = format!(
        "{POINT}
         (var p (new Point 1 2))
         (prop p nope)"
    );
    assert!(matches!(
        vm.exec(&source),
        Err(EvaError::Runtime(RuntimeError::PropertyNotFound { .. }))
    ));
}

#[test]
fn test_unknown_superclass() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(class C Missing (def m (self) 1))"),
        Err(EvaError::Compile(_))
    ));
}

#[test]
fn test_class_must_be_top_level() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(def f () (begin (class C null (def m (self) 1)) 0))"),
        Err(EvaError::Compile(_))
    ));
}

#[test]
fn test_method_capture_is_rejected() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(var outside 1) (def wrap (x) (begin (class C null (def m (self) x)) 0))"),
        Err(EvaError::Compile(_))
    ));
}

#[test]
fn test_constructor_arity_is_checked() {
    let mut vm = Vm::new();
    let source = format!("{POINT} (new Point 1)");
    assert!(matches!(
        vm.exec(&source),
        Err(EvaError::Runtime(RuntimeError::ArityError { .. }))
    ));
}

#[test]
fn test_new_on_non_class() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(var x 1) (new x)"),
        Err(EvaError::Runtime(RuntimeError::TypeError { .. }))
    ));
}

#[test]
fn test_missing_constructor() {
    let mut vm = Vm::new();
    assert!(matches!(
        vm.exec("(class Bare null (def m (self) 1)) (new Bare)"),
        Err(EvaError::Runtime(RuntimeError::PropertyNotFound { .. }))
    ));
}
