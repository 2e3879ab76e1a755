//! End-to-end tests driving full Tok programs through the interpreter.
//!
//! Assertions read back observable global variables instead of capturing
//! stdout, so the whole pipeline (scanner, compiler, VM, collector) is
//! exercised on real programs.

use super::{InterpretResult, VM};
use crate::value::Value;

fn run(vm: &mut VM, source: &str) -> InterpretResult {
    vm.interpret(source.as_bytes())
}

fn run_ok(source: &str) -> VM {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, source), InterpretResult::Ok);
    vm
}

fn global(vm: &mut VM, name: &str) -> Value {
    let name_id = vm.heap.string_id(&name);
    *vm.globals
        .get(&name_id)
        .unwrap_or_else(|| panic!("global '{name}' is not defined"))
}

fn global_string(vm: &mut VM, name: &str) -> String {
    let value = global(vm, name);
    value.to_string(&vm.heap)
}

#[test]
fn test_empty_program() {
    run_ok("");
}

#[test]
fn test_arithmetic_precedence() {
    let mut vm = run_ok("var result = 1 + 2 * 3;");
    assert_eq!(global(&mut vm, "result"), Value::Number(7.0));

    let mut vm = run_ok("var result = (1 + 2) * 3 - 4 / 2;");
    assert_eq!(global(&mut vm, "result"), Value::Number(7.0));

    let mut vm = run_ok("var result = -(2 + 3);");
    assert_eq!(global(&mut vm, "result"), Value::Number(-5.0));
}

#[test]
fn test_comparison_and_equality() {
    let mut vm = run_ok(
        "var lt = 1 < 2;
         var le = 2 <= 1;
         var gt = 3 > 2;
         var ge = 2 >= 3;
         var eq = 1 == 1;
         var ne = 1 != 1;",
    );
    assert_eq!(global(&mut vm, "lt"), Value::Bool(true));
    assert_eq!(global(&mut vm, "le"), Value::Bool(false));
    assert_eq!(global(&mut vm, "gt"), Value::Bool(true));
    assert_eq!(global(&mut vm, "ge"), Value::Bool(false));
    assert_eq!(global(&mut vm, "eq"), Value::Bool(true));
    assert_eq!(global(&mut vm, "ne"), Value::Bool(false));
}

#[test]
fn test_nan_is_not_equal_to_itself() {
    let mut vm = run_ok("var nan = 0 / 0; var result = nan == nan;");
    assert_eq!(global(&mut vm, "result"), Value::Bool(false));
}

#[test]
fn test_truthiness() {
    // Only nil and false are falsey; 0 and "" are truthy.
    let mut vm = run_ok(
        "var zero = !0;
         var empty = !\"\";
         var nil_ = !nil;
         var false_ = !false;",
    );
    assert_eq!(global(&mut vm, "zero"), Value::Bool(false));
    assert_eq!(global(&mut vm, "empty"), Value::Bool(false));
    assert_eq!(global(&mut vm, "nil_"), Value::Bool(true));
    assert_eq!(global(&mut vm, "false_"), Value::Bool(true));
}

#[test]
fn test_string_concatenation() {
    let mut vm = run_ok("var a = \"hi\"; var b = \"!\"; var result = a + b;");
    assert_eq!(global_string(&mut vm, "result"), "hi!");
}

#[test]
fn test_concatenation_results_are_interned() {
    // Two different concatenation paths produce the same string object.
    let mut vm = run_ok(
        "var x = \"hi\" + \"!\";
         var y = \"h\" + \"i!\";
         var same = x == y;",
    );
    assert_eq!(global(&mut vm, "same"), Value::Bool(true));
    assert_eq!(global(&mut vm, "x"), global(&mut vm, "y"));
}

#[test]
fn test_logical_operators_yield_operands() {
    let mut vm = run_ok(
        "var a = nil and 1;
         var b = 1 and 2;
         var c = nil or \"x\";
         var d = 1 or 2;",
    );
    assert_eq!(global(&mut vm, "a"), Value::Nil);
    assert_eq!(global(&mut vm, "b"), Value::Number(2.0));
    assert_eq!(global_string(&mut vm, "c"), "x");
    assert_eq!(global(&mut vm, "d"), Value::Number(1.0));
}

#[test]
fn test_logical_operators_short_circuit() {
    let mut vm = run_ok(
        "var called = false;
         fun touch() { called = true; return true; }
         var a = false and touch();
         var b = true or touch();",
    );
    assert_eq!(global(&mut vm, "called"), Value::Bool(false));
}

#[test]
fn test_if_else() {
    let mut vm = run_ok(
        "var a = nil;
         if (1 < 2) a = \"then\"; else a = \"else\";
         var b = nil;
         if (1 > 2) b = \"then\"; else b = \"else\";",
    );
    assert_eq!(global_string(&mut vm, "a"), "then");
    assert_eq!(global_string(&mut vm, "b"), "else");
}

#[test]
fn test_while_loop() {
    let mut vm = run_ok(
        "var i = 0;
         var sum = 0;
         while (i < 5) {
           sum = sum + i;
           i = i + 1;
         }",
    );
    assert_eq!(global(&mut vm, "sum"), Value::Number(10.0));
}

#[test]
fn test_for_loop() {
    let mut vm = run_ok("var sum = 0; for (var i = 0; i < 5; i = i + 1) sum = sum + i;");
    assert_eq!(global(&mut vm, "sum"), Value::Number(10.0));
}

#[test]
fn test_for_loop_without_clauses() {
    // An infinite `for (;;)` can only be left through a return.
    let mut vm = run_ok(
        "fun count() {
           var i = 0;
           for (;;) {
             i = i + 1;
             if (i == 10) return i;
           }
         }
         var result = count();",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(10.0));
}

#[test]
fn test_block_scoping_and_shadowing() {
    let mut vm = run_ok(
        "var a = \"outer\";
         var witnessed = nil;
         {
           var a = \"inner\";
           witnessed = a;
         }
         var after = a;",
    );
    assert_eq!(global_string(&mut vm, "witnessed"), "inner");
    assert_eq!(global_string(&mut vm, "after"), "outer");
}

#[test]
fn test_functions_and_recursion() {
    let mut vm = run_ok(
        "fun fib(n) {
           if (n < 2) return n;
           return fib(n - 1) + fib(n - 2);
         }
         var result = fib(10);",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(55.0));
}

#[test]
fn test_function_without_return_yields_nil() {
    let mut vm = run_ok("fun noop() {} var result = noop();");
    assert_eq!(global(&mut vm, "result"), Value::Nil);
}

#[test]
fn test_arguments_evaluated_left_to_right() {
    let mut vm = run_ok(
        "var trace = \"\";
         fun mark(x) { trace = trace + x; return x; }
         fun three(a, b, c) { return a + b + c; }
         var result = three(mark(\"a\"), mark(\"b\"), mark(\"c\"));",
    );
    assert_eq!(global_string(&mut vm, "trace"), "abc");
    assert_eq!(global_string(&mut vm, "result"), "abc");
}

#[test]
fn test_closure_counter() {
    let mut vm = run_ok(
        "fun makeCounter() {
           var i = 0;
           fun count() { i = i + 1; return i; }
           return count;
         }
         var c = makeCounter();
         c(); c();
         var result = c();",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(3.0));
}

#[test]
fn test_closures_share_upvalues() {
    let mut vm = run_ok(
        "var set_;
         var get_;
         fun main() {
           var a = \"initial\";
           fun set() { a = \"updated\"; }
           fun get() { return a; }
           set_ = set;
           get_ = get;
         }
         main();
         set_();
         var result = get_();",
    );
    assert_eq!(global_string(&mut vm, "result"), "updated");
}

#[test]
fn test_upvalues_close_at_scope_exit() {
    let mut vm = run_ok(
        "var first;
         var second;
         {
           var i = 1;
           fun capture() { return i; }
           first = capture;
         }
         {
           var i = 2;
           fun capture() { return i; }
           second = capture;
         }
         var a = first();
         var b = second();",
    );
    assert_eq!(global(&mut vm, "a"), Value::Number(1.0));
    assert_eq!(global(&mut vm, "b"), Value::Number(2.0));
}

#[test]
fn test_class_init_and_fields() {
    let mut vm = run_ok(
        "class Box { init(v) { this.v = v; } }
         var result = Box(42).v;",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(42.0));
}

#[test]
fn test_methods_and_this() {
    let mut vm = run_ok(
        "class Counter {
           init() { this.count = 0; }
           bump() { this.count = this.count + 1; return this.count; }
         }
         var c = Counter();
         c.bump();
         var result = c.bump();",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(2.0));
}

#[test]
fn test_bound_methods_carry_their_receiver() {
    let mut vm = run_ok(
        "class Greeter {
           init(name) { this.name = name; }
           greet() { return \"hello \" + this.name; }
         }
         var method = Greeter(\"tok\").greet;
         var result = method();",
    );
    assert_eq!(global_string(&mut vm, "result"), "hello tok");
}

#[test]
fn test_fields_override_methods() {
    let mut vm = run_ok(
        "class C { m() { return 1; } }
         fun two() { return 2; }
         var c = C();
         c.m = two;
         var result = c.m();",
    );
    assert_eq!(global(&mut vm, "result"), Value::Number(2.0));
}

#[test]
fn test_instance_without_init_takes_no_arguments() {
    let mut vm = run_ok("class Empty {} var instance = Empty(); var ok = true;");
    assert_eq!(global(&mut vm, "ok"), Value::Bool(true));
    assert_eq!(
        run(&mut vm, "Empty(1);"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn test_init_returns_the_instance() {
    let mut vm = run_ok(
        "class Box { init() { this.v = 1; } }
         var box = Box();
         var again = box.init();
         var same = box == again;",
    );
    assert_eq!(global(&mut vm, "same"), Value::Bool(true));
}

#[test]
fn test_inheritance_and_super() {
    let mut vm = run_ok(
        "class A { greet() { return \"A\"; } }
         class B < A { greet() { return super.greet() + \"B\"; } }
         var result = B().greet();",
    );
    assert_eq!(global_string(&mut vm, "result"), "AB");
}

#[test]
fn test_methods_are_copied_down_at_class_definition() {
    let mut vm = run_ok(
        "class A { inherited() { return \"from A\"; } }
         class B < A {}
         var result = B().inherited();",
    );
    assert_eq!(global_string(&mut vm, "result"), "from A");
}

#[test]
fn test_super_invoke() {
    let mut vm = run_ok(
        "class A { describe() { return \"base\"; } }
         class B < A {
           describe() { return super.describe() + \"+sub\"; }
         }
         class C < B {
           describe() { return super.describe() + \"+subsub\"; }
         }
         var result = C().describe();",
    );
    assert_eq!(global_string(&mut vm, "result"), "base+sub+subsub");
}

#[test]
fn test_globals_persist_across_interprets() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "var a = 1;"), InterpretResult::Ok);
    assert_eq!(run(&mut vm, "var b = a + 1;"), InterpretResult::Ok);
    assert_eq!(global(&mut vm, "b"), Value::Number(2.0));
}

#[test]
fn test_clock_native() {
    let mut vm = run_ok("var t = clock(); var positive = t >= 0;");
    assert_eq!(global(&mut vm, "positive"), Value::Bool(true));
    assert!(matches!(global(&mut vm, "t"), Value::Number(_)));
}

#[test]
fn test_call_frame_depth_boundary() {
    // Depth 64 (the script frame plus 63 calls) executes.
    let mut vm = VM::new();
    assert_eq!(
        run(
            &mut vm,
            "fun rec(n) { if (n > 0) rec(n - 1); } rec(62); var ok = true;"
        ),
        InterpretResult::Ok
    );
    assert_eq!(global(&mut vm, "ok"), Value::Bool(true));

    // One frame more overflows.
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "fun rec(n) { if (n > 0) rec(n - 1); } rec(63);"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn test_stack_overflow_on_unbounded_recursion() {
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "fun f() { f(); } f();"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn test_runtime_error_mixed_add_operands() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "1 + \"x\";"), InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_error_calling_non_callable() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "var x; x();"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "\"str\"();"), InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_error_undefined_property() {
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "class A{} A().foo;"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn test_runtime_error_non_class_superclass() {
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "class A{} class B < 3 {}"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn test_runtime_error_undefined_globals() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "missing;"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "missing = 1;"), InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_error_wrong_arity() {
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "fun f(a, b) {} f(1);"),
        InterpretResult::RuntimeError
    );
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "clock(1);"), InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_error_property_on_non_instance() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "1.field;"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "1.field = 2;"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "1.method();"), InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_error_numeric_operand_types() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "-\"x\";"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "\"a\" < \"b\";"), InterpretResult::RuntimeError);
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "nil * 2;"), InterpretResult::RuntimeError);
}

#[test]
fn test_vm_is_reusable_after_runtime_error() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "1 + \"x\";"), InterpretResult::RuntimeError);
    assert_eq!(run(&mut vm, "var ok = 1 + 1;"), InterpretResult::Ok);
    assert_eq!(global(&mut vm, "ok"), Value::Number(2.0));
}

#[test]
fn test_compile_error_is_reported_to_the_driver() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "var 1 = 2;"), InterpretResult::CompileError);
}

#[test]
fn test_garbage_collection_during_instance_churn() {
    // Allocates well past the first collection threshold; everything
    // unreachable is collected mid-run while live values survive.
    let mut vm = run_ok(
        "class Box { init(v) { this.v = v; } }
         var keep = Box(\"persistent\");
         for (var i = 0; i < 50000; i = i + 1) {
           var temporary = Box(i);
         }
         var result = keep.v;",
    );
    assert_eq!(global_string(&mut vm, "result"), "persistent");
}

#[test]
fn test_garbage_collection_keeps_closed_upvalues() {
    let mut vm = run_ok(
        "fun make(tag) {
           var captured = tag + \"!\";
           fun get() { return captured; }
           return get;
         }
         var getter = make(\"kept\");
         for (var i = 0; i < 50000; i = i + 1) {
           var churn = make(\"garbage\");
         }
         var result = getter();",
    );
    assert_eq!(global_string(&mut vm, "result"), "kept");
}
