//! Embedding-boundary tests: foreign functions, globals shared across
//! compilations, and pointers into host memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use cscript::{CScriptError, CompileError, Environment, Value, compile};

fn assert_float(value: Value, expected: f64) {
    let Value::Float(got) = value else {
        panic!("expected a float, got {value:?}");
    };
    assert!(
        (got - expected).abs() < 1e-9,
        "expected {expected}, got {got}"
    );
}

// ============================================================================
// Foreign calls
// ============================================================================

#[test]
fn double_arguments_and_return() {
    let mut env = Environment::new();
    env.register_foreign("add", |a: f64, b: f64| a + b);
    let script = compile("add(3.14, 0.1);", &mut env).unwrap();
    assert_float(script.run(&mut env, &[]).unwrap(), 3.24);
}

#[test]
fn integer_arguments_promote_to_double_parameters() {
    let mut env = Environment::new();
    env.register_foreign("half", |x: f64| x / 2.0);
    let script = compile("(int i) half(i);", &mut env).unwrap();
    assert_float(script.run(&mut env, &[Value::Int(7)]).unwrap(), 3.5);
}

#[test]
fn integer_return_lands_in_the_result() {
    let mut env = Environment::new();
    env.register_foreign("twice", |a: i64| a * 2);
    let script = compile("twice(21);", &mut env).unwrap();
    assert_eq!(script.run(&mut env, &[]).unwrap(), Value::Int(42));
}

#[test]
fn bool_return_reads_as_zero_or_one() {
    let mut env = Environment::new();
    env.register_foreign("is_even", |a: i64| a % 2 == 0);
    let script = compile("is_even(4) + is_even(3);", &mut env).unwrap();
    assert_eq!(script.run(&mut env, &[]).unwrap(), Value::Int(1));
}

#[test]
fn void_return_yields_zero_and_runs_the_side_effect() {
    let sink = Arc::new(AtomicI64::new(0));
    let seen = Arc::clone(&sink);
    let mut env = Environment::new();
    env.register_foreign("record", move |v: i64| {
        seen.store(v, Ordering::SeqCst);
    });
    let script = compile("record(17);", &mut env).unwrap();
    assert_eq!(script.run(&mut env, &[]).unwrap(), Value::Int(0));
    assert_eq!(sink.load(Ordering::SeqCst), 17);
}

#[test]
fn four_arguments_marshal_in_order() {
    let mut env = Environment::new();
    env.register_foreign("pack", |a: i64, b: i64, c: i64, d: i64| {
        a * 1000 + b * 100 + c * 10 + d
    });
    let script = compile("(int a) pack(a, 2, 3, 4);", &mut env).unwrap();
    assert_eq!(
        script.run(&mut env, &[Value::Int(1)]).unwrap(),
        Value::Int(1234)
    );
}

#[test]
fn argument_registers_survive_the_call() {
    // Parameters live in the same registers the call uses for staging,
    // so they must be parked and restored around it.
    let mut env = Environment::new();
    env.register_foreign("sum2", |a: i64, b: i64| a + b);
    let script = compile("(int a, int b) sum2(a, b) + a + b;", &mut env).unwrap();
    assert_eq!(
        script.run(&mut env, &[Value::Int(3), Value::Int(4)]).unwrap(),
        Value::Int(14)
    );
}

#[test]
fn pointer_parameters_reach_the_host_callable() {
    let buf = [11i64, 22, 33];
    let mut env = Environment::new();
    env.register_foreign("first", |p: usize| unsafe { *(p as *const i64) });
    let script = compile("(int* p) first(p);", &mut env).unwrap();
    let result = script
        .run(&mut env, &[Value::Int(buf.as_ptr() as i64)])
        .unwrap();
    assert_eq!(result, Value::Int(11));
}

#[test]
fn compiled_scripts_keep_the_registration_they_saw() {
    let mut env = Environment::new();
    env.register_foreign("answer", || 1i64);
    let old = compile("answer();", &mut env).unwrap();
    env.register_foreign("answer", || 2i64);
    let new = compile("answer();", &mut env).unwrap();
    assert_eq!(old.run(&mut env, &[]).unwrap(), Value::Int(1));
    assert_eq!(new.run(&mut env, &[]).unwrap(), Value::Int(2));
}

#[test]
fn unknown_functions_are_compile_errors() {
    let mut env = Environment::new();
    let err = compile("missing(1);", &mut env).unwrap_err();
    assert!(matches!(
        err,
        CScriptError::Compile(CompileError::UnknownFunction { .. })
    ));
}

#[test]
fn wrong_argument_count_is_rejected() {
    let mut env = Environment::new();
    env.register_foreign("twice", |a: i64| a * 2);
    let err = compile("twice(1, 2);", &mut env).unwrap_err();
    assert!(matches!(
        err,
        CScriptError::Compile(CompileError::WrongArity { .. })
    ));
}

#[test]
fn doubles_do_not_demote_to_integer_parameters() {
    let mut env = Environment::new();
    env.register_foreign("twice", |a: i64| a * 2);
    let err = compile("twice(1.5);", &mut env).unwrap_err();
    assert!(matches!(
        err,
        CScriptError::Compile(CompileError::ArgTypeMismatch { .. })
    ));
}

// ============================================================================
// Globals across compilations
// ============================================================================

#[test]
fn globals_persist_across_scripts() {
    let mut env = Environment::new();
    let init = compile("int $count = 10;", &mut env).unwrap();
    init.run(&mut env, &[]).unwrap();

    let bump = compile("$count += 5; $count;", &mut env).unwrap();
    assert_eq!(bump.run(&mut env, &[]).unwrap(), Value::Int(15));
    assert_eq!(bump.run(&mut env, &[]).unwrap(), Value::Int(20));
}

#[test]
fn global_arrays_are_shared_state() {
    let mut env = Environment::new();
    let fill = compile("float $samples[2]; $samples[0] = 1.5; $samples[1] = 2.0;", &mut env).unwrap();
    fill.run(&mut env, &[]).unwrap();

    let read = compile("$samples[0] + $samples[1];", &mut env).unwrap();
    assert_float(read.run(&mut env, &[]).unwrap(), 3.5);
}

#[test]
fn redeclaring_a_global_fails_across_scripts() {
    let mut env = Environment::new();
    compile("int $g;", &mut env).unwrap();
    let err = compile("float $g;", &mut env).unwrap_err();
    assert!(matches!(
        err,
        CScriptError::Compile(CompileError::RedeclaredVariable { .. })
    ));
}

// ============================================================================
// Pointers into host memory
// ============================================================================

#[test]
fn integer_pointer_writes_reach_the_host_buffer() {
    let mut buf = [0i64; 4];
    let mut env = Environment::new();
    let script = compile(
        "(int* p) for (int i = 0; i < 4; ++i) { p[i] = i * 2; } p[3];",
        &mut env,
    )
    .unwrap();
    let result = script
        .run(&mut env, &[Value::Int(buf.as_mut_ptr() as i64)])
        .unwrap();
    assert_eq!(result, Value::Int(6));
    assert_eq!(buf, [0, 2, 4, 6]);
}

#[test]
fn float_pointer_deref_and_index() {
    let mut buf = [1.0f64, 7.5];
    let mut env = Environment::new();
    let script = compile("(float* p) *p = 2.5; p[1];", &mut env).unwrap();
    let result = script
        .run(&mut env, &[Value::Int(buf.as_mut_ptr() as i64)])
        .unwrap();
    assert_float(result, 7.5);
    assert_eq!(buf[0], 2.5);
}

#[test]
fn bare_pointer_names_read_as_addresses() {
    let buf = [0i64; 1];
    let addr = buf.as_ptr() as i64;
    let mut env = Environment::new();
    let script = compile("(int* p) p;", &mut env).unwrap();
    assert_eq!(
        script.run(&mut env, &[Value::Int(addr)]).unwrap(),
        Value::Int(addr)
    );
}

// ============================================================================
// Script reuse
// ============================================================================

#[test]
fn one_script_runs_many_times() {
    let mut env = Environment::new();
    let script = compile("(int i) i * i;", &mut env).unwrap();
    assert_eq!(script.run(&mut env, &[Value::Int(5)]).unwrap(), Value::Int(25));
    assert_eq!(script.run(&mut env, &[Value::Int(6)]).unwrap(), Value::Int(36));
}
