//! End-to-end interpreter scenarios: hand-assembled method bodies run
//! through the processor facade.

use jasper_core::opcode::array_type;
use jasper_core::Opcode as Op;
use jasper_core::TypeCode;
use jasper_runtime::{
    AccessFlags, ClassBuilder, ClassRef, ClassVmFlags, Code, ConstPool, ExceptionHandler,
    HostSystem, JValue, LoaderId, Method, ObjRef, PoolEntry, Runtime,
};
use jasper_vm::Processor;
use std::sync::Arc;

fn setup() -> (Arc<Runtime>, Processor) {
    let runtime = Runtime::new();
    let processor = Processor::new(runtime.clone());
    (runtime, processor)
}

fn static_flags() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC
}

/// One-method class holding a static bytecode method.
fn static_method_class(
    runtime: &Runtime,
    class_name: &str,
    method_name: &str,
    spec: &str,
    code: Code,
) -> ClassRef {
    ClassBuilder::new(class_name)
        .super_class(runtime.well_known().object)
        .method(Method::bytecode(method_name, spec, static_flags(), code).unwrap())
        .build(runtime)
        .unwrap()
}

fn invoke_static(
    processor: &Processor,
    class: ClassRef,
    name: &str,
    spec: &str,
    args: &[JValue],
) -> Result<Option<JValue>, ObjRef> {
    let method = class.lookup_method(name, spec).unwrap();
    let mut thread = processor.make_thread();
    processor.invoke(&mut thread, method, None, args)
}

fn thrown_class(result: Result<Option<JValue>, ObjRef>) -> ClassRef {
    result.unwrap_err().get().unwrap().class()
}

// =============================================================================
// Arithmetic and control flow
// =============================================================================

#[test]
fn add_then_multiply() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Iload0 as u8,
            Op::Iload1 as u8,
            Op::Iadd as u8,
            Op::Iload2 as u8,
            Op::Imul as u8,
            Op::Ireturn as u8,
        ],
        2,
        3,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Arith", "mulAdd", "(III)I", code);
    let result = invoke_static(&p, class, "mulAdd", "(III)I", &[
        JValue::Int(2),
        JValue::Int(3),
        JValue::Int(4),
    ]);
    assert_eq!(result.unwrap(), Some(JValue::Int(20)));
}

#[test]
fn division_semantics() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Iload0 as u8,
            Op::Iload1 as u8,
            Op::Idiv as u8,
            Op::Ireturn as u8,
        ],
        2,
        2,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Div", "div", "(II)I", code);

    let ok = invoke_static(&p, class, "div", "(II)I", &[JValue::Int(7), JValue::Int(2)]);
    assert_eq!(ok.unwrap(), Some(JValue::Int(3)));

    // Overflow wraps rather than trapping.
    let min = invoke_static(&p, class, "div", "(II)I", &[
        JValue::Int(i32::MIN),
        JValue::Int(-1),
    ]);
    assert_eq!(min.unwrap(), Some(JValue::Int(i32::MIN)));

    let zero = invoke_static(&p, class, "div", "(II)I", &[JValue::Int(1), JValue::Int(0)]);
    assert!(std::ptr::eq(thrown_class(zero), rt.well_known().arithmetic));
}

#[test]
fn loop_sums_with_branches() {
    let (rt, p) = setup();
    // sum = 0; for (i = 1; i <= n; i++) sum += i; return sum;
    let code = Code::new(
        vec![
            Op::Iconst0 as u8,   // 0
            Op::Istore1 as u8,   // 1
            Op::Iconst1 as u8,   // 2
            Op::Istore2 as u8,   // 3
            Op::Iload2 as u8,    // 4: loop
            Op::Iload0 as u8,    // 5
            Op::IfIcmpgt as u8,  // 6: -> 19
            0x00,
            0x0D,
            Op::Iload1 as u8,    // 9
            Op::Iload2 as u8,    // 10
            Op::Iadd as u8,      // 11
            Op::Istore1 as u8,   // 12
            Op::Iinc as u8,      // 13: i += 1
            0x02,
            0x01,
            Op::Goto as u8,      // 16: -> 4
            0xFF,
            0xF4,
            Op::Iload1 as u8,    // 19
            Op::Ireturn as u8,   // 20
        ],
        2,
        3,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Loop", "sum", "(I)I", code);
    let result = invoke_static(&p, class, "sum", "(I)I", &[JValue::Int(5)]);
    assert_eq!(result.unwrap(), Some(JValue::Int(15)));
    let result = invoke_static(&p, class, "sum", "(I)I", &[JValue::Int(100)]);
    assert_eq!(result.unwrap(), Some(JValue::Int(5050)));
}

#[test]
fn long_arithmetic_and_comparison() {
    let (rt, p) = setup();
    // return a * b  (J, J) -> J
    let code = Code::new(
        vec![
            Op::Lload0 as u8,
            Op::Lload2 as u8,
            Op::Lmul as u8,
            Op::Lreturn as u8,
        ],
        4,
        4,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Long", "mul", "(JJ)J", code);
    let result = invoke_static(&p, class, "mul", "(JJ)J", &[
        JValue::Long(3_000_000_000),
        JValue::Long(-7),
    ]);
    assert_eq!(result.unwrap(), Some(JValue::Long(-21_000_000_000)));

    // lcmp
    let cmp = Code::new(
        vec![
            Op::Lload0 as u8,
            Op::Lload2 as u8,
            Op::Lcmp as u8,
            Op::Ireturn as u8,
        ],
        4,
        4,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Lcmp", "cmp", "(JJ)I", cmp);
    for (a, b, expected) in [(1i64, 2i64, -1), (2, 2, 0), (i64::MAX, i64::MIN, 1)] {
        let r = invoke_static(&p, class, "cmp", "(JJ)I", &[JValue::Long(a), JValue::Long(b)]);
        assert_eq!(r.unwrap(), Some(JValue::Int(expected)));
    }
}

#[test]
fn float_compare_orders_nan() {
    let (rt, p) = setup();
    let gt = Code::new(
        vec![
            Op::Fload0 as u8,
            Op::Fload1 as u8,
            Op::Fcmpg as u8,
            Op::Ireturn as u8,
        ],
        2,
        2,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Fcmpg", "cmp", "(FF)I", gt);
    let nan = invoke_static(&p, class, "cmp", "(FF)I", &[
        JValue::Float(f32::NAN),
        JValue::Float(1.0),
    ]);
    assert_eq!(nan.unwrap(), Some(JValue::Int(1)));

    let lt = Code::new(
        vec![
            Op::Fload0 as u8,
            Op::Fload1 as u8,
            Op::Fcmpl as u8,
            Op::Ireturn as u8,
        ],
        2,
        2,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Fcmpl", "cmp", "(FF)I", lt);
    let nan = invoke_static(&p, class, "cmp", "(FF)I", &[
        JValue::Float(f32::NAN),
        JValue::Float(1.0),
    ]);
    assert_eq!(nan.unwrap(), Some(JValue::Int(-1)));
    let ordered = invoke_static(&p, class, "cmp", "(FF)I", &[
        JValue::Float(2.0),
        JValue::Float(1.0),
    ]);
    assert_eq!(ordered.unwrap(), Some(JValue::Int(1)));
}

#[test]
fn goto_w_takes_wide_offset() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::GotoW as u8, // 0: -> 8
            0x00,
            0x00,
            0x00,
            0x08,
            Op::Bipush as u8, // 5
            1,
            Op::Ireturn as u8, // 7
            Op::Bipush as u8,  // 8
            2,
            Op::Ireturn as u8, // 10
        ],
        1,
        0,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/GotoW", "go", "()I", code);
    assert_eq!(
        invoke_static(&p, class, "go", "()I", &[]).unwrap(),
        Some(JValue::Int(2))
    );
}

// =============================================================================
// Switches
// =============================================================================

fn tableswitch_code(leading_nops: usize) -> Code {
    // iload_0; tableswitch low=0 high=2 -> {10, 20, 30} default 99
    let mut bytes = vec![Op::Nop as u8; leading_nops];
    bytes.push(Op::Iload0 as u8);
    let opcode_at = bytes.len();
    bytes.push(Op::Tableswitch as u8);
    // Align operand start to a 4-byte boundary.
    while (bytes.len()) % 4 != 0 {
        bytes.push(0);
    }
    let operands_at = bytes.len();
    let table_end = operands_at + 12 + 3 * 4;
    let case = |i: usize| (table_end + 3 * i - opcode_at) as i32;
    let default = (table_end + 9 - opcode_at) as i32;
    bytes.extend(default.to_be_bytes());
    bytes.extend(0i32.to_be_bytes());
    bytes.extend(2i32.to_be_bytes());
    bytes.extend(case(0).to_be_bytes());
    bytes.extend(case(1).to_be_bytes());
    bytes.extend(case(2).to_be_bytes());
    for value in [10u8, 20, 30, 99] {
        bytes.push(Op::Bipush as u8);
        bytes.push(value);
        bytes.push(Op::Ireturn as u8);
    }
    Code::new(bytes, 1, 1, ConstPool::empty(), vec![])
}

#[test]
fn tableswitch_selects_and_defaults() {
    let (rt, p) = setup();
    // Different leading padding must not change outcomes.
    for (shift, name) in [(0, "t/Ts0"), (1, "t/Ts1"), (2, "t/Ts2"), (3, "t/Ts3")] {
        let class = static_method_class(&rt, name, "pick", "(I)I", tableswitch_code(shift));
        for (key, expected) in [(0, 10), (1, 20), (2, 30), (3, 99), (-1, 99)] {
            let r = invoke_static(&p, class, "pick", "(I)I", &[JValue::Int(key)]);
            assert_eq!(r.unwrap(), Some(JValue::Int(expected)), "key {key} shift {shift}");
        }
    }
}

#[test]
fn lookupswitch_binary_searches_sorted_pairs() {
    let (rt, p) = setup();
    let mut bytes = vec![Op::Iload0 as u8];
    let opcode_at = bytes.len();
    bytes.push(Op::Lookupswitch as u8);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    let operands_at = bytes.len();
    let table_end = operands_at + 8 + 3 * 8;
    let case = |i: usize| (table_end + 3 * i - opcode_at) as i32;
    let default = (table_end + 9 - opcode_at) as i32;
    bytes.extend(default.to_be_bytes());
    bytes.extend(3i32.to_be_bytes());
    for (key, target) in [(-5i32, case(0)), (42, case(1)), (900, case(2))] {
        bytes.extend(key.to_be_bytes());
        bytes.extend(target.to_be_bytes());
    }
    for value in [1u8, 2, 3, 99] {
        bytes.push(Op::Bipush as u8);
        bytes.push(value);
        bytes.push(Op::Ireturn as u8);
    }
    let code = Code::new(bytes, 1, 1, ConstPool::empty(), vec![]);
    let class = static_method_class(&rt, "t/Ls", "pick", "(I)I", code);
    for (key, expected) in [(-5, 1), (42, 2), (900, 3), (0, 99), (i32::MAX, 99)] {
        let r = invoke_static(&p, class, "pick", "(I)I", &[JValue::Int(key)]);
        assert_eq!(r.unwrap(), Some(JValue::Int(expected)), "key {key}");
    }
}

// =============================================================================
// Subroutines and wide
// =============================================================================

#[test]
fn jsr_and_ret_round_trip() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Jsr as u8, // 0: -> 5, pushes return address 3
            0x00,
            0x05,
            Op::Iload2 as u8,  // 3
            Op::Ireturn as u8, // 4
            Op::Astore1 as u8, // 5: save return address
            Op::Bipush as u8,  // 6
            9,
            Op::Istore2 as u8, // 8
            Op::Ret as u8,     // 9
            0x01,
        ],
        2,
        3,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Jsr", "sub", "(I)I", code);
    assert_eq!(
        invoke_static(&p, class, "sub", "(I)I", &[JValue::Int(0)]).unwrap(),
        Some(JValue::Int(9))
    );
}

#[test]
fn wide_prefix_reaches_16_bit_indexes() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Wide as u8, // wide iinc 0 += 300
            Op::Iinc as u8,
            0x00,
            0x00,
            0x01,
            0x2C,
            Op::Wide as u8, // wide iload 0
            Op::Iload as u8,
            0x00,
            0x00,
            Op::Ireturn as u8,
        ],
        1,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Wide", "bump", "(I)I", code);
    assert_eq!(
        invoke_static(&p, class, "bump", "(I)I", &[JValue::Int(5)]).unwrap(),
        Some(JValue::Int(305))
    );
}

// =============================================================================
// Arrays
// =============================================================================

#[test]
fn int_array_store_load() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Iload0 as u8,   // 0: n
            Op::Newarray as u8, // 1
            array_type::T_INT,
            Op::Astore1 as u8, // 3
            Op::Aload1 as u8,  // 4
            Op::Iconst2 as u8, // 5
            Op::Bipush as u8,  // 6
            7,
            Op::Iastore as u8, // 8
            Op::Aload1 as u8,  // 9
            Op::Iconst2 as u8, // 10
            Op::Iaload as u8,  // 11
            Op::Ireturn as u8, // 12
        ],
        3,
        2,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/IntArr", "probe", "(I)I", code);

    let ok = invoke_static(&p, class, "probe", "(I)I", &[JValue::Int(5)]);
    assert_eq!(ok.unwrap(), Some(JValue::Int(7)));

    // Store at index 2 of a length-2 array.
    let oob = invoke_static(&p, class, "probe", "(I)I", &[JValue::Int(2)]);
    assert!(std::ptr::eq(thrown_class(oob), rt.well_known().array_index));

    let negative = invoke_static(&p, class, "probe", "(I)I", &[JValue::Int(-1)]);
    assert!(std::ptr::eq(
        thrown_class(negative),
        rt.well_known().negative_array_size
    ));
}

#[test]
fn array_index_minus_one_is_out_of_bounds() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::IconstM1 as u8,
            Op::Iaload as u8,
            Op::Ireturn as u8,
        ],
        3,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Oob", "at", "([I)I", code);
    let array = rt.make_primitive_array(TypeCode::Int, 4);
    let result = invoke_static(&p, class, "at", "([I)I", &[JValue::Object(array)]);
    assert!(std::ptr::eq(thrown_class(result), rt.well_known().array_index));
}

#[test]
fn byte_access_serves_boolean_and_byte_arrays() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Iconst0 as u8,
            Op::Baload as u8,
            Op::Ireturn as u8,
        ],
        2,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Bal", "first", "([B)I", code);

    let bytes = rt.make_primitive_array(TypeCode::Byte, 2);
    bytes.get().unwrap().array().unwrap().store(0, 0xFF);
    let r = invoke_static(&p, class, "first", "([B)I", &[JValue::Object(bytes)]);
    assert_eq!(r.unwrap(), Some(JValue::Int(-1)), "byte loads sign-extend");

    let bools = rt.make_primitive_array(TypeCode::Boolean, 2);
    bools.get().unwrap().array().unwrap().store(0, 1);
    let r = invoke_static(&p, class, "first", "([B)I", &[JValue::Object(bools)]);
    assert_eq!(r.unwrap(), Some(JValue::Int(1)));
}

#[test]
fn arraylength_and_null_array() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![Op::Aload0 as u8, Op::Arraylength as u8, Op::Ireturn as u8],
        1,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = static_method_class(&rt, "t/Len", "len", "([I)I", code);

    let array = rt.make_primitive_array(TypeCode::Int, 17);
    let r = invoke_static(&p, class, "len", "([I)I", &[JValue::Object(array)]);
    assert_eq!(r.unwrap(), Some(JValue::Int(17)));

    let r = invoke_static(&p, class, "len", "([I)I", &[JValue::NULL]);
    assert!(std::ptr::eq(thrown_class(r), rt.well_known().null_pointer));
}

#[test]
fn multianewarray_builds_nested_arrays() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::class("[[I")]);
    let code = Code::new(
        vec![
            Op::Iconst2 as u8, // 0: outer length
            Op::Iconst3 as u8, // 1: inner length
            Op::Multianewarray as u8, // 2
            0x00,
            0x01,
            2, // dimensions
            Op::Areturn as u8,
        ],
        2,
        0,
        pool,
        vec![],
    );
    let class = static_method_class(&rt, "t/Multi", "make", "()[[I", code);
    let result = invoke_static(&p, class, "make", "()[[I", &[]).unwrap().unwrap();
    let outer = result.as_object().unwrap().get().unwrap();
    assert_eq!(&**outer.class().name(), "[[I");
    let outer_body = outer.array().unwrap();
    assert_eq!(outer_body.len(), 2);
    for i in 0..2 {
        let inner = unsafe { ObjRef::from_word(outer_body.load(i) as usize) };
        let inner = inner.get().unwrap();
        assert_eq!(&**inner.class().name(), "[I");
        assert_eq!(inner.array().unwrap().len(), 3);
    }
}

// =============================================================================
// Exceptions
// =============================================================================

#[test]
fn handler_catches_matching_type() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::class("java/lang/RuntimeException")]);
    let code = Code::new(
        vec![
            Op::Aload0 as u8,  // 0
            Op::Athrow as u8,  // 1
            Op::Nop as u8,     // 2
            Op::Nop as u8,     // 3
            Op::Nop as u8,     // 4
            Op::Astore1 as u8, // 5: handler
            Op::Bipush as u8,  // 6
            42,
            Op::Ireturn as u8, // 8
        ],
        2,
        2,
        pool,
        vec![ExceptionHandler {
            start: 0,
            end: 4,
            handler_pc: 5,
            catch_type: 1,
        }],
    );
    let class = static_method_class(&rt, "t/Catch", "m", "(Ljava/lang/Object;)I", code);

    // NullPointerException is a RuntimeException subclass: caught.
    let npe = rt.make_null_pointer_exception();
    let caught = invoke_static(&p, class, "m", "(Ljava/lang/Object;)I", &[JValue::Object(npe)]);
    assert_eq!(caught.unwrap(), Some(JValue::Int(42)));

    // A StackOverflowError is not: uncaught, surfaces to the facade.
    let soe = rt.make_stack_overflow_error();
    let uncaught =
        invoke_static(&p, class, "m", "(Ljava/lang/Object;)I", &[JValue::Object(soe)]);
    assert_eq!(uncaught.unwrap_err(), soe);
}

#[test]
fn unresolvable_catch_type_disqualifies_handler() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::class("does/not/Exist")]);
    let code = Code::new(
        vec![
            Op::Aload0 as u8,  // 0
            Op::Athrow as u8,  // 1
            Op::Nop as u8,     // 2
            Op::Nop as u8,     // 3
            Op::Nop as u8,     // 4
            Op::Bipush as u8,  // 5: first handler (never reached)
            1,
            Op::Ireturn as u8, // 7
            Op::Astore1 as u8, // 8: catch-all handler
            Op::Bipush as u8,  // 9
            7,
            Op::Ireturn as u8, // 11
        ],
        2,
        2,
        pool,
        vec![
            ExceptionHandler {
                start: 0,
                end: 4,
                handler_pc: 5,
                catch_type: 1,
            },
            ExceptionHandler {
                start: 0,
                end: 4,
                handler_pc: 8,
                catch_type: 0,
            },
        ],
    );
    let class = static_method_class(&rt, "t/Skip", "m", "(Ljava/lang/Object;)I", code);
    let npe = rt.make_null_pointer_exception();
    let result = invoke_static(&p, class, "m", "(Ljava/lang/Object;)I", &[JValue::Object(npe)]);
    assert_eq!(result.unwrap(), Some(JValue::Int(7)));
}

#[test]
fn unwind_crosses_frames_and_attaches_trace() {
    let (rt, p) = setup();
    // inner: throws; outer: calls inner under a catch-all handler.
    let inner_code = Code::new(
        vec![Op::Aload0 as u8, Op::Athrow as u8],
        1,
        1,
        ConstPool::empty(),
        vec![],
    );
    static_method_class(&rt, "t/Inner", "boom", "(Ljava/lang/Object;)V", inner_code);

    let pool = ConstPool::new(vec![PoolEntry::method_ref(
        "t/Inner",
        "boom",
        "(Ljava/lang/Object;)V",
    )]);
    let outer_code = Code::new(
        vec![
            Op::Aload0 as u8,       // 0
            Op::Invokestatic as u8, // 1
            0x00,
            0x01,
            Op::Iconst0 as u8, // 4
            Op::Ireturn as u8, // 5
            Op::Astore1 as u8, // 6: handler
            Op::Bipush as u8,  // 7
            11,
            Op::Ireturn as u8, // 9
        ],
        2,
        2,
        pool,
        vec![ExceptionHandler {
            start: 0,
            end: 4,
            handler_pc: 6,
            catch_type: 0,
        }],
    );
    let outer = static_method_class(&rt, "t/Outer", "call", "(Ljava/lang/Object;)I", outer_code);

    let exception = rt.make_throwable(rt.well_known().runtime_exception, Some("kapow"));
    let result = invoke_static(&p, outer, "call", "(Ljava/lang/Object;)I", &[JValue::Object(
        exception,
    )]);
    assert_eq!(result.unwrap(), Some(JValue::Int(11)));

    // The raise recorded both frames, innermost first.
    let trace = exception.get().unwrap().throwable_trace().unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(&**trace[0].method.name(), "boom");
    assert_eq!(&**trace[1].method.name(), "call");
}

#[test]
fn stack_overflow_on_unbounded_recursion() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::method_ref("t/Rec", "spin", "()V")]);
    let code = Code::new(
        vec![Op::Invokestatic as u8, 0x00, 0x01, Op::Return as u8],
        0,
        0,
        pool,
        vec![],
    );
    let class = static_method_class(&rt, "t/Rec", "spin", "()V", code);
    let result = invoke_static(&p, class, "spin", "()V", &[]);
    assert!(std::ptr::eq(
        thrown_class(result),
        rt.well_known().stack_overflow
    ));

    // The stack fully unwound; the thread remains usable.
    let ok_code = Code::new(
        vec![Op::Iconst1 as u8, Op::Ireturn as u8],
        1,
        0,
        ConstPool::empty(),
        vec![],
    );
    let ok_class = static_method_class(&rt, "t/Ok", "one", "()I", ok_code);
    let mut thread = p.make_thread();
    let spin = class.lookup_method("spin", "()V").unwrap();
    assert!(p.invoke(&mut thread, spin, None, &[]).is_err());
    let one = ok_class.lookup_method("one", "()I").unwrap();
    assert_eq!(
        p.invoke(&mut thread, one, None, &[]).unwrap(),
        Some(JValue::Int(1))
    );
}

// =============================================================================
// Objects, fields, and dispatch
// =============================================================================

#[test]
fn construct_and_read_instance_fields() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![
        PoolEntry::field_ref("t/Point", "x"),
        PoolEntry::class("t/Point"),
        PoolEntry::method_ref("t/Point", "<init>", "(I)V"),
    ]);

    let init_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Iload1 as u8,
            Op::Putfield as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        2,
        2,
        pool.clone(),
        vec![],
    );
    let make_code = Code::new(
        vec![
            Op::New as u8, // 0
            0x00,
            0x02,
            Op::Dup as u8,    // 3
            Op::Iload0 as u8, // 4
            Op::Invokespecial as u8, // 5
            0x00,
            0x03,
            Op::Areturn as u8, // 8
        ],
        3,
        1,
        pool.clone(),
        vec![],
    );
    let get_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Getfield as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool.clone(),
        vec![],
    );

    let class = ClassBuilder::new("t/Point")
        .super_class(rt.well_known().object)
        .field("x", "I", AccessFlags::PUBLIC | AccessFlags::FINAL)
        .method(Method::bytecode("<init>", "(I)V", AccessFlags::PUBLIC, init_code).unwrap())
        .method(Method::bytecode("make", "(I)Lt/Point;", static_flags(), make_code).unwrap())
        .method(Method::bytecode("getX", "(Lt/Point;)I", static_flags(), get_code).unwrap())
        .build(&rt)
        .unwrap();

    assert!(class.vm_flags().contains(ClassVmFlags::HAS_FINAL_MEMBER));

    let made = invoke_static(&p, class, "make", "(I)Lt/Point;", &[JValue::Int(41)])
        .unwrap()
        .unwrap();
    let point = made.as_object().unwrap();
    assert!(std::ptr::eq(point.get().unwrap().class(), class));

    let x = invoke_static(&p, class, "getX", "(Lt/Point;)I", &[JValue::Object(point)]);
    assert_eq!(x.unwrap(), Some(JValue::Int(41)));
}

#[test]
fn getfield_on_null_receiver() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::field_ref("t/Holder", "v")]);
    let code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Getfield as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool,
        vec![],
    );
    let class = ClassBuilder::new("t/Holder")
        .super_class(rt.well_known().object)
        .field("v", "I", AccessFlags::PUBLIC)
        .method(Method::bytecode("read", "(Lt/Holder;)I", static_flags(), code).unwrap())
        .build(&rt)
        .unwrap();
    let result = invoke_static(&p, class, "read", "(Lt/Holder;)I", &[JValue::NULL]);
    assert!(std::ptr::eq(thrown_class(result), rt.well_known().null_pointer));
}

#[test]
fn virtual_dispatch_selects_override() {
    let (rt, p) = setup();
    fn return_const(value: u8) -> Code {
        Code::new(
            vec![Op::Bipush as u8, value, Op::Ireturn as u8],
            1,
            1,
            ConstPool::empty(),
            vec![],
        )
    }
    let base = ClassBuilder::new("t/Base")
        .super_class(rt.well_known().object)
        .method(Method::bytecode("m", "()I", AccessFlags::PUBLIC, return_const(1)).unwrap())
        .build(&rt)
        .unwrap();
    let derived = ClassBuilder::new("t/Derived")
        .super_class(base)
        .method(Method::bytecode("m", "()I", AccessFlags::PUBLIC, return_const(2)).unwrap())
        .build(&rt)
        .unwrap();

    let pool = ConstPool::new(vec![PoolEntry::method_ref("t/Base", "m", "()I")]);
    let caller_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Invokevirtual as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool,
        vec![],
    );
    let caller = static_method_class(&rt, "t/VCaller", "call", "(Lt/Base;)I", caller_code);

    let a = rt.make_instance(base);
    let b = rt.make_instance(derived);
    assert_eq!(
        invoke_static(&p, caller, "call", "(Lt/Base;)I", &[JValue::Object(a)]).unwrap(),
        Some(JValue::Int(1))
    );
    assert_eq!(
        invoke_static(&p, caller, "call", "(Lt/Base;)I", &[JValue::Object(b)]).unwrap(),
        Some(JValue::Int(2))
    );

    let npe = invoke_static(&p, caller, "call", "(Lt/Base;)I", &[JValue::NULL]);
    assert!(std::ptr::eq(thrown_class(npe), rt.well_known().null_pointer));
}

#[test]
fn interface_dispatch_through_itable() {
    let (rt, p) = setup();
    let iface = ClassBuilder::new("t/Speaker")
        .flags(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
        .method(Method::abstract_method("speak", "()I", AccessFlags::PUBLIC).unwrap())
        .build(&rt)
        .unwrap();
    let impl_code = Code::new(
        vec![Op::Bipush as u8, 5, Op::Ireturn as u8],
        1,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = ClassBuilder::new("t/Loud")
        .super_class(rt.well_known().object)
        .implements(iface)
        .method(Method::bytecode("speak", "()I", AccessFlags::PUBLIC, impl_code).unwrap())
        .build(&rt)
        .unwrap();

    let pool = ConstPool::new(vec![PoolEntry::method_ref("t/Speaker", "speak", "()I")]);
    let caller_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Invokeinterface as u8,
            0x00,
            0x01,
            1, // count
            0,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool,
        vec![],
    );
    let caller = static_method_class(&rt, "t/ICaller", "call", "(Lt/Speaker;)I", caller_code);

    let speaker = rt.make_instance(class);
    assert_eq!(
        invoke_static(&p, caller, "call", "(Lt/Speaker;)I", &[JValue::Object(speaker)]).unwrap(),
        Some(JValue::Int(5))
    );
    assert!(iface.is_assignable_from(class));
}

#[test]
fn checkcast_and_instanceof() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::class("java/lang/String")]);

    let inst_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Instanceof as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool.clone(),
        vec![],
    );
    let cast_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Checkcast as u8,
            0x00,
            0x01,
            Op::Areturn as u8,
        ],
        1,
        1,
        pool.clone(),
        vec![],
    );
    let class = ClassBuilder::new("t/Types")
        .super_class(rt.well_known().object)
        .method(
            Method::bytecode("isString", "(Ljava/lang/Object;)I", static_flags(), inst_code)
                .unwrap(),
        )
        .method(
            Method::bytecode(
                "asString",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
                static_flags(),
                cast_code,
            )
            .unwrap(),
        )
        .build(&rt)
        .unwrap();

    let string = rt.make_string("s");
    let other = rt.make_instance(rt.well_known().object);

    let is = |value| invoke_static(&p, class, "isString", "(Ljava/lang/Object;)I", &[value]);
    assert_eq!(is(JValue::Object(string)).unwrap(), Some(JValue::Int(1)));
    assert_eq!(is(JValue::Object(other)).unwrap(), Some(JValue::Int(0)));
    assert_eq!(is(JValue::NULL).unwrap(), Some(JValue::Int(0)));

    let cast = |value| {
        invoke_static(
            &p,
            class,
            "asString",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            &[value],
        )
    };
    assert_eq!(
        cast(JValue::Object(string)).unwrap(),
        Some(JValue::Object(string))
    );
    // Null passes checkcast.
    assert_eq!(cast(JValue::NULL).unwrap(), Some(JValue::NULL));
    let bad = cast(JValue::Object(other));
    assert!(std::ptr::eq(thrown_class(bad), rt.well_known().class_cast));
}

// =============================================================================
// Constants
// =============================================================================

#[test]
fn ldc_interns_string_literals() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::Str(Arc::from("hi"))]);
    let code = Code::new(
        vec![Op::Ldc as u8, 1, Op::Areturn as u8],
        1,
        0,
        pool,
        vec![],
    );
    let class = static_method_class(&rt, "t/Lit", "text", "()Ljava/lang/String;", code);

    let first = invoke_static(&p, class, "text", "()Ljava/lang/String;", &[])
        .unwrap()
        .unwrap();
    let second = invoke_static(&p, class, "text", "()Ljava/lang/String;", &[])
        .unwrap()
        .unwrap();
    assert_eq!(first, second, "literals are interned");
    let object = first.as_object().unwrap().get().unwrap();
    assert_eq!(&**object.string_text().unwrap(), "hi");
}

#[test]
fn ldc2_w_pushes_wide_constants() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::Long(1_234_567_890_123)]);
    let code = Code::new(
        vec![Op::Ldc2W as u8, 0x00, 0x01, Op::Lreturn as u8],
        2,
        0,
        pool,
        vec![],
    );
    let class = static_method_class(&rt, "t/WideConst", "value", "()J", code);
    assert_eq!(
        invoke_static(&p, class, "value", "()J", &[]).unwrap(),
        Some(JValue::Long(1_234_567_890_123))
    );
}

// =============================================================================
// Class initialization
// =============================================================================

/// Builds a `t/Counter` class whose `<clinit>` increments its static
/// `value` once, plus a reader in a second class that triggers
/// initialization through `getstatic`.
fn build_counter_classes(rt: &Runtime) -> (ClassRef, ClassRef) {
    let pool = ConstPool::new(vec![PoolEntry::field_ref("t/Counter", "value")]);
    let clinit_code = Code::new(
        vec![
            Op::Getstatic as u8,
            0x00,
            0x01,
            Op::Iconst1 as u8,
            Op::Iadd as u8,
            Op::Putstatic as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        2,
        0,
        pool.clone(),
        vec![],
    );
    let counter = ClassBuilder::new("t/Counter")
        .super_class(rt.well_known().object)
        .field("value", "I", static_flags())
        .method(Method::bytecode("<clinit>", "()V", static_flags(), clinit_code).unwrap())
        .build(rt)
        .unwrap();

    let read_code = Code::new(
        vec![Op::Getstatic as u8, 0x00, 0x01, Op::Ireturn as u8],
        1,
        0,
        pool,
        vec![],
    );
    let reader = static_method_class(rt, "t/CounterReader", "read", "()I", read_code);
    (counter, reader)
}

#[test]
fn clinit_runs_once_and_instruction_replays() {
    let (rt, p) = setup();
    let (counter, reader) = build_counter_classes(&rt);
    assert!(counter.needs_init());

    let result = invoke_static(&p, reader, "read", "()I", &[]);
    assert_eq!(result.unwrap(), Some(JValue::Int(1)));
    assert!(!counter.needs_init());

    // Re-reading does not re-run the initializer.
    let result = invoke_static(&p, reader, "read", "()I", &[]);
    assert_eq!(result.unwrap(), Some(JValue::Int(1)));
}

#[test]
fn clinit_races_resolve_to_one_run() {
    let (rt, p) = setup();
    let (_, reader) = build_counter_classes(&rt);
    let method = reader.lookup_method("read", "()I").unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let p = p.clone();
        handles.push(std::thread::spawn(move || {
            let mut thread = p.make_thread();
            p.invoke(&mut thread, method, None, &[])
                .unwrap()
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), JValue::Int(1));
    }
}

#[test]
fn new_replays_after_initialization() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![
        PoolEntry::field_ref("t/Lazy", "marker"),
        PoolEntry::class("t/Lazy"),
    ]);
    let clinit_code = Code::new(
        vec![
            Op::Bipush as u8,
            13,
            Op::Putstatic as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        1,
        0,
        pool.clone(),
        vec![],
    );
    let lazy = ClassBuilder::new("t/Lazy")
        .super_class(rt.well_known().object)
        .field("marker", "I", static_flags())
        .method(Method::bytecode("<clinit>", "()V", static_flags(), clinit_code).unwrap())
        .build(&rt)
        .unwrap();

    let make_code = Code::new(
        vec![
            Op::New as u8, // triggers init, then replays
            0x00,
            0x02,
            Op::Pop as u8,
            Op::Getstatic as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        0,
        pool,
        vec![],
    );
    let maker = static_method_class(&rt, "t/LazyMaker", "make", "()I", make_code);

    let result = invoke_static(&p, maker, "make", "()I", &[]);
    assert_eq!(result.unwrap(), Some(JValue::Int(13)));
    assert!(!lazy.needs_init());
}

#[test]
fn failed_clinit_marks_class_erroneous() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::field_ref("t/Broken", "value")]);
    // <clinit> divides by zero.
    let clinit_code = Code::new(
        vec![
            Op::Iconst1 as u8,
            Op::Iconst0 as u8,
            Op::Idiv as u8,
            Op::Putstatic as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        2,
        0,
        pool.clone(),
        vec![],
    );
    let broken = ClassBuilder::new("t/Broken")
        .super_class(rt.well_known().object)
        .field("value", "I", static_flags())
        .method(Method::bytecode("<clinit>", "()V", static_flags(), clinit_code).unwrap())
        .build(&rt)
        .unwrap();

    let read_code = Code::new(
        vec![Op::Getstatic as u8, 0x00, 0x01, Op::Ireturn as u8],
        1,
        0,
        pool,
        vec![],
    );
    let reader = static_method_class(&rt, "t/BrokenReader", "read", "()I", read_code);

    // First trigger: the arithmetic failure wraps as an initializer error.
    let first = invoke_static(&p, reader, "read", "()I", &[]);
    assert!(std::ptr::eq(
        thrown_class(first),
        rt.well_known().exception_in_initializer
    ));

    // Later triggers see the class as unusable.
    let second = invoke_static(&p, reader, "read", "()I", &[]);
    assert!(std::ptr::eq(
        thrown_class(second),
        rt.well_known().no_class_def
    ));
    assert!(broken.vm_flags().contains(ClassVmFlags::INIT_ERROR));
}

// =============================================================================
// Synchronization
// =============================================================================

#[test]
fn synchronized_static_methods_exclude_each_other() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::field_ref("t/Sync", "n")]);
    let bump_code = Code::new(
        vec![
            Op::Getstatic as u8,
            0x00,
            0x01,
            Op::Iconst1 as u8,
            Op::Iadd as u8,
            Op::Putstatic as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        2,
        0,
        pool,
        vec![],
    );
    let class = ClassBuilder::new("t/Sync")
        .super_class(rt.well_known().object)
        .field("n", "I", static_flags())
        .method(
            Method::bytecode(
                "bump",
                "()V",
                static_flags() | AccessFlags::SYNCHRONIZED,
                bump_code,
            )
            .unwrap(),
        )
        .build(&rt)
        .unwrap();
    let method = class.lookup_method("bump", "()V").unwrap();

    const PER_THREAD: usize = 1000;
    let mut handles = Vec::new();
    for _ in 0..2 {
        let p = p.clone();
        handles.push(std::thread::spawn(move || {
            let mut thread = p.make_thread();
            for _ in 0..PER_THREAD {
                p.invoke(&mut thread, method, None, &[]).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(class.monitor().depth(), 0);
    let n = class.static_table().load_typed(0, TypeCode::Int, false) as i64;
    assert_eq!(n, (2 * PER_THREAD) as i64);
}

#[test]
fn synchronized_instance_method_releases_receiver_monitor() {
    let (rt, p) = setup();
    let code = Code::new(
        vec![Op::Iconst3 as u8, Op::Ireturn as u8],
        1,
        1,
        ConstPool::empty(),
        vec![],
    );
    let class = ClassBuilder::new("t/SyncInst")
        .super_class(rt.well_known().object)
        .method(
            Method::bytecode(
                "run",
                "()I",
                AccessFlags::PUBLIC | AccessFlags::SYNCHRONIZED,
                code,
            )
            .unwrap(),
        )
        .build(&rt)
        .unwrap();
    let method = class.lookup_method("run", "()I").unwrap();

    let receiver = rt.make_instance(class);
    let object = receiver.get().unwrap();
    assert_eq!(object.monitor().depth(), 0);

    let mut thread = p.make_thread();
    let result = p.invoke(&mut thread, method, Some(receiver), &[]);
    assert_eq!(result.unwrap(), Some(JValue::Int(3)));
    assert_eq!(object.monitor().depth(), 0);
}

#[test]
fn volatile_long_is_never_torn() {
    let (rt, p) = setup();
    let pool = ConstPool::new(vec![PoolEntry::field_ref("t/Vol", "v")]);
    let set_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Lload1 as u8,
            Op::Putfield as u8,
            0x00,
            0x01,
            Op::Return as u8,
        ],
        3,
        3,
        pool.clone(),
        vec![],
    );
    let get_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Getfield as u8,
            0x00,
            0x01,
            Op::Lreturn as u8,
        ],
        2,
        1,
        pool,
        vec![],
    );
    let class = ClassBuilder::new("t/Vol")
        .super_class(rt.well_known().object)
        .field("v", "J", AccessFlags::PUBLIC | AccessFlags::VOLATILE)
        .method(Method::bytecode("set", "(Lt/Vol;J)V", static_flags(), set_code).unwrap())
        .method(Method::bytecode("get", "(Lt/Vol;)J", static_flags(), get_code).unwrap())
        .build(&rt)
        .unwrap();
    let set = class.lookup_method("set", "(Lt/Vol;J)V").unwrap();
    let get = class.lookup_method("get", "(Lt/Vol;)J").unwrap();

    let target = rt.make_instance(class);
    const ROUNDS: usize = 2000;

    let writer = {
        let p = p.clone();
        std::thread::spawn(move || {
            let mut thread = p.make_thread();
            for i in 0..ROUNDS {
                let value = if i % 2 == 0 { 0 } else { -1i64 };
                p.invoke(&mut thread, set, None, &[
                    JValue::Object(target),
                    JValue::Long(value),
                ])
                .unwrap();
            }
        })
    };

    let reader = {
        let p = p.clone();
        std::thread::spawn(move || {
            let mut thread = p.make_thread();
            for _ in 0..ROUNDS {
                let value = p
                    .invoke(&mut thread, get, None, &[JValue::Object(target)])
                    .unwrap()
                    .unwrap();
                let value = value.as_long().unwrap();
                assert!(value == 0 || value == -1, "torn read: {value:#x}");
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

// =============================================================================
// Natives
// =============================================================================

fn math_runtime() -> (Arc<Runtime>, Processor, ClassRef) {
    let system = Arc::new(HostSystem::new());
    // Slow path: (env, class, double-bits) under the platform convention.
    system.register("Java_t_Math_sin", |args| {
        f64::from_bits(args[2] as u64).sin().to_bits()
    });
    // Fast path: flat declared arguments only.
    system.register_fast("Java_t_Math_sinFast", |_env, _method, args| {
        f64::from_bits(args[0] as u64).sin().to_bits()
    });

    let runtime = Runtime::with_system(system);
    let class = ClassBuilder::new("t/Math")
        .super_class(runtime.well_known().object)
        .method(Method::native("sin", "(D)D", static_flags()).unwrap())
        .method(
            Method::native("sinFast", "(D)D", static_flags())
                .unwrap()
                .fast_native(),
        )
        .method(Method::native("missing", "()V", static_flags()).unwrap())
        .build(&runtime)
        .unwrap();
    let processor = Processor::new(runtime.clone());
    (runtime, processor, class)
}

#[test]
#[cfg(target_pointer_width = "64")]
fn native_call_marshals_double_argument() {
    let (_, p, class) = math_runtime();
    let result = invoke_static(&p, class, "sin", "(D)D", &[JValue::Double(0.5)]);
    assert_eq!(result.unwrap(), Some(JValue::Double(0.5f64.sin())));
}

#[test]
#[cfg(target_pointer_width = "64")]
fn fast_native_matches_slow_path_bit_for_bit() {
    let (_, p, class) = math_runtime();
    for x in [0.0, 0.5, -1.75, std::f64::consts::PI] {
        let slow = invoke_static(&p, class, "sin", "(D)D", &[JValue::Double(x)])
            .unwrap()
            .unwrap();
        let fast = invoke_static(&p, class, "sinFast", "(D)D", &[JValue::Double(x)])
            .unwrap()
            .unwrap();
        assert_eq!(
            slow.as_double().unwrap().to_bits(),
            fast.as_double().unwrap().to_bits()
        );
    }
}

#[test]
fn unresolved_native_raises_unsatisfied_link() {
    let (rt, p, class) = math_runtime();
    let result = invoke_static(&p, class, "missing", "()V", &[]);
    let exception = result.unwrap_err().get().unwrap();
    assert!(std::ptr::eq(
        exception.class(),
        rt.well_known().unsatisfied_link
    ));
    assert!(exception
        .throwable_message()
        .unwrap()
        .contains("t/Math.missing"));
}

#[test]
#[cfg(target_pointer_width = "64")]
fn symbolic_invoke_resolves_then_calls() {
    let (_, p, _) = math_runtime();
    let mut thread = p.make_thread();
    let result = p.invoke_by_name(
        &mut thread,
        LoaderId::BOOT,
        "t/Math",
        "sin",
        "(D)D",
        None,
        &[JValue::Double(1.0)],
    );
    assert_eq!(result.unwrap(), Some(JValue::Double(1.0f64.sin())));

    let missing = p.invoke_by_name(
        &mut thread,
        LoaderId::BOOT,
        "t/Nowhere",
        "sin",
        "(D)D",
        None,
        &[JValue::Double(1.0)],
    );
    assert!(missing.is_err());
}

// =============================================================================
// Bootstrap reentry
// =============================================================================

#[test]
fn bootstrap_receiver_forces_resolution_and_replays() {
    let (rt, p) = setup();
    fn return_const(value: u8) -> Code {
        Code::new(
            vec![Op::Bipush as u8, value, Op::Ireturn as u8],
            1,
            1,
            ConstPool::empty(),
            vec![],
        )
    }

    // The real implementation, linked under a different name.
    let real = ClassBuilder::new("t/BootReal")
        .super_class(rt.well_known().object)
        .method(Method::bytecode("m", "()I", AccessFlags::PUBLIC, return_const(2)).unwrap())
        .build(&rt)
        .unwrap();
    let real_m = real.lookup_method("m", "()I").unwrap();

    // The bootstrap image's version, whose vtable is not trusted yet.
    let boot = ClassBuilder::new("t/Boot")
        .super_class(rt.well_known().object)
        .bootstrap()
        .method(Method::bytecode("m", "()I", AccessFlags::PUBLIC, return_const(1)).unwrap())
        .build(&rt)
        .unwrap();
    assert!(boot.vm_flags().contains(ClassVmFlags::BOOTSTRAP));

    // The loader hook patches the stale slot during resolution.
    let slot = real_m.offset();
    rt.set_bootstrap_hook(Box::new(move |_, class| {
        class.patch_virtual_slot(slot, real_m);
    }));

    let pool = ConstPool::new(vec![PoolEntry::method_ref("t/Boot", "m", "()I")]);
    let caller_code = Code::new(
        vec![
            Op::Aload0 as u8,
            Op::Invokevirtual as u8,
            0x00,
            0x01,
            Op::Ireturn as u8,
        ],
        1,
        1,
        pool,
        vec![],
    );
    let caller = static_method_class(&rt, "t/BootCaller", "call", "(Lt/Boot;)I", caller_code);

    let receiver = rt.make_instance(boot);
    let result = invoke_static(&p, caller, "call", "(Lt/Boot;)I", &[JValue::Object(receiver)]);
    assert_eq!(result.unwrap(), Some(JValue::Int(2)));
    assert!(!boot.vm_flags().contains(ClassVmFlags::BOOTSTRAP));

    // Subsequent calls use the patched table directly.
    let again = invoke_static(&p, caller, "call", "(Lt/Boot;)I", &[JValue::Object(receiver)]);
    assert_eq!(again.unwrap(), Some(JValue::Int(2)));
}

// =============================================================================
// Facade introspection
// =============================================================================

#[test]
fn local_references_and_root_enumeration() {
    let (rt, p) = setup();
    let mut thread = p.make_thread();

    let text = rt.make_string("root");
    let handle = p.make_local_reference(&mut thread, text).unwrap();

    let mut roots = Vec::new();
    p.visit_objects(&thread, |o| roots.push(o));
    assert!(roots.contains(&text));

    p.dispose_local_reference(Some(handle));
    let mut roots = Vec::new();
    p.visit_objects(&thread, |o| roots.push(o));
    assert!(!roots.contains(&text));

    assert!(p.make_local_reference(&mut thread, ObjRef::NULL).is_none());
}

#[test]
fn is_initializing_tracks_facade_entries() {
    let (rt, p) = setup();
    let (counter, _) = build_counter_classes(&rt);
    let thread = p.make_thread();
    assert!(!p.is_initializing(&thread, counter));
}
