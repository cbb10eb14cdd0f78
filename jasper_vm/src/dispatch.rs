//! The instruction dispatcher.
//!
//! A static table maps opcode bytes to handler functions; each handler
//! decodes its operands from the live code register and returns a control
//! transfer. The loop owns the cross-cutting transfers: entering an
//! invocation (bytecode or native), returning across frames, and handing
//! a pending exception to the unwinder.

use crate::class_init::class_init;
use crate::native::invoke_native;
use crate::ops;
use crate::thread::VmThread;
use crate::unwind::unwind;
use jasper_core::Opcode;
use jasper_runtime::{MethodRef, ObjRef};

/// Control transfer requested by an opcode handler.
pub(crate) enum Control {
    /// Fall through to the next instruction.
    Next,
    /// Enter the generic invoke path for a selected method.
    Invoke(MethodRef),
    /// Pop a typed result out of the current activation.
    Return(ReturnValue),
    /// A pending exception is set; run the unwinder.
    Throw,
}

/// An untyped return payload; the facade types it by the target method's
/// return code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ReturnValue {
    Void,
    Int(u32),
    Long(u64),
    Object(ObjRef),
}

pub(crate) type OpHandler = fn(&mut VmThread) -> Control;

fn op_invalid(t: &mut VmThread) -> Control {
    let byte = t.active_code().body()[t.ip - 1];
    // Verified code cannot reach an unassigned opcode.
    panic!("invalid opcode {byte:#04x} at ip {}", t.ip - 1);
}

const fn build_dispatch_table() -> [OpHandler; 256] {
    let mut table: [OpHandler; 256] = [op_invalid; 256];

    // Constants
    table[Opcode::Nop as usize] = ops::control::nop;
    table[Opcode::AconstNull as usize] = ops::constants::aconst_null;
    table[Opcode::IconstM1 as usize] = ops::constants::iconst_m1;
    table[Opcode::Iconst0 as usize] = ops::constants::iconst_0;
    table[Opcode::Iconst1 as usize] = ops::constants::iconst_1;
    table[Opcode::Iconst2 as usize] = ops::constants::iconst_2;
    table[Opcode::Iconst3 as usize] = ops::constants::iconst_3;
    table[Opcode::Iconst4 as usize] = ops::constants::iconst_4;
    table[Opcode::Iconst5 as usize] = ops::constants::iconst_5;
    table[Opcode::Lconst0 as usize] = ops::constants::lconst_0;
    table[Opcode::Lconst1 as usize] = ops::constants::lconst_1;
    table[Opcode::Fconst0 as usize] = ops::constants::fconst_0;
    table[Opcode::Fconst1 as usize] = ops::constants::fconst_1;
    table[Opcode::Fconst2 as usize] = ops::constants::fconst_2;
    table[Opcode::Dconst0 as usize] = ops::constants::dconst_0;
    table[Opcode::Dconst1 as usize] = ops::constants::dconst_1;
    table[Opcode::Bipush as usize] = ops::constants::bipush;
    table[Opcode::Sipush as usize] = ops::constants::sipush;
    table[Opcode::Ldc as usize] = ops::constants::ldc;
    table[Opcode::LdcW as usize] = ops::constants::ldc_w;
    table[Opcode::Ldc2W as usize] = ops::constants::ldc2_w;

    // Loads
    table[Opcode::Iload as usize] = ops::load_store::iload;
    table[Opcode::Fload as usize] = ops::load_store::iload;
    table[Opcode::Lload as usize] = ops::load_store::lload;
    table[Opcode::Dload as usize] = ops::load_store::lload;
    table[Opcode::Aload as usize] = ops::load_store::aload;
    table[Opcode::Iload0 as usize] = ops::load_store::iload_0;
    table[Opcode::Iload1 as usize] = ops::load_store::iload_1;
    table[Opcode::Iload2 as usize] = ops::load_store::iload_2;
    table[Opcode::Iload3 as usize] = ops::load_store::iload_3;
    table[Opcode::Fload0 as usize] = ops::load_store::iload_0;
    table[Opcode::Fload1 as usize] = ops::load_store::iload_1;
    table[Opcode::Fload2 as usize] = ops::load_store::iload_2;
    table[Opcode::Fload3 as usize] = ops::load_store::iload_3;
    table[Opcode::Lload0 as usize] = ops::load_store::lload_0;
    table[Opcode::Lload1 as usize] = ops::load_store::lload_1;
    table[Opcode::Lload2 as usize] = ops::load_store::lload_2;
    table[Opcode::Lload3 as usize] = ops::load_store::lload_3;
    table[Opcode::Dload0 as usize] = ops::load_store::lload_0;
    table[Opcode::Dload1 as usize] = ops::load_store::lload_1;
    table[Opcode::Dload2 as usize] = ops::load_store::lload_2;
    table[Opcode::Dload3 as usize] = ops::load_store::lload_3;
    table[Opcode::Aload0 as usize] = ops::load_store::aload_0;
    table[Opcode::Aload1 as usize] = ops::load_store::aload_1;
    table[Opcode::Aload2 as usize] = ops::load_store::aload_2;
    table[Opcode::Aload3 as usize] = ops::load_store::aload_3;

    // Array loads
    table[Opcode::Iaload as usize] = ops::array::iaload;
    table[Opcode::Laload as usize] = ops::array::laload;
    table[Opcode::Faload as usize] = ops::array::faload;
    table[Opcode::Daload as usize] = ops::array::daload;
    table[Opcode::Aaload as usize] = ops::array::aaload;
    table[Opcode::Baload as usize] = ops::array::baload;
    table[Opcode::Caload as usize] = ops::array::caload;
    table[Opcode::Saload as usize] = ops::array::saload;

    // Stores
    table[Opcode::Istore as usize] = ops::load_store::istore;
    table[Opcode::Fstore as usize] = ops::load_store::istore;
    table[Opcode::Lstore as usize] = ops::load_store::lstore;
    table[Opcode::Dstore as usize] = ops::load_store::lstore;
    table[Opcode::Astore as usize] = ops::load_store::astore;
    table[Opcode::Istore0 as usize] = ops::load_store::istore_0;
    table[Opcode::Istore1 as usize] = ops::load_store::istore_1;
    table[Opcode::Istore2 as usize] = ops::load_store::istore_2;
    table[Opcode::Istore3 as usize] = ops::load_store::istore_3;
    table[Opcode::Fstore0 as usize] = ops::load_store::istore_0;
    table[Opcode::Fstore1 as usize] = ops::load_store::istore_1;
    table[Opcode::Fstore2 as usize] = ops::load_store::istore_2;
    table[Opcode::Fstore3 as usize] = ops::load_store::istore_3;
    table[Opcode::Lstore0 as usize] = ops::load_store::lstore_0;
    table[Opcode::Lstore1 as usize] = ops::load_store::lstore_1;
    table[Opcode::Lstore2 as usize] = ops::load_store::lstore_2;
    table[Opcode::Lstore3 as usize] = ops::load_store::lstore_3;
    table[Opcode::Dstore0 as usize] = ops::load_store::lstore_0;
    table[Opcode::Dstore1 as usize] = ops::load_store::lstore_1;
    table[Opcode::Dstore2 as usize] = ops::load_store::lstore_2;
    table[Opcode::Dstore3 as usize] = ops::load_store::lstore_3;
    table[Opcode::Astore0 as usize] = ops::load_store::astore_0;
    table[Opcode::Astore1 as usize] = ops::load_store::astore_1;
    table[Opcode::Astore2 as usize] = ops::load_store::astore_2;
    table[Opcode::Astore3 as usize] = ops::load_store::astore_3;

    // Array stores
    table[Opcode::Iastore as usize] = ops::array::iastore;
    table[Opcode::Lastore as usize] = ops::array::lastore;
    table[Opcode::Fastore as usize] = ops::array::fastore;
    table[Opcode::Dastore as usize] = ops::array::dastore;
    table[Opcode::Aastore as usize] = ops::array::aastore;
    table[Opcode::Bastore as usize] = ops::array::bastore;
    table[Opcode::Castore as usize] = ops::array::castore;
    table[Opcode::Sastore as usize] = ops::array::sastore;

    // Stack shuffling
    table[Opcode::Pop as usize] = ops::stack_ops::pop;
    table[Opcode::Pop2 as usize] = ops::stack_ops::pop2;
    table[Opcode::Dup as usize] = ops::stack_ops::dup;
    table[Opcode::DupX1 as usize] = ops::stack_ops::dup_x1;
    table[Opcode::DupX2 as usize] = ops::stack_ops::dup_x2;
    table[Opcode::Dup2 as usize] = ops::stack_ops::dup2;
    table[Opcode::Dup2X1 as usize] = ops::stack_ops::dup2_x1;
    table[Opcode::Dup2X2 as usize] = ops::stack_ops::dup2_x2;
    table[Opcode::Swap as usize] = ops::stack_ops::swap;

    // Arithmetic
    table[Opcode::Iadd as usize] = ops::arithmetic::iadd;
    table[Opcode::Ladd as usize] = ops::arithmetic::ladd;
    table[Opcode::Fadd as usize] = ops::arithmetic::fadd;
    table[Opcode::Dadd as usize] = ops::arithmetic::dadd;
    table[Opcode::Isub as usize] = ops::arithmetic::isub;
    table[Opcode::Lsub as usize] = ops::arithmetic::lsub;
    table[Opcode::Fsub as usize] = ops::arithmetic::fsub;
    table[Opcode::Dsub as usize] = ops::arithmetic::dsub;
    table[Opcode::Imul as usize] = ops::arithmetic::imul;
    table[Opcode::Lmul as usize] = ops::arithmetic::lmul;
    table[Opcode::Fmul as usize] = ops::arithmetic::fmul;
    table[Opcode::Dmul as usize] = ops::arithmetic::dmul;
    table[Opcode::Idiv as usize] = ops::arithmetic::idiv;
    table[Opcode::Ldiv as usize] = ops::arithmetic::ldiv;
    table[Opcode::Fdiv as usize] = ops::arithmetic::fdiv;
    table[Opcode::Ddiv as usize] = ops::arithmetic::ddiv;
    table[Opcode::Irem as usize] = ops::arithmetic::irem;
    table[Opcode::Lrem as usize] = ops::arithmetic::lrem;
    table[Opcode::Frem as usize] = ops::arithmetic::frem;
    table[Opcode::Drem as usize] = ops::arithmetic::drem;
    table[Opcode::Ineg as usize] = ops::arithmetic::ineg;
    table[Opcode::Lneg as usize] = ops::arithmetic::lneg;
    table[Opcode::Fneg as usize] = ops::arithmetic::fneg;
    table[Opcode::Dneg as usize] = ops::arithmetic::dneg;
    table[Opcode::Ishl as usize] = ops::arithmetic::ishl;
    table[Opcode::Lshl as usize] = ops::arithmetic::lshl;
    table[Opcode::Ishr as usize] = ops::arithmetic::ishr;
    table[Opcode::Lshr as usize] = ops::arithmetic::lshr;
    table[Opcode::Iushr as usize] = ops::arithmetic::iushr;
    table[Opcode::Lushr as usize] = ops::arithmetic::lushr;
    table[Opcode::Iand as usize] = ops::arithmetic::iand;
    table[Opcode::Land as usize] = ops::arithmetic::land;
    table[Opcode::Ior as usize] = ops::arithmetic::ior;
    table[Opcode::Lor as usize] = ops::arithmetic::lor;
    table[Opcode::Ixor as usize] = ops::arithmetic::ixor;
    table[Opcode::Lxor as usize] = ops::arithmetic::lxor;
    table[Opcode::Iinc as usize] = ops::load_store::iinc;

    // Conversions
    table[Opcode::I2l as usize] = ops::arithmetic::i2l;
    table[Opcode::I2f as usize] = ops::arithmetic::i2f;
    table[Opcode::I2d as usize] = ops::arithmetic::i2d;
    table[Opcode::L2i as usize] = ops::arithmetic::l2i;
    table[Opcode::L2f as usize] = ops::arithmetic::l2f;
    table[Opcode::L2d as usize] = ops::arithmetic::l2d;
    table[Opcode::F2i as usize] = ops::arithmetic::f2i;
    table[Opcode::F2l as usize] = ops::arithmetic::f2l;
    table[Opcode::F2d as usize] = ops::arithmetic::f2d;
    table[Opcode::D2i as usize] = ops::arithmetic::d2i;
    table[Opcode::D2l as usize] = ops::arithmetic::d2l;
    table[Opcode::D2f as usize] = ops::arithmetic::d2f;
    table[Opcode::I2b as usize] = ops::arithmetic::i2b;
    table[Opcode::I2c as usize] = ops::arithmetic::i2c;
    table[Opcode::I2s as usize] = ops::arithmetic::i2s;

    // Comparisons
    table[Opcode::Lcmp as usize] = ops::comparison::lcmp;
    table[Opcode::Fcmpl as usize] = ops::comparison::fcmpl;
    table[Opcode::Fcmpg as usize] = ops::comparison::fcmpg;
    table[Opcode::Dcmpl as usize] = ops::comparison::dcmpl;
    table[Opcode::Dcmpg as usize] = ops::comparison::dcmpg;

    // Branches
    table[Opcode::Ifeq as usize] = ops::control::ifeq;
    table[Opcode::Ifne as usize] = ops::control::ifne;
    table[Opcode::Iflt as usize] = ops::control::iflt;
    table[Opcode::Ifge as usize] = ops::control::ifge;
    table[Opcode::Ifgt as usize] = ops::control::ifgt;
    table[Opcode::Ifle as usize] = ops::control::ifle;
    table[Opcode::IfIcmpeq as usize] = ops::control::if_icmpeq;
    table[Opcode::IfIcmpne as usize] = ops::control::if_icmpne;
    table[Opcode::IfIcmplt as usize] = ops::control::if_icmplt;
    table[Opcode::IfIcmpge as usize] = ops::control::if_icmpge;
    table[Opcode::IfIcmpgt as usize] = ops::control::if_icmpgt;
    table[Opcode::IfIcmple as usize] = ops::control::if_icmple;
    table[Opcode::IfAcmpeq as usize] = ops::control::if_acmpeq;
    table[Opcode::IfAcmpne as usize] = ops::control::if_acmpne;
    table[Opcode::Ifnull as usize] = ops::control::ifnull;
    table[Opcode::Ifnonnull as usize] = ops::control::ifnonnull;
    table[Opcode::Goto as usize] = ops::control::goto;
    table[Opcode::GotoW as usize] = ops::control::goto_w;
    table[Opcode::Jsr as usize] = ops::control::jsr;
    table[Opcode::JsrW as usize] = ops::control::jsr_w;
    table[Opcode::Ret as usize] = ops::control::ret;
    table[Opcode::Tableswitch as usize] = ops::control::tableswitch;
    table[Opcode::Lookupswitch as usize] = ops::control::lookupswitch;

    // Returns
    table[Opcode::Ireturn as usize] = ops::control::ireturn;
    table[Opcode::Freturn as usize] = ops::control::ireturn;
    table[Opcode::Lreturn as usize] = ops::control::lreturn;
    table[Opcode::Dreturn as usize] = ops::control::lreturn;
    table[Opcode::Areturn as usize] = ops::control::areturn;
    table[Opcode::Return as usize] = ops::control::return_void;

    // Fields
    table[Opcode::Getstatic as usize] = ops::field::getstatic;
    table[Opcode::Putstatic as usize] = ops::field::putstatic;
    table[Opcode::Getfield as usize] = ops::field::getfield;
    table[Opcode::Putfield as usize] = ops::field::putfield;

    // Invocation
    table[Opcode::Invokevirtual as usize] = ops::invoke::invokevirtual;
    table[Opcode::Invokespecial as usize] = ops::invoke::invokespecial;
    table[Opcode::Invokestatic as usize] = ops::invoke::invokestatic;
    table[Opcode::Invokeinterface as usize] = ops::invoke::invokeinterface;

    // Objects and types
    table[Opcode::New as usize] = ops::object::new;
    table[Opcode::Newarray as usize] = ops::array::newarray;
    table[Opcode::Anewarray as usize] = ops::array::anewarray;
    table[Opcode::Arraylength as usize] = ops::array::arraylength;
    table[Opcode::Athrow as usize] = ops::object::athrow;
    table[Opcode::Checkcast as usize] = ops::object::checkcast;
    table[Opcode::Instanceof as usize] = ops::object::instanceof;
    table[Opcode::Monitorenter as usize] = ops::object::monitorenter;
    table[Opcode::Monitorexit as usize] = ops::object::monitorexit;
    table[Opcode::Multianewarray as usize] = ops::array::multianewarray;

    // Prefix and reentry
    table[Opcode::Wide as usize] = ops::wide::wide;
    table[Opcode::Impdep1 as usize] = ops::invoke::impdep1;

    table
}

/// Opcode handlers indexed by instruction byte.
pub(crate) static DISPATCH_TABLE: [OpHandler; 256] = build_dispatch_table();

/// Run the dispatch loop for the frame chain rooted at the current frame.
///
/// Returns the outermost activation's result, or the pending exception
/// after an unsuccessful unwind (in which case every frame from here down
/// has been popped).
pub(crate) fn interpret(t: &mut VmThread) -> Result<ReturnValue, ObjRef> {
    let base = t.frame;
    let mut pending: Option<Control> = None;

    // A method whose class still needs initialization runs <clinit>
    // before its first instruction.
    if t.pending_exception().is_some() {
        pending = Some(Control::Throw);
    } else {
        let entry_class = t.current_method().class();
        if let Some(control) = class_init(t, entry_class, 0) {
            pending = Some(control);
        }
    }

    loop {
        let control = match pending.take() {
            Some(control) => control,
            None => {
                let opcode = t.read_u8();
                DISPATCH_TABLE[opcode as usize](t)
            }
        };

        match control {
            Control::Next => {}

            Control::Invoke(method) => {
                pending = enter_invoke(t, method);
            }

            Control::Return(value) => {
                if t.frame > base {
                    t.pop_frame();
                    match value {
                        ReturnValue::Void => {}
                        ReturnValue::Int(v) => t.push_int(v),
                        ReturnValue::Long(v) => t.push_long(v),
                        ReturnValue::Object(o) => t.push_object(o),
                    }
                } else {
                    // Outermost frame: the caller pops it.
                    return Ok(value);
                }
            }

            Control::Throw => {
                if !unwind(t, base) {
                    let exception = t
                        .take_pending_exception()
                        .expect("throw control without a pending exception");
                    return Err(exception);
                }
            }
        }
    }
}

/// The generic invoke path: natives complete in place, bytecode methods
/// get a depth check and a fresh frame.
fn enter_invoke(t: &mut VmThread, method: MethodRef) -> Option<Control> {
    if method.is_native() {
        match invoke_native(t, method) {
            Control::Next => None,
            control => Some(control),
        }
    } else {
        if !t.check_stack(method) {
            return Some(t.raise_stack_overflow());
        }
        t.push_frame(method);
        None
    }
}
