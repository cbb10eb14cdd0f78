//! The `wide` prefix: 16-bit local indexes for loads, stores, `iinc`,
//! and `ret`.

use crate::dispatch::Control;
use crate::thread::VmThread;
use jasper_core::Opcode;

pub(crate) fn wide(t: &mut VmThread) -> Control {
    let widened = t.read_u8();
    match Opcode::from_u8(widened) {
        Some(Opcode::Iload) | Some(Opcode::Fload) => {
            let index = t.read_u16() as usize;
            let value = t.local_int(index);
            t.push_int(value);
        }
        Some(Opcode::Lload) | Some(Opcode::Dload) => {
            let index = t.read_u16() as usize;
            let value = t.local_long(index);
            t.push_long(value);
        }
        Some(Opcode::Aload) => {
            let index = t.read_u16() as usize;
            let value = t.local_object(index);
            t.push_object(value);
        }
        Some(Opcode::Istore) | Some(Opcode::Fstore) => {
            let index = t.read_u16() as usize;
            let value = t.pop_int();
            t.set_local_int(index, value);
        }
        Some(Opcode::Lstore) | Some(Opcode::Dstore) => {
            let index = t.read_u16() as usize;
            let value = t.pop_long();
            t.set_local_long(index, value);
        }
        Some(Opcode::Astore) => {
            let index = t.read_u16() as usize;
            let value = t.pop_object();
            t.set_local_object(index, value);
        }
        Some(Opcode::Iinc) => {
            let index = t.read_u16() as usize;
            let constant = t.read_i16();
            let value = (t.local_int(index) as i32).wrapping_add(constant as i32);
            t.set_local_int(index, value as u32);
        }
        Some(Opcode::Ret) => {
            let index = t.read_u16() as usize;
            t.ip = t.local_int(index) as usize;
        }
        _ => panic!("invalid wide prefix target {widened:#04x}"),
    }
    Control::Next
}
