use crate::objects::object::{Object, ObjectType};
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_upvalue::ObjectUpvalue;

#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    // Filled in right after allocation, one slot per captured variable.
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction, upvalue_count: usize) -> Self {
        ObjectClosure {
            object: Object::new(ObjectType::ObjClosure),
            function,
            upvalues: vec![std::ptr::null_mut(); upvalue_count],
        }
    }
}
