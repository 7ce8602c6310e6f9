use crate::chunk::Chunk;
use crate::objects::object::{Object, ObjectType};
use crate::objects::object_string::ObjectString;

#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    // Null for the top-level script.
    pub name: *mut ObjectString,
}

impl ObjectFunction {
    pub fn new() -> Self {
        ObjectFunction {
            object: Object::new(ObjectType::ObjFunction),
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name: std::ptr::null_mut(),
        }
    }
}

impl Default for ObjectFunction {
    fn default() -> Self {
        Self::new()
    }
}
