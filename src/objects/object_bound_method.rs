use crate::objects::object::{Object, ObjectType};
use crate::objects::object_closure::ObjectClosure;
use crate::value::Value;

/// A method closure paired with the receiver it was read from, so the
/// receiver lands back in slot zero when the bound method is called.
#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: *mut ObjectClosure,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: *mut ObjectClosure) -> Self {
        ObjectBoundMethod {
            object: Object::new(ObjectType::ObjBoundMethod),
            receiver,
            method,
        }
    }
}
