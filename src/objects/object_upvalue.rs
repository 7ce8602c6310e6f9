use crate::objects::object::{Object, ObjectType};
use crate::value::{make_none_value, Value};

/// While the captured stack slot is live, `location` points into the VM
/// value stack ("open"). Once the slot leaves scope the value moves into
/// `closed` and `location` is retargeted at it ("closed").
#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub location: *mut Value,
    pub closed: Value,
    // Next open upvalue, ordered by strictly descending `location`.
    pub next: *mut ObjectUpvalue,
}

impl ObjectUpvalue {
    pub fn new(location: *mut Value) -> Self {
        ObjectUpvalue {
            object: Object::new(ObjectType::ObjUpvalue),
            location,
            closed: make_none_value(),
            next: std::ptr::null_mut(),
        }
    }
}
