use crate::objects::object::{Object, ObjectType};
use crate::objects::object_string::ObjectString;
use crate::table::Table;

#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: *mut ObjectString,
    // Method name -> closure. Populated while the class declaration runs.
    pub methods: Table,
}

impl ObjectClass {
    pub fn new(name: *mut ObjectString) -> Self {
        ObjectClass {
            object: Object::new(ObjectType::ObjClass),
            name,
            methods: Table::new(),
        }
    }
}
