use std::mem;

use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::ObjectUpvalue;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    ObjBoundMethod,
    ObjClass,
    ObjClosure,
    ObjFunction,
    ObjInstance,
    ObjNativeFunction,
    ObjString,
    ObjUpvalue,
}

// Every concrete object struct is #[repr(C)] with this header as its first
// field, so an Object pointer can be cast to the concrete type and back.
#[repr(C)]
pub struct Object {
    pub obj_type: ObjectType,
    pub is_marked: bool,
    pub next: *mut Object,
}

impl Object {
    pub fn new(obj_type: ObjectType) -> Self {
        Object {
            obj_type,
            is_marked: false,
            next: std::ptr::null_mut(),
        }
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_string(&self) -> &ObjectString {
        debug_assert_eq!(self.obj_type, ObjectType::ObjString);
        &*(self as *const Object as *const ObjectString)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_function(&self) -> &ObjectFunction {
        debug_assert_eq!(self.obj_type, ObjectType::ObjFunction);
        &*(self as *const Object as *const ObjectFunction)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_native_function(&self) -> &ObjectNativeFunction {
        debug_assert_eq!(self.obj_type, ObjectType::ObjNativeFunction);
        &*(self as *const Object as *const ObjectNativeFunction)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_closure(&self) -> &ObjectClosure {
        debug_assert_eq!(self.obj_type, ObjectType::ObjClosure);
        &*(self as *const Object as *const ObjectClosure)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_upvalue(&self) -> &ObjectUpvalue {
        debug_assert_eq!(self.obj_type, ObjectType::ObjUpvalue);
        &*(self as *const Object as *const ObjectUpvalue)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_class(&self) -> &ObjectClass {
        debug_assert_eq!(self.obj_type, ObjectType::ObjClass);
        &*(self as *const Object as *const ObjectClass)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_instance(&self) -> &ObjectInstance {
        debug_assert_eq!(self.obj_type, ObjectType::ObjInstance);
        &*(self as *const Object as *const ObjectInstance)
    }

    /// # Safety
    /// The object header must belong to the concrete type being requested.
    pub unsafe fn as_bound_method(&self) -> &ObjectBoundMethod {
        debug_assert_eq!(self.obj_type, ObjectType::ObjBoundMethod);
        &*(self as *const Object as *const ObjectBoundMethod)
    }

    /// Size of the object plus the heap payloads it owns. Used by the object
    /// manager to account allocated bytes and by the sweep to account frees.
    ///
    /// # Safety
    /// The object header must be the first field of a live concrete object.
    pub unsafe fn deep_size(&self) -> usize {
        match self.obj_type {
            ObjectType::ObjString => {
                mem::size_of::<ObjectString>() + self.as_string().content.capacity()
            }
            ObjectType::ObjFunction => {
                mem::size_of::<ObjectFunction>() + self.as_function().chunk.byte_size()
            }
            ObjectType::ObjNativeFunction => mem::size_of::<ObjectNativeFunction>(),
            ObjectType::ObjClosure => {
                mem::size_of::<ObjectClosure>()
                    + self.as_closure().upvalues.capacity()
                        * mem::size_of::<*mut ObjectUpvalue>()
            }
            ObjectType::ObjUpvalue => mem::size_of::<ObjectUpvalue>(),
            ObjectType::ObjClass => {
                mem::size_of::<ObjectClass>() + self.as_class().methods.byte_size()
            }
            ObjectType::ObjInstance => {
                mem::size_of::<ObjectInstance>() + self.as_instance().fields.byte_size()
            }
            ObjectType::ObjBoundMethod => mem::size_of::<ObjectBoundMethod>(),
        }
    }
}

/// Host function callable from scripts. Implementations run to completion;
/// an Err aborts the current interpret call as a runtime error.
pub trait NativeObject {
    fn run(&self, args: &[Value]) -> Result<Value, String>;
}
