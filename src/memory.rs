use crate::objects::object::{Object, ObjectType};
use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::ObjectUpvalue;

pub fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 {
        8
    } else {
        capacity * 2
    }
}

/// Frees a heap object through its concrete type so the owned payloads
/// (string buffers, chunks, upvalue arrays, tables) are reclaimed with it.
/// Returns the deep size that was accounted for the object.
///
/// # Safety
///
/// `object` must be a pointer previously produced by the object manager and
/// not freed since; the caller must ensure nothing dereferences it afterwards.
pub unsafe fn free_object(object: *mut Object) -> usize {
    let freed = (*object).deep_size();

    #[cfg(feature = "debug_trace_object")]
    eprintln!("free object ptr={:p} type={:?}", object, (*object).obj_type);

    match (*object).obj_type {
        ObjectType::ObjString => drop(Box::from_raw(object as *mut ObjectString)),
        ObjectType::ObjFunction => drop(Box::from_raw(object as *mut ObjectFunction)),
        ObjectType::ObjNativeFunction => drop(Box::from_raw(object as *mut ObjectNativeFunction)),
        ObjectType::ObjClosure => drop(Box::from_raw(object as *mut ObjectClosure)),
        ObjectType::ObjUpvalue => drop(Box::from_raw(object as *mut ObjectUpvalue)),
        ObjectType::ObjClass => drop(Box::from_raw(object as *mut ObjectClass)),
        ObjectType::ObjInstance => drop(Box::from_raw(object as *mut ObjectInstance)),
        ObjectType::ObjBoundMethod => drop(Box::from_raw(object as *mut ObjectBoundMethod)),
    }

    freed
}

#[cfg(test)]
mod tests {
    use super::grow_capacity;

    #[test]
    fn grow_capacity_starts_at_eight_then_doubles() {
        assert_eq!(grow_capacity(0), 8);
        assert_eq!(grow_capacity(7), 8);
        assert_eq!(grow_capacity(8), 16);
        assert_eq!(grow_capacity(32), 64);
    }
}
