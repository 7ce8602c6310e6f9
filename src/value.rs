use std::fmt;

use crate::objects::object::{Object, ObjectType};
use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_manager::ObjectManager;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::{hash_string, ObjectString};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    ValueBool,
    ValueNone,
    ValueNumber,
    ValueObject,
}

#[derive(Clone, Copy)]
pub union ValueUnion {
    pub boolean: bool,
    pub number: f64,
    pub object: *mut Object,
}

#[derive(Clone, Copy)]
pub struct Value {
    pub value_type: ValueType,
    pub value_as: ValueUnion,
}

pub type ValueArray = Vec<Value>;

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if self.value_type != other.value_type {
            return false;
        }
        unsafe {
            match self.value_type {
                ValueType::ValueBool => self.value_as.boolean == other.value_as.boolean,
                ValueType::ValueNone => true,
                ValueType::ValueNumber => self.value_as.number == other.value_as.number,
                // Strings are interned, so pointer identity doubles as
                // content equality.
                ValueType::ValueObject => std::ptr::eq(self.value_as.object, other.value_as.object),
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_value(self))
    }
}

pub fn make_bool_value(boolean: bool) -> Value {
    Value {
        value_type: ValueType::ValueBool,
        value_as: ValueUnion { boolean },
    }
}

pub fn make_none_value() -> Value {
    Value {
        value_type: ValueType::ValueNone,
        value_as: ValueUnion { number: 0.0 },
    }
}

pub fn make_number_value(number: f64) -> Value {
    Value {
        value_type: ValueType::ValueNumber,
        value_as: ValueUnion { number },
    }
}

pub fn make_object_value(object: *mut Object) -> Value {
    Value {
        value_type: ValueType::ValueObject,
        value_as: ValueUnion { object },
    }
}

/// Interning constructor: byte-equal strings share one heap object. The
/// intern table keeps non-owning keys; the caller is responsible for running
/// the collection-threshold check before calling in.
pub fn make_string_value(
    object_manager: &mut ObjectManager,
    intern_strings: &mut Table,
    content: &str,
) -> Value {
    let hash = hash_string(content);
    if let Some(interned) = intern_strings.find_str(content, hash) {
        return make_object_value(interned as *mut Object);
    }

    let string = object_manager.alloc_string(content, hash);
    intern_strings.insert(string, make_none_value());
    make_object_value(string as *mut Object)
}

pub fn is_bool(value: &Value) -> bool {
    value.value_type == ValueType::ValueBool
}

pub fn is_none(value: &Value) -> bool {
    value.value_type == ValueType::ValueNone
}

pub fn is_number(value: &Value) -> bool {
    value.value_type == ValueType::ValueNumber
}

pub fn is_object(value: &Value) -> bool {
    value.value_type == ValueType::ValueObject
}

pub fn is_obj_type(value: &Value, obj_type: ObjectType) -> bool {
    is_object(value) && unsafe { (*as_object(value)).obj_type == obj_type }
}

pub fn is_string(value: &Value) -> bool {
    is_obj_type(value, ObjectType::ObjString)
}

pub fn is_class(value: &Value) -> bool {
    is_obj_type(value, ObjectType::ObjClass)
}

pub fn is_instance(value: &Value) -> bool {
    is_obj_type(value, ObjectType::ObjInstance)
}

pub fn as_bool(value: &Value) -> bool {
    debug_assert!(is_bool(value));
    unsafe { value.value_as.boolean }
}

pub fn as_number(value: &Value) -> f64 {
    debug_assert!(is_number(value));
    unsafe { value.value_as.number }
}

pub fn as_object(value: &Value) -> *mut Object {
    debug_assert!(is_object(value));
    unsafe { value.value_as.object }
}

pub fn as_string(value: &Value) -> *mut ObjectString {
    as_object(value) as *mut ObjectString
}

pub fn as_function(value: &Value) -> *mut ObjectFunction {
    as_object(value) as *mut ObjectFunction
}

pub fn as_closure(value: &Value) -> *mut ObjectClosure {
    as_object(value) as *mut ObjectClosure
}

pub fn as_native_function(value: &Value) -> *mut ObjectNativeFunction {
    as_object(value) as *mut ObjectNativeFunction
}

pub fn as_class(value: &Value) -> *mut ObjectClass {
    as_object(value) as *mut ObjectClass
}

pub fn as_instance(value: &Value) -> *mut ObjectInstance {
    as_object(value) as *mut ObjectInstance
}

pub fn as_bound_method(value: &Value) -> *mut ObjectBoundMethod {
    as_object(value) as *mut ObjectBoundMethod
}

pub fn print_value(value: &Value) {
    print!("{}", format_value(value));
}

pub fn format_value(value: &Value) -> String {
    match value.value_type {
        ValueType::ValueBool => {
            if as_bool(value) {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        ValueType::ValueNone => "none".to_string(),
        // f64 Display is the shortest decimal that parses back to the same
        // double; integral values print without a fraction.
        ValueType::ValueNumber => format!("{}", as_number(value)),
        ValueType::ValueObject => format_object(as_object(value)),
    }
}

fn format_object(object: *const Object) -> String {
    unsafe {
        match (*object).obj_type {
            ObjectType::ObjString => (*object).as_string().content.clone(),
            ObjectType::ObjFunction => {
                let function = (*object).as_function();
                if function.name.is_null() {
                    "<script>".to_string()
                } else {
                    format!("<fn {}>", (*function.name).content)
                }
            }
            ObjectType::ObjNativeFunction => {
                format!("<native fn {}>", (*object).as_native_function().name)
            }
            ObjectType::ObjClosure => {
                format_object((*object).as_closure().function as *const Object)
            }
            ObjectType::ObjUpvalue => "upvalue".to_string(),
            ObjectType::ObjClass => (*(*object).as_class().name).content.clone(),
            ObjectType::ObjInstance => {
                let instance = (*object).as_instance();
                format!("{} instance", (*(*instance.class).name).content)
            }
            ObjectType::ObjBoundMethod => {
                format_object((*object).as_bound_method().method as *const Object)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_follows_the_value_kind() {
        assert_eq!(make_number_value(1.5), make_number_value(1.5));
        assert_ne!(make_number_value(1.5), make_number_value(2.5));
        assert_eq!(make_none_value(), make_none_value());
        assert_eq!(make_bool_value(true), make_bool_value(true));
        assert_ne!(make_bool_value(true), make_bool_value(false));
        assert_ne!(make_none_value(), make_bool_value(false));
        assert_ne!(make_number_value(0.0), make_none_value());
    }

    #[test]
    fn interned_strings_compare_by_handle() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();

        let first = make_string_value(&mut manager, &mut interns, "shared");
        let second = make_string_value(&mut manager, &mut interns, "shared");
        let other = make_string_value(&mut manager, &mut interns, "different");

        assert_eq!(as_string(&first), as_string(&second));
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(manager.iter().count(), 2);
    }

    #[test]
    fn numbers_print_shortest_round_trip() {
        assert_eq!(format_value(&make_number_value(7.0)), "7");
        assert_eq!(format_value(&make_number_value(2.5)), "2.5");
        assert_eq!(format_value(&make_number_value(0.1)), "0.1");
        assert_eq!(format_value(&make_number_value(-3.0)), "-3");

        let printed = format_value(&make_number_value(0.30000000000000004));
        assert_eq!(printed.parse::<f64>().unwrap(), 0.30000000000000004);
    }

    #[test]
    fn literals_print_their_keywords() {
        assert_eq!(format_value(&make_none_value()), "none");
        assert_eq!(format_value(&make_bool_value(true)), "true");
        assert_eq!(format_value(&make_bool_value(false)), "false");
    }

    #[test]
    fn objects_print_by_kind() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();

        let name = make_string_value(&mut manager, &mut interns, "greet");
        let function = manager.alloc_function();
        unsafe {
            (*function).name = as_string(&name);
        }
        assert_eq!(
            format_value(&make_object_value(function as *mut Object)),
            "<fn greet>"
        );

        let class = manager.alloc_class(as_string(&name));
        assert_eq!(
            format_value(&make_object_value(class as *mut Object)),
            "greet"
        );

        let instance = manager.alloc_instance(class);
        assert_eq!(
            format_value(&make_object_value(instance as *mut Object)),
            "greet instance"
        );
    }
}
