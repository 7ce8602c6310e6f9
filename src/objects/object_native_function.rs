use crate::objects::object::{NativeObject, Object, ObjectType};
use crate::value::Value;

#[repr(C)]
pub struct ObjectNativeFunction {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub native_object: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: String, arity: u8, native_object: impl NativeObject + 'static) -> Self {
        ObjectNativeFunction {
            object: Object::new(ObjectType::ObjNativeFunction),
            name,
            arity,
            native_object: Box::new(native_object),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        if args.len() != self.arity as usize {
            return Err(format!(
                "Expected {} parameters but got {}",
                self.arity,
                args.len()
            ));
        }
        self.native_object.run(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{as_number, make_number_value};

    struct AddOne;

    impl NativeObject for AddOne {
        fn run(&self, args: &[Value]) -> Result<Value, String> {
            Ok(make_number_value(as_number(&args[0]) + 1.0))
        }
    }

    #[test]
    fn invoke_checks_arity() {
        let native = ObjectNativeFunction::new("addOne".to_string(), 1, AddOne);
        let args = [make_number_value(41.0)];
        let result = native.invoke(&args).unwrap();
        assert_eq!(as_number(&result), 42.0);

        let err = native.invoke(&[]).unwrap_err();
        assert_eq!(err, "Expected 1 parameters but got 0");
    }
}
