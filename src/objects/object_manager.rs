use crate::memory;
use crate::objects::object::{NativeObject, Object};
use crate::objects::object_bound_method::ObjectBoundMethod;
use crate::objects::object_class::ObjectClass;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_instance::ObjectInstance;
use crate::objects::object_native_function::ObjectNativeFunction;
use crate::objects::object_string::ObjectString;
use crate::objects::object_upvalue::ObjectUpvalue;
use crate::value::Value;

const GC_INITIAL_THRESHOLD: usize = 1024 * 1024;
const GC_HEAP_GROW_FACTOR: usize = 2;

/// Owns every heap object through an intrusive singly-linked list threaded
/// through the object headers. The list is the sole deallocation index:
/// tables, stacks, and closures hold non-owning pointers, and only the
/// collector (or teardown) frees objects.
pub struct ObjectManager {
    objects: *mut Object,
    bytes_allocated: usize,
    next_gc: usize,
}

impl ObjectManager {
    pub fn new() -> Self {
        ObjectManager {
            objects: std::ptr::null_mut(),
            bytes_allocated: 0,
            next_gc: GC_INITIAL_THRESHOLD,
        }
    }

    fn track(&mut self, object: *mut Object) {
        unsafe {
            (*object).next = self.objects;
            self.bytes_allocated += (*object).deep_size();
        }
        self.objects = object;
    }

    pub fn alloc_string(&mut self, content: &str, hash: u32) -> *mut ObjectString {
        let ptr = Box::into_raw(Box::new(ObjectString::new(content, hash)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_function(&mut self) -> *mut ObjectFunction {
        let ptr = Box::into_raw(Box::new(ObjectFunction::new()));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> *mut ObjectClosure {
        let upvalue_count = unsafe { (*function).upvalue_count };
        let ptr = Box::into_raw(Box::new(ObjectClosure::new(function, upvalue_count)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_native_function(
        &mut self,
        name: String,
        arity: u8,
        native_object: impl NativeObject + 'static,
    ) -> *mut ObjectNativeFunction {
        let ptr = Box::into_raw(Box::new(ObjectNativeFunction::new(name, arity, native_object)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> *mut ObjectUpvalue {
        let ptr = Box::into_raw(Box::new(ObjectUpvalue::new(location)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_class(&mut self, name: *mut ObjectString) -> *mut ObjectClass {
        let ptr = Box::into_raw(Box::new(ObjectClass::new(name)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> *mut ObjectInstance {
        let ptr = Box::into_raw(Box::new(ObjectInstance::new(class)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn alloc_bound_method(
        &mut self,
        receiver: Value,
        method: *mut ObjectClosure,
    ) -> *mut ObjectBoundMethod {
        let ptr = Box::into_raw(Box::new(ObjectBoundMethod::new(receiver, method)));
        self.track(ptr as *mut Object);
        ptr
    }

    pub fn head(&self) -> *mut Object {
        self.objects
    }

    pub fn set_head(&mut self, head: *mut Object) {
        self.objects = head;
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn sub_bytes(&mut self, freed: usize) {
        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
    }

    /// Collection threshold check, run by the VM and the compiler right
    /// before every allocation that may need a preceding collection.
    pub fn should_collect(&self) -> bool {
        if cfg!(feature = "gc_stress") {
            return true;
        }
        self.bytes_allocated > self.next_gc
    }

    /// Doubles the trigger off the post-sweep live size. Returns the new
    /// threshold so collectors can report it.
    pub fn update_next_gc(&mut self) -> usize {
        self.next_gc = self.bytes_allocated * GC_HEAP_GROW_FACTOR;
        self.next_gc
    }

    pub fn iter(&self) -> ObjectIter {
        ObjectIter {
            current: self.objects,
        }
    }

    pub fn free_all(&mut self) {
        let mut current = self.objects;
        while !current.is_null() {
            unsafe {
                let next = (*current).next;
                memory::free_object(current);
                current = next;
            }
        }
        self.objects = std::ptr::null_mut();
        self.bytes_allocated = 0;
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        self.free_all();
    }
}

pub struct ObjectIter {
    current: *mut Object,
}

impl Iterator for ObjectIter {
    type Item = *mut Object;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        let object = self.current;
        self.current = unsafe { (*object).next };
        Some(object)
    }
}
