use crate::memory;
use crate::objects::object::{Object, ObjectType};
use crate::objects::object_manager::ObjectManager;
use crate::table::Table;
use crate::value::{as_object, is_object, Value};

// Lightweight tracing macro (only active with the gc_debug feature)
#[cfg(feature = "gc_debug")]
macro_rules! gc_trace { ($($arg:tt)*) => { eprintln!("[gc-trace] {}", format_args!($($arg)*)); } }
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace { ($($arg:tt)*) => {}; }

/// Aggregated GC statistics (does not include currently-live total bytes;
/// the object manager tracks that).
#[derive(Default, Debug, Clone)]
pub struct GCStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
    pub last_before_bytes: usize,
    pub last_after_bytes: usize,
    pub last_next_trigger_bytes: usize,
}

impl GCStats {
    fn record(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.cycles += 1;
        self.total_freed_bytes += freed;
        self.last_freed_bytes = freed;
        self.last_before_bytes = before;
        self.last_after_bytes = after;
        self.last_next_trigger_bytes = next_trigger;
    }
}

/// Tricolor mark-sweep over the object manager's all-objects list. White is
/// a cleared mark bit, gray lives on the explicit worklist, black is marked
/// and popped. Roots are pushed by the owner of the cycle (VM or compiler);
/// the collector only traces, prunes weak intern entries, and sweeps.
pub struct GarbageCollector {
    gray_stack: Vec<*mut Object>,
    stats: GCStats,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            gray_stack: vec![],
            stats: GCStats::default(),
        }
    }

    // Marking a white object sets its mark bit and queues it gray.
    pub fn mark_object(&mut self, object: *mut Object) {
        if object.is_null() {
            return;
        }
        unsafe {
            if (*object).is_marked {
                return;
            }
            (*object).is_marked = true;
        }
        gc_trace!("mark_object enqueue gray ptr={:p}", object);
        self.gray_stack.push(object);
    }

    pub fn mark_value(&mut self, value: &Value) {
        if !is_object(value) {
            return;
        }
        self.mark_object(as_object(value));
    }

    // Tables are roots through both keys and values.
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key as *mut Object);
            self.mark_value(&value);
        }
    }

    // Process gray objects until none remain.
    pub fn trace_references(&mut self) {
        while let Some(object) = self.gray_stack.pop() {
            gc_trace!("trace gray -> black ptr={:p}", object);
            unsafe {
                self.blacken_object(object);
            }
        }
    }

    // Mark all references out of an object.
    unsafe fn blacken_object(&mut self, object: *mut Object) {
        match (*object).obj_type {
            // Strings and natives own no traced references.
            ObjectType::ObjString | ObjectType::ObjNativeFunction => {}
            ObjectType::ObjUpvalue => {
                let upvalue = (*object).as_upvalue();
                self.mark_value(&upvalue.closed);
            }
            ObjectType::ObjFunction => {
                let function = (*object).as_function();
                self.mark_object(function.name as *mut Object);
                for constant in function.chunk.iter_constants() {
                    self.mark_value(constant);
                }
            }
            ObjectType::ObjClosure => {
                let closure = (*object).as_closure();
                self.mark_object(closure.function as *mut Object);
                for upvalue in &closure.upvalues {
                    self.mark_object(*upvalue as *mut Object);
                }
            }
            ObjectType::ObjClass => {
                let class = (*object).as_class();
                self.mark_object(class.name as *mut Object);
                self.mark_table(&class.methods);
            }
            ObjectType::ObjInstance => {
                let instance = (*object).as_instance();
                self.mark_object(instance.class as *mut Object);
                self.mark_table(&instance.fields);
            }
            ObjectType::ObjBoundMethod => {
                let bound = (*object).as_bound_method();
                self.mark_value(&bound.receiver);
                self.mark_object(bound.method as *mut Object);
            }
        }
    }

    /// Frees every unmarked object in the all-objects list and clears the
    /// mark bit on survivors. Returns the freed byte total.
    pub fn sweep(&mut self, object_manager: &mut ObjectManager) -> usize {
        let mut freed_bytes = 0;
        let mut prev: *mut Object = std::ptr::null_mut();
        let mut object = object_manager.head();
        while !object.is_null() {
            unsafe {
                if (*object).is_marked {
                    (*object).is_marked = false;
                    prev = object;
                    object = (*object).next;
                } else {
                    let unreached = object;
                    object = (*object).next;
                    if prev.is_null() {
                        object_manager.set_head(object);
                    } else {
                        (*prev).next = object;
                    }
                    freed_bytes += memory::free_object(unreached);
                }
            }
        }
        object_manager.sub_bytes(freed_bytes);
        gc_trace!("sweep freed_bytes={}", freed_bytes);
        freed_bytes
    }

    /// Record a completed cycle (invoked by the owner, which knows bytes
    /// before/after and the new threshold).
    pub fn record_cycle(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.stats.record(before, freed, after, next_trigger);
        gc_trace!(
            "cycle summary cycles={} freed={} before={} after={} next_trigger={}",
            self.stats.cycles,
            freed,
            before,
            after,
            next_trigger
        );
    }

    pub fn stats(&self) -> &GCStats {
        &self.stats
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_string::hash_string;
    use crate::value::{make_object_value, make_string_value};

    #[test]
    fn gc_collects_unreachable_objects() {
        let mut manager = ObjectManager::new();
        let keep = manager.alloc_string("keep", hash_string("keep"));
        manager.alloc_string("drop1", hash_string("drop1"));
        manager.alloc_string("drop2", hash_string("drop2"));
        manager.alloc_string("drop3", hash_string("drop3"));

        let mut gc = GarbageCollector::new();
        gc.mark_object(keep as *mut Object);
        gc.trace_references();
        let freed = gc.sweep(&mut manager);

        assert!(freed > 0, "Expected some bytes to be freed");
        assert_eq!(manager.iter().count(), 1);
        // Survivors come out white, ready for the next cycle.
        assert!(!unsafe { (*keep).object.is_marked });
    }

    #[test]
    fn gc_preserves_reachable_closure_and_function() {
        let mut manager = ObjectManager::new();
        let function = manager.alloc_function();
        let closure = manager.alloc_closure(function);
        manager.alloc_function();

        let mut gc = GarbageCollector::new();
        gc.mark_object(closure as *mut Object);
        gc.trace_references();
        gc.sweep(&mut manager);

        assert_eq!(manager.iter().count(), 2);
    }

    #[test]
    fn gc_marks_through_closed_upvalue() {
        let mut manager = ObjectManager::new();
        let captured = manager.alloc_string("captured", hash_string("captured"));
        let upvalue = manager.alloc_upvalue(std::ptr::null_mut());
        unsafe {
            (*upvalue).closed = make_object_value(captured as *mut Object);
            (*upvalue).location = &mut (*upvalue).closed;
        }

        let mut gc = GarbageCollector::new();
        gc.mark_object(upvalue as *mut Object);
        gc.trace_references();
        gc.sweep(&mut manager);

        assert_eq!(manager.iter().count(), 2);
    }

    #[test]
    fn gc_traces_class_method_cycles() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();
        let name = make_string_value(&mut manager, &mut interns, "Cycle");
        let class = manager.alloc_class(crate::value::as_string(&name));
        let function = manager.alloc_function();
        let method = manager.alloc_closure(function);
        unsafe {
            (*class).methods.insert(
                crate::value::as_string(&name),
                make_object_value(method as *mut Object),
            );
            // Close the loop: the method's function is "named" by the class name.
            (*function).name = crate::value::as_string(&name);
        }

        let mut gc = GarbageCollector::new();
        gc.mark_object(class as *mut Object);
        gc.trace_references();
        interns.remove_white();
        gc.sweep(&mut manager);

        // Class, name string, closure, and function all survive.
        assert_eq!(manager.iter().count(), 4);
    }

    #[test]
    fn weak_intern_table_releases_unmarked_strings() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();
        let kept = make_string_value(&mut manager, &mut interns, "kept");
        make_string_value(&mut manager, &mut interns, "garbage");

        let mut gc = GarbageCollector::new();
        gc.mark_value(&kept);
        gc.trace_references();
        interns.remove_white();
        let freed = gc.sweep(&mut manager);

        assert!(freed > 0);
        assert_eq!(manager.iter().count(), 1);
        assert!(interns.find_str("kept", hash_string("kept")).is_some());
        assert!(interns.find_str("garbage", hash_string("garbage")).is_none());
    }

    #[test]
    fn globals_root_keys_and_values() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();
        let mut globals = Table::new();
        let name = make_string_value(&mut manager, &mut interns, "answer");
        let value = make_string_value(&mut manager, &mut interns, "forty-two");
        globals.insert(crate::value::as_string(&name), value);
        make_string_value(&mut manager, &mut interns, "unreferenced");

        let mut gc = GarbageCollector::new();
        gc.mark_table(&globals);
        gc.trace_references();
        interns.remove_white();
        gc.sweep(&mut manager);

        assert_eq!(manager.iter().count(), 2);
    }

    #[test]
    fn gc_stats_record_cycle() {
        let mut gc = GarbageCollector::new();
        assert_eq!(gc.stats().cycles, 0);
        gc.record_cycle(1000, 400, 600, 1200);
        assert_eq!(gc.stats().cycles, 1);
        assert_eq!(gc.stats().last_before_bytes, 1000);
        assert_eq!(gc.stats().last_freed_bytes, 400);
        assert_eq!(gc.stats().last_after_bytes, 600);
        assert_eq!(gc.stats().last_next_trigger_bytes, 1200);
        assert_eq!(gc.stats().total_freed_bytes, 400);
    }
}
