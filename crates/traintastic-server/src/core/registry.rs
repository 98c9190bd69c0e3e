//! Object registry
//!
//! Process-wide table mapping `object_id → object` plus the class factory.
//! The registry is owned by the main loop and never touched from kernel
//! threads; kernels reach objects only through posted tasks.

use std::collections::HashMap;

use traintastic_core::{CoreError, Result};

use crate::core::event_loop::EventLoopHandle;
use crate::core::object::{Object, ObjectRef};
use crate::core::server::Server;

/// Context available to class constructors.
pub struct CreateCtx {
    /// Handle onto the main loop, for objects that own kernels.
    pub events: EventLoopHandle<Server>,
}

/// Constructor registered for a class id. The constructor inserts any eagerly
/// created sub-objects into the registry itself and returns the root of what
/// it built.
pub type Constructor = fn(&mut ObjectRegistry, &CreateCtx, &str) -> ObjectRef;

// ----------------------------------------------------------------------------
// Object Registry
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, ObjectRef>,
    factory: HashMap<&'static str, Constructor>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a class id.
    pub fn register_class(&mut self, class_id: &'static str, constructor: Constructor) {
        let previous = self.factory.insert(class_id, constructor);
        debug_assert!(previous.is_none(), "class {class_id} registered twice");
    }

    /// Create an object of the given class under the given id.
    pub fn create(&mut self, class_id: &str, id: &str, ctx: &CreateCtx) -> Result<ObjectRef> {
        let constructor = *self
            .factory
            .get(class_id)
            .ok_or_else(|| CoreError::UnknownClass {
                class_id: class_id.to_owned(),
            })?;
        let object = constructor(self, ctx, id);
        self.insert(object.clone());
        Ok(object)
    }

    /// Insert an already constructed object under its own id.
    pub fn insert(&mut self, object: ObjectRef) {
        let id = object.borrow().core().id().to_owned();
        let previous = self.objects.insert(id, object);
        debug_assert!(previous.is_none(), "object id inserted twice");
    }

    /// Look up an object by id.
    pub fn get(&self, id: &str) -> Option<ObjectRef> {
        self.objects.get(id).cloned()
    }

    /// Look up an object by id, surfacing the protocol error kind.
    pub fn get_or_err(&self, id: &str) -> Result<ObjectRef> {
        self.get(id).ok_or_else(|| CoreError::UnknownObject {
            object_id: id.to_owned(),
        })
    }

    /// Remove an object from the world tree. Sessions still holding a handle
    /// are revoked by the server before the last reference drops.
    pub fn remove(&mut self, id: &str) -> Option<ObjectRef> {
        self.objects.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Run `f` with exclusive access to the object downcast to `T`.
    pub fn with<T: Object, R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let object = self.get(id)?;
        let mut borrowed = object.borrow_mut();
        let concrete = borrowed.as_any_mut().downcast_mut::<T>()?;
        Some(f(concrete))
    }

    /// Iterate all object ids; order is unspecified.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.objects.keys()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::{new_object_ref, ObjectCore};
    use std::any::Any;

    struct Dummy {
        core: ObjectCore,
    }

    impl Object for Dummy {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ObjectCore {
            &mut self.core
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = ObjectRegistry::new();
        registry.insert(new_object_ref(Dummy {
            core: ObjectCore::new("dummy", "d1"),
        }));
        assert!(registry.contains("d1"));
        assert_eq!(registry.get("d1").unwrap().borrow().core().class_id(), "dummy");
        assert!(registry.get("d2").is_none());
    }

    #[test]
    fn test_unknown_class() {
        let mut registry = ObjectRegistry::new();
        let (_, handle) = crate::core::event_loop::EventLoop::new();
        let ctx = CreateCtx { events: handle };
        assert!(matches!(
            registry.create("nope", "x", &ctx),
            Err(CoreError::UnknownClass { .. })
        ));
    }

    #[test]
    fn test_typed_access() {
        let mut registry = ObjectRegistry::new();
        registry.insert(new_object_ref(Dummy {
            core: ObjectCore::new("dummy", "d1"),
        }));
        let class = registry.with::<Dummy, _>("d1", |d| d.core.class_id());
        assert_eq!(class, Some("dummy"));
    }
}
