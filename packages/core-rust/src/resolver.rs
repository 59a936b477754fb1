//! Type-keyed provider table with per-type memoization and scoped visibility.
//!
//! Each [`Resolver`] maps a `TypeId` to either a ready instance or a
//! constructor with a declared dependency list. Instances are built at most
//! once per binding. A child resolver sees its parent's bindings; a parent
//! never sees its children's.
//!
//! [`Resolver::construct_all`] builds every binding of a scope in a
//! deterministic order: declared dependencies first, then registration order.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::error::RegistrationError;

type Instance = Arc<dyn Any + Send + Sync>;
type Constructor = Box<dyn Fn(&Resolver) -> anyhow::Result<Instance> + Send + Sync>;

// ---------------------------------------------------------------------------
// Dependency / Provide
// ---------------------------------------------------------------------------

/// A declared dependency on the binding for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    type_id: TypeId,
    type_name: &'static str,
}

impl Dependency {
    /// Declares a dependency on the binding for `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// A component that the resolver knows how to construct.
///
/// `dependencies` lists the bindings `provide` resolves; the resolver builds
/// them first so construction order follows the dependency graph.
/// `provide` must not resolve bindings it does not declare.
/// A component that takes part in the lifecycle enrolls itself from
/// `provide`, typically with
/// `resolver.resolve::<Context>()?.add_lifecycle(instance.clone())?`.
/// If `provide` fails after enrolling, the enrollment is withdrawn.
pub trait Provide: Send + Sync + Sized + 'static {
    /// Bindings this component needs. Defaults to none.
    #[must_use]
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Builds the component from already-resolvable dependencies.
    ///
    /// # Errors
    ///
    /// Any error aborts composition with [`RegistrationError::Constructor`].
    fn provide(resolver: &Resolver) -> anyhow::Result<Arc<Self>>;
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

enum Slot {
    Pending,
    Building,
    Ready(Instance),
}

struct Binding {
    type_name: &'static str,
    dependencies: Vec<Dependency>,
    constructor: Option<Constructor>,
    slot: Mutex<Slot>,
}

impl Binding {
    /// Returns the memoized instance, constructing it through `owner` (the
    /// scope the binding was registered in) on first use.
    fn instance(&self, owner: &Resolver) -> Result<Instance, RegistrationError> {
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Ready(instance) => return Ok(Arc::clone(instance)),
                Slot::Building => {
                    return Err(RegistrationError::Cycle {
                        type_name: self.type_name,
                    })
                }
                Slot::Pending => {}
            }
            *slot = Slot::Building;
        }

        // The slot lock is released here: constructors resolve recursively.
        let built = self.build(owner);

        let mut slot = self.slot.lock();
        match built {
            Ok(instance) => {
                *slot = Slot::Ready(Arc::clone(&instance));
                Ok(instance)
            }
            Err(e) => {
                *slot = Slot::Pending;
                Err(e)
            }
        }
    }

    fn build(&self, owner: &Resolver) -> Result<Instance, RegistrationError> {
        for dependency in &self.dependencies {
            owner.resolve_dependency(*dependency, Some(self.type_name))?;
        }
        let Some(constructor) = &self.constructor else {
            return Err(RegistrationError::Missing {
                type_name: self.type_name,
                required_by: None,
            });
        };
        tracing::trace!(type_name = self.type_name, "constructing");
        // Dependencies are built, so anything enrolled past `mark` belongs
        // to this constructor.
        let ctx = owner.resolve::<Context>().ok();
        let mark = ctx.as_ref().map_or(0, |ctx| ctx.len());
        constructor(owner).map_err(|source| {
            if let Some(ctx) = &ctx {
                ctx.withdraw_from(mark);
            }
            RegistrationError::Constructor {
                type_name: self.type_name,
                source,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Scoped, type-keyed provider table.
///
/// Composition is single-threaded by contract: resolving a type from two
/// threads while it is under construction reports a cycle.
pub struct Resolver {
    parent: Option<Arc<Resolver>>,
    bindings: DashMap<TypeId, Arc<Binding>>,
    /// Registration order for deterministic construction.
    order: RwLock<Vec<TypeId>>,
}

impl Resolver {
    /// Creates a root resolver with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: None,
            bindings: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Creates a resolver scoped beneath `parent`.
    #[must_use]
    pub fn child(parent: &Arc<Resolver>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            ..Self::new()
        }
    }

    /// Returns the parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Resolver>> {
        self.parent.as_ref()
    }

    /// Registers the provider for `T` in this scope.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if this scope already binds
    /// `T` and [`RegistrationError::SelfDependency`] if `T` lists itself as a
    /// dependency.
    pub fn provide<T: Provide>(&self) -> Result<(), RegistrationError> {
        let dependency = Dependency::of::<T>();
        let dependencies = T::dependencies();
        if dependencies.contains(&dependency) {
            return Err(RegistrationError::SelfDependency {
                type_name: dependency.type_name,
            });
        }
        self.insert(
            dependency,
            Binding {
                type_name: dependency.type_name,
                dependencies,
                constructor: Some(Box::new(|resolver: &Resolver| {
                    let instance: Instance = T::provide(resolver)?;
                    Ok(instance)
                })),
                slot: Mutex::new(Slot::Pending),
            },
        )
    }

    /// Binds a ready-made instance of `T` in this scope.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if this scope already binds `T`.
    pub fn provide_value<T: Send + Sync + 'static>(
        &self,
        value: Arc<T>,
    ) -> Result<(), RegistrationError> {
        let dependency = Dependency::of::<T>();
        let instance: Instance = value;
        self.insert(
            dependency,
            Binding {
                type_name: dependency.type_name,
                dependencies: Vec::new(),
                constructor: None,
                slot: Mutex::new(Slot::Ready(instance)),
            },
        )
    }

    fn insert(&self, dependency: Dependency, binding: Binding) -> Result<(), RegistrationError> {
        match self.bindings.entry(dependency.type_id) {
            Entry::Occupied(_) => Err(RegistrationError::Duplicate {
                type_name: dependency.type_name,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(binding));
                self.order.write().push(dependency.type_id);
                Ok(())
            }
        }
    }

    /// Resolves the binding for `T` visible from this scope, constructing it
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Missing`] if no visible scope binds `T`,
    /// [`RegistrationError::Cycle`] on re-entrant construction, or the
    /// constructor's failure.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistrationError> {
        let dependency = Dependency::of::<T>();
        self.resolve_dependency(dependency, None)?
            .downcast::<T>()
            .map_err(|_| RegistrationError::Missing {
                type_name: dependency.type_name,
                required_by: None,
            })
    }

    fn resolve_dependency(
        &self,
        dependency: Dependency,
        required_by: Option<&'static str>,
    ) -> Result<Instance, RegistrationError> {
        let mut scope = Some(self);
        while let Some(resolver) = scope {
            let binding = resolver
                .bindings
                .get(&dependency.type_id)
                .map(|entry| Arc::clone(entry.value()));
            if let Some(binding) = binding {
                return binding.instance(resolver);
            }
            scope = resolver.parent.as_deref();
        }
        Err(RegistrationError::Missing {
            type_name: dependency.type_name,
            required_by,
        })
    }

    /// Returns `true` if `T` is bound in this scope or an ancestor.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        let mut scope = Some(self);
        while let Some(resolver) = scope {
            if resolver.bindings.contains_key(&type_id) {
                return true;
            }
            scope = resolver.parent.as_deref();
        }
        false
    }

    /// Constructs every binding registered in this scope.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`] encountered; bindings built
    /// before the failure stay memoized.
    pub fn construct_all(&self) -> Result<(), RegistrationError> {
        let order = self.order.read().clone();
        for type_id in &order {
            let binding = self
                .bindings
                .get(type_id)
                .map(|entry| Arc::clone(entry.value()));
            if let Some(binding) = binding {
                binding.instance(self)?;
            }
        }
        Ok(())
    }

    /// Returns the number of bindings registered in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if this scope has no bindings of its own.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
