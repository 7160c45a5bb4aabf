//! The module contract: identity, factory references, the discovery surface,
//! and the lifecycle hooks every module may implement.

use std::any::TypeId;
use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::{AppCtx, ConfigCtx, InitCtx};

/// Stable module identity: the concrete module type.
///
/// Referencing the same module type from multiple places addresses the same
/// graph node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    type_id: TypeId,
    name: &'static str,
}

impl ModuleKey {
    pub fn of<M: Module>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: short_type_name::<M>(),
        }
    }

    /// Short type name, for diagnostics and error chains.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Constructor used to instantiate a module the first time its identity is
/// referenced. Factories are explicit; there is no reflective activation.
pub type ModuleFactory = fn() -> anyhow::Result<Box<dyn Module>>;

/// A module identity paired with its constructor: the unit handed to the
/// resolver as a root, a declared dependency, or a nested attachment.
#[derive(Clone, Copy)]
pub struct ModuleRef {
    key: ModuleKey,
    factory: ModuleFactory,
}

impl ModuleRef {
    /// Reference a default-constructible module type.
    pub fn of<M: Module + Default>() -> Self {
        fn construct<M: Module + Default>() -> anyhow::Result<Box<dyn Module>> {
            Ok(Box::new(M::default()))
        }
        Self {
            key: ModuleKey::of::<M>(),
            factory: construct::<M>,
        }
    }

    /// Reference a module type with a fallible constructor. A factory error
    /// surfaces as [`BuildError::ModuleUnavailable`](crate::BuildError) and
    /// aborts resolution.
    pub fn with_factory<M: Module>(factory: ModuleFactory) -> Self {
        Self {
            key: ModuleKey::of::<M>(),
            factory,
        }
    }

    pub fn key(&self) -> ModuleKey {
        self.key
    }

    pub(crate) fn construct(&self) -> anyhow::Result<Box<dyn Module>> {
        (self.factory)()
    }
}

impl PartialEq for ModuleRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ModuleRef {}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleRef").field(&self.key).finish()
    }
}

/// One-shot constructor for a nested module; the configure closure, if any,
/// is already folded in and runs right after construction.
pub(crate) type NestedBuild = Box<dyn FnOnce() -> anyhow::Result<Box<dyn Module>> + Send>;

/// The declaration surface handed to [`Module::declare`].
///
/// Dependency edges and nested modules can only be recorded here, during the
/// module's own discovery step.
#[derive(Default)]
pub struct Discovery {
    deps: Vec<ModuleRef>,
    nested: Vec<(ModuleKey, NestedBuild)>,
}

impl Discovery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a dependency on another module type. Idempotent: declaring the
    /// same identity twice records one edge.
    pub fn depends_on<M: Module + Default>(&mut self) {
        self.depends_on_ref(ModuleRef::of::<M>());
    }

    /// Declare a dependency through an explicit [`ModuleRef`] (custom factory).
    pub fn depends_on_ref(&mut self, dep: ModuleRef) {
        if !self.deps.iter().any(|d| d.key() == dep.key()) {
            self.deps.push(dep);
        }
    }

    /// Attach a nested module: default-constructed and folded into the same
    /// graph as an additional discovery root.
    pub fn attach<M: Module + Default>(&mut self) {
        self.attach_with::<M>(|_| {});
    }

    /// Attach a nested module and mutate the fresh instance immediately after
    /// construction, before its own `declare` step runs.
    pub fn attach_with<M: Module + Default>(
        &mut self,
        configure: impl FnOnce(&mut M) + Send + 'static,
    ) {
        let build: NestedBuild = Box::new(move || {
            let mut module = M::default();
            configure(&mut module);
            Ok(Box::new(module) as Box<dyn Module>)
        });
        self.nested.push((ModuleKey::of::<M>(), build));
    }

    pub(crate) fn into_parts(self) -> (Vec<ModuleRef>, Vec<(ModuleKey, NestedBuild)>) {
        (self.deps, self.nested)
    }
}

impl fmt::Debug for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nested: Vec<ModuleKey> = self.nested.iter().map(|(key, _)| *key).collect();
        f.debug_struct("Discovery")
            .field("deps", &self.deps)
            .field("nested", &nested)
            .finish()
    }
}

/// A unit of composition.
///
/// `declare` runs exactly once, when the module is first discovered. The
/// phase hooks are all optional; the default bodies are no-ops. Hooks are
/// invoked sequentially in build order, never concurrently, and each receives
/// the build-wide cancellation token (cooperative: long-running hooks should
/// check it).
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Declare dependencies and attach nested modules.
    fn declare(&mut self, _scope: &mut Discovery) {}

    async fn pre_configure(
        &self,
        _ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn configure(
        &self,
        _ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_configure(
        &self,
        _ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_initialize(
        &self,
        _ctx: &InitCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn initialize(
        &self,
        _ctx: &InitCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_initialize(
        &self,
        _ctx: &InitCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_application(
        &self,
        _ctx: &AppCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn application(
        &self,
        _ctx: &AppCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_application(
        &self,
        _ctx: &AppCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs in reverse build order once shutdown begins; failures are logged,
    /// not propagated.
    async fn shutdown(&self, _ctx: &AppCtx<'_>, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}
