//! User callbacks and their dispatch.
//!
//! A [`CallbackTarget`] is a named object carrying a table of callback
//! methods. Each method name may be registered under several
//! [`Signature`]s; dispatch picks the first one in [`Signature::ORDER`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use depwatch::callback::{invoke_callback, CallbackTarget};
//! use depwatch::provider::{Attributes, Provider, ProviderId, ProviderState};
//!
//! let target = Arc::new(
//!     CallbackTarget::new("logger").on_provider("bind", |p| {
//!         println!("bound {}", p);
//!         Ok(())
//!     }),
//! );
//! let provider = Provider::new(ProviderId(1), ProviderState::Active, Attributes::new());
//! let errors = invoke_callback(&[target], "bind", &provider);
//! assert!(errors.is_empty());
//! ```
//!
//! # Modules
//!
//! - [`dispatcher`] - Signature search across targets

pub mod dispatcher;

pub use dispatcher::invoke_callback;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::provider::Provider;

/// Callback taking the provider snapshot.
pub type ProviderFn = Arc<dyn Fn(&Provider) -> anyhow::Result<()> + Send + Sync>;

/// Callback taking the provider as an untyped value.
pub type AnyFn = Arc<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;

/// Callback taking no arguments.
pub type NoArgsFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Parameter shape of a callback method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    /// One parameter of the provider type.
    Provider,
    /// One untyped parameter.
    Any,
    /// No parameters.
    NoArgs,
}

impl Signature {
    /// Priority in which signatures are tried.
    pub const ORDER: [Signature; 3] = [Signature::Provider, Signature::Any, Signature::NoArgs];
}

/// A registered callback method.
#[derive(Clone)]
pub enum Method {
    WithProvider(ProviderFn),
    WithAny(AnyFn),
    NoArgs(NoArgsFn),
}

impl Method {
    /// Parameter shape of this method.
    pub fn signature(&self) -> Signature {
        match self {
            Method::WithProvider(_) => Signature::Provider,
            Method::WithAny(_) => Signature::Any,
            Method::NoArgs(_) => Signature::NoArgs,
        }
    }

    /// Call the method with the given provider.
    pub fn call(&self, provider: &Provider) -> anyhow::Result<()> {
        match self {
            Method::WithProvider(f) => f(provider),
            Method::WithAny(f) => f(provider as &dyn Any),
            Method::NoArgs(f) => f(),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:?})", self.signature())
    }
}

/// Object onto which callbacks are dispatched.
#[derive(Debug, Clone)]
pub struct CallbackTarget {
    name: String,
    methods: HashMap<String, Vec<Method>>,
}

impl CallbackTarget {
    /// Create a target with no methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register `method` taking the provider.
    pub fn on_provider(
        self,
        method: impl Into<String>,
        f: impl Fn(&Provider) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.with_method(method, Method::WithProvider(Arc::new(f)))
    }

    /// Register `method` taking an untyped value.
    pub fn on_any(
        self,
        method: impl Into<String>,
        f: impl Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.with_method(method, Method::WithAny(Arc::new(f)))
    }

    /// Register `method` taking no arguments.
    pub fn on_call(
        self,
        method: impl Into<String>,
        f: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.with_method(method, Method::NoArgs(Arc::new(f)))
    }

    /// Register a method, replacing one with the same name and signature.
    pub fn with_method(mut self, method: impl Into<String>, callback: Method) -> Self {
        let overloads = self.methods.entry(method.into()).or_default();
        overloads.retain(|m| m.signature() != callback.signature());
        overloads.push(callback);
        self
    }

    /// Target name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any overload of `method` exists.
    pub fn declares(&self, method: &str) -> bool {
        self.methods.get(method).is_some_and(|m| !m.is_empty())
    }

    /// Find the overload of `method` with exactly `signature`.
    pub fn resolve(&self, method: &str, signature: Signature) -> Option<&Method> {
        self.methods
            .get(method)?
            .iter()
            .find(|m| m.signature() == signature)
    }
}
