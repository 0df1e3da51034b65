//! depwatch - Dynamic module dependency availability tracking.
//!
//! A [`ModuleDependency`] watches a container of modules that come and go
//! at runtime, decides whether a capability it needs is currently
//! satisfied, and tells its owning consumer when that changes.
//!
//! # Modules
//!
//! - [`callback`] - Callback targets and signature-ordered dispatch
//! - [`cli`] - Command-line interface and argument parsing
//! - [`component`] - Reference consumer owning dependencies
//! - [`config`] - Scenario and dependency configuration
//! - [`container`] - In-memory module container and event source
//! - [`dependency`] - The dependency tracker and consumer contract
//! - [`error`] - Error types and result aliases
//! - [`filter`] - Filter expressions over module headers
//! - [`provider`] - Provider snapshots, lifecycle states and headers
//! - [`replay`] - Scenario replay and tracing
//!
//! # Example
//!
//! ```
//! use depwatch::container::Container;
//! use depwatch::dependency::DependencyInfo;
//! use depwatch::filter::Filter;
//! use depwatch::provider::Attributes;
//! use depwatch::ModuleDependency;
//!
//! let filter = Filter::parse("(Module-SymbolicName=org.example.*)").unwrap();
//! let attrs: Attributes = [("Module-SymbolicName", "org.example.log")].into_iter().collect();
//! assert!(filter.matches(&attrs));
//!
//! let dependency = ModuleDependency::new(Container::new());
//! dependency.set_filter(Some("(Module-SymbolicName=org.example.*)")).unwrap();
//! assert_eq!(dependency.name(), "(Module-SymbolicName=org.example.*)");
//! ```

pub mod callback;
pub mod cli;
pub mod component;
pub mod config;
pub mod container;
pub mod dependency;
pub mod error;
pub mod filter;
pub mod provider;
pub mod replay;

mod sync;

pub use component::Component;
pub use container::Container;
pub use dependency::{Callbacks, DependencyService, ModuleDependency};
pub use error::{CallbackError, DepwatchError, Result};
pub use filter::Filter;
pub use provider::{Provider, ProviderId, ProviderState, StateMask};
