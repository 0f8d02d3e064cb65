//! # solder-runtime
//!
//! A contexts-and-dependency-injection container runtime: programmatically
//! registered beans, typesafe resolution with qualifiers and alternatives,
//! client proxies for normal scopes, and per-scope lifecycle management
//! with cascading destruction of dependent objects.
//!
//! ## Quick start
//!
//! ```
//! use solder_runtime::{Bean, Container};
//!
//! struct Config { url: String }
//! struct Client { config: std::sync::Arc<Config> }
//!
//! # fn main() -> solder_runtime::Result<()> {
//! let container = Container::builder()
//!     .bean(
//!         Bean::builder(|_| Ok(Config { url: "localhost".into() }))
//!             .singleton()
//!             .build(),
//!     )
//!     .bean(
//!         Bean::builder(|creator| Ok(Client { config: creator.get::<Config>()? }))
//!             .build(),
//!     )
//!     .build()?;
//!
//! let client = container.instance::<Client>()?;
//! assert_eq!(client.get()?.config.url, "localhost");
//! container.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! The container handle is cheap to clone and is threaded explicitly
//! through proxies, creators, and handles; there is no global singleton.

pub mod bean;
pub mod container;
pub mod context;
pub mod creational;
pub mod error;
pub mod events;
pub mod handle;
pub mod proxy;
pub mod qualifier;
pub mod scope;

mod resolution;

pub use bean::{Bean, BeanBuilder, BeanId, BeanKind, Contextual, InstancePtr};
pub use container::{Container, ContainerBuilder, ContainerConfig, Creator, Selection};
pub use context::{
    ContextState, DependentContext, InjectableContext, ManagedContext, RequestContext,
    SharedContext,
};
pub use creational::CreationalContext;
pub use error::{Error, Result};
pub use events::{Observer, ScopeBeforeDestroyed, ScopeDestroyed, ScopeInitialized};
pub use handle::{ContextInstanceHandle, InstanceHandle, ReferenceKind};
pub use proxy::ClientProxy;
pub use qualifier::{Qualifier, Qualifiers};
pub use scope::Scope;
