#[allow(clippy::module_inception)]
pub mod container;
pub mod activator;
pub mod autowiring;
pub(crate) mod chain;
pub mod debug;
pub mod descriptor;
pub(crate) mod gate;
pub mod lifecycle;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod selector;
pub mod validation;

pub use activator::{Activator, Argument, ObjectFactory};
pub use autowiring::{Arguments, Constructor, Injectable, ParameterInfo, ParameterKind, Upcast};
pub use container::Container;
pub use debug::{ContainerDescription, RegistrationInfo};
pub use descriptor::{Activation, DescriptorId, Instance, ServiceDescriptor, ServiceId};
pub use lifecycle::Disposable;
pub use module::ServiceModule;
pub use registry::ServiceRegistry;
pub use resolver::{ServiceRequest, ServiceResolver, ServiceResolverExt};
pub use scope::{Scope, ScopeHandle, ServiceLifetime};
pub use selector::{select_constructor, ArgumentType, Selection};
pub use validation::DependencyGraph;
