// Reactor planning: descriptor discovery, workspace indexing, build-behavior
// policies and the project graph builder.

pub mod graph; // ProjectGraph, ProjectNode, GraphBuilder
pub mod index; // WorkspaceIndex, selectors
pub mod loader; // aggregation-tree walk
pub mod policy; // build-behavior modes
pub mod resolve; // external resolver adapters and the model cache
pub mod session; // ReactorSession and the assemble entry point

pub use graph::{ProjectGraph, ProjectNode, Variant};
pub use graph::builder::{GraphBuilder, LifecycleBindingsInjector};
pub use index::{Selector, WorkspaceIndex};
pub use loader::DescriptorLoader;
pub use policy::{BehaviorPolicy, BuildPolicy, MakeBehavior};
pub use resolve::{ExternalResolver, FileRepositoryResolver, OfflineResolver, ResolveError};
pub use session::{ReactorSession, assemble, assemble_with, default_system_properties};

// The result carrier travels with every reactor API.
pub use kiln_model::{Outcome, Problem, Severity};
