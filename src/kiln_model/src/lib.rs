// Descriptor model and the pure per-descriptor pipeline stages.

pub mod bootstrap; // built-in super-descriptor
pub mod descriptor; // Coordinate, Descriptor, Dependency, Plugin, Profile
pub mod inherit; // inheritance assembler
pub mod interpolate; // ${...} expansion
pub mod management; // dependency-management / default-value injection
pub mod outcome; // Outcome<T>, Problem, Severity
pub mod profiles; // activation predicates and overlay injection
pub mod reader; // XML descriptor reader + locator
pub mod validate; // raw/effective validation levels

pub use bootstrap::{BuiltinSuperProvider, SuperDescriptorProvider};
pub use descriptor::{
    Activation, Coordinate, Dependency, Descriptor, ParentRef, Plugin, Profile, ProfileOverlay,
    Repository,
};
pub use outcome::{Outcome, Problem, Severity};
pub use reader::{
    DESCRIPTOR_FILE, DefaultLocator, DescriptorLocator, DescriptorParser, DescriptorSource,
    XmlDescriptorReader,
};
pub use validate::ValidationLevel;
