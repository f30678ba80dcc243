//! Building blocks shared by every resource.

pub mod context;
pub mod diag;
pub mod resource;
pub mod schema;
pub mod semantic;
pub mod value;

pub use context::{CancelHandle, OperationContext};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use resource::{ReadOutcome, Resource, Response};
pub use schema::{Attribute, AttributeType, Block, Schema};
pub use semantic::{CaseInsensitiveString, SemanticEquality, SizeString, YamlString};
pub use value::Attr;
