//! A framework for generating AST support code from annotated grammars.
//!
//! Grammar productions are decorated with node descriptors ([NodeTypeDescriptor]),
//! which this crate turns into three coupled artifacts:
//! 1. A validated node-type hierarchy ([NodeHierarchy]): names, supertype
//!    edges and a single synthetic root.
//! 2. A runtime protocol for assembling parse trees as a recursive-descent
//!    parser executes ([TreeBuilder]).
//! 3. Visitor delegation-chain specifications ([VisitorSpec]), letting client
//!    code traverse the resulting trees without declaring a handler for
//!    every node kind.
//!
//! Parsing the grammar file itself and rendering generated code to source
//! text are external collaborators; this crate only decides *what* must
//! exist (node types, dispatch order, stack operations).
pub mod builder;
pub mod errors;
pub mod hierarchy;
pub mod visitor;

pub use self::builder::{DefaultHook, NodeManipulationHook, StackUsageError, TreeBuilder, TreeNode};
pub use self::errors::{HierarchyError, HierarchyErrors};
pub use self::hierarchy::{NodeHierarchy, NodeTypeDescriptor, Origin, Span};
pub use self::visitor::{DelegateTable, VisitorMethodSpec, VisitorShape, VisitorSpec};

/// Everything generated for one grammar: the resolved hierarchy
/// plus one visitor spec per requested shape.
///
/// The tree builder is not part of the plan: it is a fixed runtime
/// paired with generated parsers, not derived from a specific grammar.
#[derive(Debug)]
pub struct GenerationPlan {
    pub hierarchy: NodeHierarchy,
    pub visitors: Vec<VisitorSpec>,
}

/// Resolve the node hierarchy of a grammar and generate visitor
/// specs for each requested shape.
pub fn generate(
    descriptors: Vec<NodeTypeDescriptor>,
    root_name: &str,
    shapes: &[VisitorShape],
) -> Result<GenerationPlan, HierarchyErrors> {
    let hierarchy = hierarchy::resolve(descriptors, root_name)?;
    let mut visitors = Vec::with_capacity(shapes.len());
    for &shape in shapes {
        visitors.push(visitor::generate_visitors(&hierarchy, shape)?);
    }
    Ok(GenerationPlan { hierarchy, visitors })
}
