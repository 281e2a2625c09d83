//! Generation of visitor delegation chains.
//!
//! For every non-void node type the generated visitor declares one
//! overridable handler whose default behavior is to invoke the handler
//! of the type's direct supertype, with the node upcast to that type.
//! A caller overriding only the root handler therefore receives every
//! node; overriding a mid-hierarchy handler receives exactly that type
//! and its unoverridden descendants.
//!
//! The chain itself is data ([VisitorSpec]): the out-of-scope template
//! layer can realize it as generated default-implementation methods,
//! or at run time through a [DelegateTable].

use hashbrown::HashMap;

use crate::errors::HierarchyError;
use crate::hierarchy::NodeHierarchy;

/// The handler signature family of a requested visitor.
///
/// The chain is the same for every shape; the shape is carried through
/// to the template layer, which decides what the handlers look like.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub enum VisitorShape {
    /// Handlers return nothing
    Unit,
    /// Handlers return a value
    Value,
    /// Handlers take a context argument and return a value
    Parameterized,
}

/// One overridable handler of a generated visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub struct VisitorMethodSpec {
    /// The node type this handler accepts
    pub node: String,
    /// The handler the default implementation delegates to: the
    /// nearest ancestor type whose handler may be independently
    /// overridden. Either another entry of the same spec, or the
    /// root handler.
    pub delegate: String,
}

/// The complete default-dispatch specification of one visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde_derive::Serialize, serde_derive::Deserialize))]
pub struct VisitorSpec {
    pub shape: VisitorShape,
    /// The terminus of every delegate chain. The root handler has no
    /// delegate and is not listed in `methods`.
    pub root: String,
    /// One entry per non-void node type, in topological order
    /// (every type after its supertype)
    pub methods: Vec<VisitorMethodSpec>,
}

/// Generate the delegation-chain spec for one visitor shape.
///
/// The sequence is complete (one entry per non-void type) and every
/// delegate target is resolvable within the same sequence or is the
/// root. Acyclicity is guaranteed by resolution but re-checked here:
/// this output directly determines emitted dispatch code, and a cycle
/// that slipped through would produce code that loops forever at run
/// time instead of failing at generation time.
pub fn generate_visitors(
    hierarchy: &NodeHierarchy,
    shape: VisitorShape,
) -> Result<VisitorSpec, HierarchyError> {
    let mut methods = Vec::with_capacity(hierarchy.len());
    for (desc, supertype) in hierarchy.topo_with_supertypes() {
        methods.push(VisitorMethodSpec {
            node: desc.name.clone(),
            delegate: supertype.to_owned(),
        });
    }
    check_chains_reach_root(hierarchy.root_name(), &methods)?;
    log::debug!(
        "generated {:?} visitor spec: {} handlers delegating towards `{}`",
        shape,
        methods.len(),
        hierarchy.root_name()
    );
    Ok(VisitorSpec {
        shape,
        root: hierarchy.root_name().to_owned(),
        methods,
    })
}

/// Defensive re-assertion of the resolver's acyclicity invariant:
/// from every entry, following delegates must reach the root in at
/// most `methods.len()` steps.
fn check_chains_reach_root(
    root: &str,
    methods: &[VisitorMethodSpec],
) -> Result<(), HierarchyError> {
    let delegates: HashMap<&str, &str> = methods
        .iter()
        .map(|m| (&*m.node, &*m.delegate))
        .collect();
    for method in methods {
        let mut current: &str = &method.node;
        let mut path = vec![current.to_owned()];
        while current != root {
            if path.len() > methods.len() + 1 {
                return Err(HierarchyError::CyclicHierarchy { path });
            }
            current = match delegates.get(current) {
                Some(&next) => next,
                None => {
                    return Err(HierarchyError::UnknownSupertype {
                        name: method.node.clone(),
                        supertype: current.to_owned(),
                        origin: None,
                    })
                }
            };
            path.push(current.to_owned());
        }
    }
    Ok(())
}

/// The runtime-lookup realization of a [VisitorSpec]: answers which
/// handler actually receives a node, given which handlers a concrete
/// visitor overrides.
#[derive(Debug, Clone)]
pub struct DelegateTable {
    root: String,
    delegates: HashMap<String, String>,
}

impl DelegateTable {
    pub fn new(spec: &VisitorSpec) -> DelegateTable {
        DelegateTable {
            root: spec.root.clone(),
            delegates: spec
                .methods
                .iter()
                .map(|m| (m.node.clone(), m.delegate.clone()))
                .collect(),
        }
    }

    /// The handler a node type's default implementation delegates to.
    /// `None` for the root handler and for unknown names.
    pub fn delegate_of(&self, node: &str) -> Option<&str> {
        self.delegates.get(node).map(|s| &**s)
    }

    /// Walk the delegate chain from `node` until a handler satisfying
    /// `overridden` is found. The root handler is the catch-all: it is
    /// always considered overridden. Returns `None` when `node` is not
    /// part of the spec.
    pub fn dispatch(&self, node: &str, mut overridden: impl FnMut(&str) -> bool) -> Option<&str> {
        if node == self.root {
            return Some(&self.root);
        }
        // Re-borrow the owned key so the result outlives the walk
        let (mut current, _) = self.delegates.get_key_value(node)?;
        for _ in 0..=self.delegates.len() {
            if overridden(current.as_str()) {
                return Some(current.as_str());
            }
            let next = self.delegates.get(current.as_str())?;
            if *next == self.root {
                return Some(&self.root);
            }
            current = match self.delegates.get_key_value(next.as_str()) {
                Some((key, _)) => key,
                // Dangling target: the root catch-all takes it
                None => return Some(&self.root),
            };
        }
        // Unreachable with a validated spec
        None
    }
}
