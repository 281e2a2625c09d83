//! The tree-construction runtime driven by generated parser code.
//!
//! A [TreeBuilder] keeps completed-but-unattached nodes on a pending
//! stack and links them together when a node scope closes. It is
//! generic over the node representation: all interaction with concrete
//! nodes goes through an injected [NodeManipulationHook], so node types
//! with no common interface (or living in different crates) can be
//! driven by the same runtime.
//!
//! The builder is strictly single-threaded and is meant to be driven
//! synchronously by one recursive-descent parse: one builder per parse
//! invocation, discarded when the parse ends. Scopes nest in exact
//! LIFO order with the parser's recursive calls.

use thiserror::Error;

/// The capability a [TreeBuilder] needs from its environment to
/// cooperate with a concrete node representation.
pub trait NodeManipulationHook<N> {
    /// Called when a node's scope begins. The node has no children yet
    /// and no parent.
    fn on_open(&mut self, node: &mut N);
    /// Called immediately before a completed node is placed on the
    /// pending stack. The node has all its children, but no parent yet.
    fn on_push(&mut self, node: &mut N);
    /// Called once per child being attached, last child first, `index`
    /// counting down to zero. The countdown lets an implementation
    /// assign children into a fixed-size slot array without a separate
    /// reversal step.
    fn add_child(&mut self, parent: &mut N, child: N, index: usize);
}

/// Node lifecycle used by [DefaultHook]: nodes that know how to adopt
/// their own children.
pub trait TreeNode: Sized {
    /// The node's scope was just opened
    fn open(&mut self) {}
    /// The node received all its children and is about to be pushed
    fn close(&mut self) {}
    /// Adopt a child. Children arrive last first, `index` counting
    /// down to zero.
    fn attach_child(&mut self, child: Self, index: usize);
}

/// The default hook: delegates straight to the node's own [TreeNode]
/// lifecycle operations.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultHook;

impl<N: TreeNode> NodeManipulationHook<N> for DefaultHook {
    #[inline]
    fn on_open(&mut self, node: &mut N) {
        node.open();
    }
    #[inline]
    fn on_push(&mut self, node: &mut N) {
        node.close();
    }
    #[inline]
    fn add_child(&mut self, parent: &mut N, child: N, index: usize) {
        parent.attach_child(child, index);
    }
}

/// A stack-balance violation in the builder protocol.
///
/// These indicate a bug in the *generated* code driving the builder,
/// never in the grammar input: a caller receiving one must abort the
/// parse run. The builder's state is unspecified afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StackUsageError {
    /// A close or abandon arrived without a matching open
    #[error("node scope closed without a matching open")]
    UnbalancedClose,
    /// A close or pop asked for more nodes than the pending stack holds
    #[error("pending stack underflow: needed {needed} nodes, only {available} available")]
    PendingUnderflow { needed: usize, available: usize },
    /// The root was taken while scopes are still open
    #[error("root node taken while {open_scopes} scopes are still open")]
    RootWhileOpen { open_scopes: usize },
    /// The root was taken with zero or several pending nodes
    #[error("root node requires exactly one pending node, found {pending}")]
    RootArity { pending: usize },
}

/// Builds one parse tree as the parser runs.
///
/// Generated parser code drives the builder through [open_scope](TreeBuilder::open_scope)
/// and the close operations, in the exact nesting discipline of the
/// productions. On every non-success exit from a production's scope the
/// generated code must call [abandon_scope](TreeBuilder::abandon_scope),
/// which restores a balanced stack no matter how far construction had
/// progressed.
#[derive(educe::Educe)]
#[educe(Debug(bound))]
pub struct TreeBuilder<N, H: NodeManipulationHook<N>> {
    /// Completed nodes not yet attached to a parent
    pending: Vec<N>,
    /// Saved mark positions of the enclosing scopes
    marks: Vec<usize>,
    /// Index into `pending` where the current scope's children start
    mark: usize,
    node_created: bool,
    #[educe(Debug(ignore))]
    hook: H,
}

impl<N, H: NodeManipulationHook<N>> TreeBuilder<N, H> {
    pub fn new(hook: H) -> Self {
        TreeBuilder {
            pending: Vec::with_capacity(16),
            marks: Vec::with_capacity(8),
            mark: 0,
            node_created: false,
            hook,
        }
    }

    /// Number of nodes collected in the current open scope
    #[inline]
    pub fn arity(&self) -> usize {
        self.pending.len() - self.mark
    }

    /// Whether the most recently closed scope actually pushed its node.
    ///
    /// Reports `false` after a conditional close whose condition failed,
    /// and is reset whenever a new scope opens.
    #[inline]
    pub fn node_created(&self) -> bool {
        self.node_created
    }

    /// Begin a new child-collection scope for `node`.
    ///
    /// The hook's `on_open` runs before any children of the node are
    /// parsed. The caller keeps ownership of the node until the scope
    /// closes.
    pub fn open_scope(&mut self, node: &mut N) {
        self.marks.push(self.mark);
        self.mark = self.pending.len();
        self.node_created = false;
        self.hook.on_open(node);
    }

    /// Close the current scope around a node with a grammar-determined,
    /// fixed number of children.
    ///
    /// Exactly `child_count` nodes are popped and attached, last child
    /// first. The count may exceed the scope's own arity: children
    /// pushed *before* the scope opened are legal targets (that is how
    /// an infix operand parsed earlier ends up inside its operator
    /// node), but it may never exceed the pending stack's length.
    /// Every enclosing mark the pops reach below is resumed, as with
    /// [pop_node](TreeBuilder::pop_node).
    pub fn close_definite(&mut self, mut node: N, child_count: usize) -> Result<(), StackUsageError> {
        if child_count > self.pending.len() {
            return Err(StackUsageError::PendingUnderflow {
                needed: child_count,
                available: self.pending.len(),
            });
        }
        self.pop_mark()?;
        for index in (0..child_count).rev() {
            let child = self.pop_node()?;
            self.hook.add_child(&mut node, child, index);
        }
        self.hook.on_push(&mut node);
        self.pending.push(node);
        self.node_created = true;
        Ok(())
    }

    /// Close the current scope around a node only if `condition` holds.
    ///
    /// When the condition holds this is exactly [close_definite](TreeBuilder::close_definite)
    /// with the scope's current arity. When it fails the node is elided:
    /// the already-pending nodes are left untouched and become children
    /// of whatever scope is active after this one closes, and the
    /// unconsumed node is handed back to the caller.
    pub fn close_conditional(
        &mut self,
        node: N,
        condition: bool,
    ) -> Result<Option<N>, StackUsageError> {
        if condition {
            // Arity must be read before the mark stack is popped
            let arity = self.arity();
            self.close_definite(node, arity)?;
            Ok(None)
        } else {
            self.pop_mark()?;
            self.node_created = false;
            Ok(Some(node))
        }
    }

    /// Abandon the current scope after a parse failure inside it.
    ///
    /// Nodes pending in the scope are discarded, and the stack returns
    /// to the exact state it had before the matching
    /// [open_scope](TreeBuilder::open_scope). Generated code must invoke
    /// this on every exit path that is not a successful close, before
    /// propagating the failure.
    pub fn abandon_scope(&mut self) -> Result<(), StackUsageError> {
        self.pending.truncate(self.mark);
        self.pop_mark()
    }

    /// Take the root of the fully built tree, consuming the builder.
    ///
    /// Only valid after the outermost scope closed successfully:
    /// anything else is a usage error in the generated code, not a
    /// recoverable condition.
    pub fn into_root(mut self) -> Result<N, StackUsageError> {
        if !self.marks.is_empty() {
            return Err(StackUsageError::RootWhileOpen {
                open_scopes: self.marks.len(),
            });
        }
        if self.pending.len() != 1 {
            return Err(StackUsageError::RootArity {
                pending: self.pending.len(),
            });
        }
        self.pending.pop().ok_or(StackUsageError::RootArity { pending: 0 })
    }

    /// Push an already-completed node onto the pending stack.
    ///
    /// Unlike a close, this runs no hook: the node is taken as-is.
    pub fn push_node(&mut self, node: N) {
        self.pending.push(node);
    }

    /// Pop the topmost pending node.
    ///
    /// Popping past the current mark resumes the enclosing scope's
    /// mark, so manual pops interoperate with the scope protocol.
    pub fn pop_node(&mut self) -> Result<N, StackUsageError> {
        if self.pending.len() <= self.mark {
            self.pop_mark().map_err(|_| StackUsageError::PendingUnderflow {
                needed: 1,
                available: self.pending.len(),
            })?;
        }
        self.pending.pop().ok_or(StackUsageError::PendingUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// The node currently on top of the pending stack
    #[inline]
    pub fn peek_node(&self) -> Option<&N> {
        self.pending.last()
    }

    /// The nth node from the top of the pending stack.
    /// `peek_node_nth(0)` is [peek_node](TreeBuilder::peek_node).
    #[inline]
    pub fn peek_node_nth(&self, n: usize) -> Option<&N> {
        self.pending.len().checked_sub(n + 1).map(|i| &self.pending[i])
    }

    fn pop_mark(&mut self) -> Result<(), StackUsageError> {
        match self.marks.pop() {
            Some(mark) => {
                self.mark = mark;
                Ok(())
            }
            None => Err(StackUsageError::UnbalancedClose),
        }
    }
}

impl<N: TreeNode> Default for TreeBuilder<N, DefaultHook> {
    fn default() -> Self {
        TreeBuilder::new(DefaultHook)
    }
}
