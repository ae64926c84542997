//! The shape graph: an abstraction of the heap of one program state.
//!
//! A shape graph holds memory objects (globals, stack variables and heap
//! allocations), the symbolic values stored in their fields (has-value
//! edges), and the addresses those values denote (point-to edges). Scalar
//! facts about the values are kept alongside: equalities, inequalities, path
//! constraints, explicit integer values and symbolic object sizes.

mod constraints;
mod edge;
mod expression;
mod graph;
mod object;
mod relation;
mod stack_frame;
mod value;

pub use self::constraints::*;
pub use self::edge::*;
pub use self::expression::*;
pub use self::graph::*;
pub use self::object::*;
pub use self::relation::*;
pub use self::stack_frame::*;
pub use self::value::*;
