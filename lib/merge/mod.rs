//! The join of two shape graphs.
//!
//! `join` walks both graphs in lockstep from their roots (globals, then the
//! stack frames) and builds a merged graph that over-approximates both.
//! Values the merge table cannot prove equal become abstract values, recorded
//! in a `GuardedAbstraction` together with the branch conditions under which
//! each concrete value holds.
//!
//! A join may be undefined, for instance when the two stacks belong to
//! different call chains. `join` then returns `Ok(None)`, and the caller
//! keeps both states apart. `Err` is reserved for malformed input.

/// Unwrap the `Some` of a `JoinResult`, or return `Ok(None)` from the
/// enclosing function.
macro_rules! try_join {
    ($e:expr) => {
        match $e? {
            Some(value) => value,
            None => return Ok(None),
        }
    };
}

pub mod abstraction;
mod conciliate;
mod context;
mod mapping;
mod object_join;
mod options;
mod pending_join;
mod shape_graph_join;
mod table;
mod target_join;
mod value_join;

pub use self::mapping::NodeMapping;
pub use self::options::{JoinOptions, JoinOptionsBuilder};
pub use self::shape_graph_join::{join, ShapeGraphJoin};
pub use self::table::{EquivalenceMergeTable, MergeTable};
