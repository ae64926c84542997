//! Shapejoin: the join of heap shape graphs for abstract interpretation of C
//! programs.
//!
//! A shape graph (`shape::ShapeGraph`) abstracts the heap of one program
//! state: memory objects, symbolic values, the edges between them, and the
//! scalar facts known about those values. When two abstract states reach the
//! same program point, `merge::join` combines their shape graphs into one
//! graph that over-approximates both.
//!
//! ```
//! use shapejoin::merge::{self, EquivalenceMergeTable, JoinOptions};
//! use shapejoin::shape::{IdAllocator, ShapeGraph};
//! use shapejoin::types::MachineModel;
//!
//! let mut ids = IdAllocator::new();
//! let graph = ShapeGraph::new(MachineModel::linux64());
//! let mut table = EquivalenceMergeTable::new(&graph, &graph);
//!
//! let merged = merge::join(&graph, &graph, &mut table, &mut ids, &JoinOptions::default())
//!     .unwrap()
//!     .expect("identical graphs always join");
//! assert_eq!(merged.objects().count(), graph.objects().count());
//! ```

pub mod merge;
pub mod shape;
#[cfg(test)]
mod tests;
pub mod types;

mod error;
pub use error::Error;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;
