//! # Rows
//!
//! The in-memory data model shared by the SSTable codec and the expiration
//! remover.
//!
//! A partition on disk is a key, a partition-level deletion and an ordered
//! stream of [`Unfiltered`] entries. Each entry is either a [`Row`] or a
//! [`RangeTombstoneMarker`]. Rows own column data made of [`Cell`]s; complex
//! (multi-cell collection) columns own several cells addressed by a path.
//!
//! ## Key properties
//! - **Value types**: every type here is a plain owned value. Nothing is shared
//!   or mutated behind a reference, so a partition can be moved from the
//!   scanner to the transform to the writer without copies.
//! - **Deletion fidelity**: [`DeletionTime`] and cell tombstones keep both the
//!   deletion timestamp (microseconds) and the local deletion time (seconds)
//!   exactly as read.
//! - **Expiration is optional metadata**: a live cell either carries an
//!   [`Expiration`] or it does not; stripping it never touches value or
//!   timestamp.
//!
//! ## Example
//! ```rust
//! use rows::{Cell, Clustering, Expiration, LivenessInfo, Row};
//!
//! let cell = Cell::expiring("v", 10, b"\x00\x00\x00\x07".to_vec(), Expiration::new(10, 1_533_270_615));
//! let mut row = Row::new(Clustering::regular(vec![b"a".to_vec()]));
//! row.liveness = LivenessInfo::live(10);
//! row.push_cell(cell);
//!
//! assert!(row.cells().all(|c| c.is_expiring()));
//! ```

mod cell;
mod clustering;
mod deletion;
mod marker;
mod partition;
mod row;

pub use cell::{Cell, CellState, ColumnData, ColumnName, ComplexColumn};
pub use clustering::{BoundKind, Clustering, ClusteringBound};
pub use deletion::{DeletionTime, Expiration, LivenessInfo, NO_EXPIRATION_TIME, NO_TIMESTAMP};
pub use marker::{RangeTombstone, RangeTombstoneMarker};
pub use partition::{PartitionUpdate, Unfiltered};
pub use row::Row;
