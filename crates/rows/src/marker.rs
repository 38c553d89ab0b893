use crate::clustering::{BoundKind, ClusteringBound};
use crate::deletion::DeletionTime;

/// A range tombstone boundary event as stored in a partition.
///
/// A `Bound` either opens or closes a deleted interval. A `Boundary` closes one
/// interval and opens the next at the same clustering prefix; the open side is
/// inclusive exactly when the close side is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeTombstoneMarker {
    Bound {
        bound: ClusteringBound,
        deletion: DeletionTime,
    },
    Boundary {
        values: Vec<Vec<u8>>,
        close_inclusive: bool,
        close_deletion: DeletionTime,
        open_deletion: DeletionTime,
    },
}

impl RangeTombstoneMarker {
    pub fn bound(bound: ClusteringBound, deletion: DeletionTime) -> Self {
        RangeTombstoneMarker::Bound { bound, deletion }
    }

    pub fn boundary(
        values: Vec<Vec<u8>>,
        close_inclusive: bool,
        close_deletion: DeletionTime,
        open_deletion: DeletionTime,
    ) -> Self {
        RangeTombstoneMarker::Boundary {
            values,
            close_inclusive,
            close_deletion,
            open_deletion,
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, RangeTombstoneMarker::Boundary { .. })
    }

    pub fn is_open(&self) -> bool {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } => bound.is_start(),
            RangeTombstoneMarker::Boundary { .. } => true,
        }
    }

    pub fn is_close(&self) -> bool {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } => !bound.is_start(),
            RangeTombstoneMarker::Boundary { .. } => true,
        }
    }

    pub fn values(&self) -> &[Vec<u8>] {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } => &bound.values,
            RangeTombstoneMarker::Boundary { values, .. } => values,
        }
    }

    /// The bound this marker opens, if it opens anything.
    pub fn open_bound(&self) -> Option<ClusteringBound> {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } if bound.is_start() => Some(bound.clone()),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary {
                values,
                close_inclusive,
                ..
            } => {
                let kind = if *close_inclusive {
                    BoundKind::ExclStart
                } else {
                    BoundKind::InclStart
                };
                Some(ClusteringBound::new(kind, values.clone()))
            }
        }
    }

    /// The bound this marker closes, if it closes anything.
    pub fn close_bound(&self) -> Option<ClusteringBound> {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } if !bound.is_start() => Some(bound.clone()),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary {
                values,
                close_inclusive,
                ..
            } => {
                let kind = if *close_inclusive {
                    BoundKind::InclEnd
                } else {
                    BoundKind::ExclEnd
                };
                Some(ClusteringBound::new(kind, values.clone()))
            }
        }
    }

    pub fn open_deletion(&self) -> Option<DeletionTime> {
        match self {
            RangeTombstoneMarker::Bound { bound, deletion } if bound.is_start() => Some(*deletion),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary { open_deletion, .. } => Some(*open_deletion),
        }
    }

    pub fn close_deletion(&self) -> Option<DeletionTime> {
        match self {
            RangeTombstoneMarker::Bound { bound, deletion } if !bound.is_start() => Some(*deletion),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary { close_deletion, .. } => Some(*close_deletion),
        }
    }

    /// Sort position of the marker. For a boundary the close and open sides
    /// share the same position, the close bound is returned.
    pub fn position(&self) -> ClusteringBound {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } => bound.clone(),
            RangeTombstoneMarker::Boundary {
                values,
                close_inclusive,
                ..
            } => {
                let kind = if *close_inclusive {
                    BoundKind::InclEnd
                } else {
                    BoundKind::ExclEnd
                };
                ClusteringBound::new(kind, values.clone())
            }
        }
    }
}

/// A deletion covering the clustering interval `[start, end]` (each side
/// inclusive or exclusive according to its [`BoundKind`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstone {
    pub start: ClusteringBound,
    pub end: ClusteringBound,
    pub deletion: DeletionTime,
}

impl RangeTombstone {
    pub fn new(start: ClusteringBound, end: ClusteringBound, deletion: DeletionTime) -> Self {
        Self {
            start,
            end,
            deletion,
        }
    }
}
