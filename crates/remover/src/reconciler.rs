//! Pairs range tombstone markers back into whole range tombstones.

use rows::{ClusteringBound, DeletionTime, RangeTombstone, RangeTombstoneMarker};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("range tombstone opened at {0:?} while another is still open")]
    DoubleOpen(ClusteringBound),
    #[error("range tombstone closed at {0:?} without being opened")]
    CloseWithoutOpen(ClusteringBound),
    #[error("range tombstone opened with {open:?} but closed with {close:?}")]
    DeletionMismatch { open: DeletionTime, close: DeletionTime },
    #[error("partition ends inside the range tombstone opened at {0:?}")]
    Unclosed(ClusteringBound),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum State {
    #[default]
    AwaitingOpen,
    HaveOpen(ClusteringBound, DeletionTime),
}

/// Two-state machine over one partition's markers.
///
/// An open marker is remembered until the matching close arrives; a boundary
/// closes the current tombstone and opens the next in one step. Any other
/// sequence is malformed.
#[derive(Debug, Default)]
pub struct RangeTombstoneReconciler {
    state: State,
}

impl RangeTombstoneReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next marker, returning the tombstone it completes, if any.
    pub fn accept(&mut self, marker: &RangeTombstoneMarker) -> Result<Option<RangeTombstone>, ReconcileError> {
        let closed = match (marker.close_bound(), marker.close_deletion()) {
            (Some(bound), Some(deletion)) => Some(self.close(bound, deletion)?),
            _ => None,
        };
        if let (Some(bound), Some(deletion)) = (marker.open_bound(), marker.open_deletion()) {
            self.open(bound, deletion)?;
        }
        Ok(closed)
    }

    /// Checks that the partition ended with no tombstone open and resets.
    pub fn finish(&mut self) -> Result<(), ReconcileError> {
        match std::mem::take(&mut self.state) {
            State::AwaitingOpen => Ok(()),
            State::HaveOpen(bound, _) => Err(ReconcileError::Unclosed(bound)),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::HaveOpen(..))
    }

    fn open(&mut self, bound: ClusteringBound, deletion: DeletionTime) -> Result<(), ReconcileError> {
        match self.state {
            State::AwaitingOpen => {
                self.state = State::HaveOpen(bound, deletion);
                Ok(())
            }
            State::HaveOpen(..) => Err(ReconcileError::DoubleOpen(bound)),
        }
    }

    fn close(&mut self, bound: ClusteringBound, deletion: DeletionTime) -> Result<RangeTombstone, ReconcileError> {
        match std::mem::take(&mut self.state) {
            State::AwaitingOpen => Err(ReconcileError::CloseWithoutOpen(bound)),
            State::HaveOpen(start, open_deletion) => {
                if open_deletion != deletion {
                    self.state = State::HaveOpen(start, open_deletion);
                    return Err(ReconcileError::DeletionMismatch {
                        open: open_deletion,
                        close: deletion,
                    });
                }
                Ok(RangeTombstone::new(start, bound, deletion))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn del() -> DeletionTime {
        DeletionTime::new(1533270605297319, 1533270605)
    }

    fn open_excl(v: &[u8]) -> RangeTombstoneMarker {
        RangeTombstoneMarker::bound(ClusteringBound::exclusive_start(vec![v.to_vec()]), del())
    }

    fn close_incl(v: &[u8]) -> RangeTombstoneMarker {
        RangeTombstoneMarker::bound(ClusteringBound::inclusive_end(vec![v.to_vec()]), del())
    }

    #[test]
    fn open_then_close_yields_one_tombstone() -> Result<(), ReconcileError> {
        let mut r = RangeTombstoneReconciler::new();
        assert_eq!(r.accept(&open_excl(b"a"))?, None);
        assert!(r.is_open());
        let rt = r.accept(&close_incl(b"b"))?.expect("tombstone");
        assert_eq!(rt.start, ClusteringBound::exclusive_start(vec![b"a".to_vec()]));
        assert_eq!(rt.end, ClusteringBound::inclusive_end(vec![b"b".to_vec()]));
        assert_eq!(rt.deletion, del());
        r.finish()
    }

    #[test]
    fn boundary_closes_and_reopens() -> Result<(), ReconcileError> {
        let second = DeletionTime::new(2, 2);
        let mut r = RangeTombstoneReconciler::new();
        r.accept(&open_excl(b"a"))?;
        let boundary = RangeTombstoneMarker::boundary(vec![b"m".to_vec()], true, del(), second);
        let first = r.accept(&boundary)?.expect("first tombstone");
        assert_eq!(first.end, ClusteringBound::inclusive_end(vec![b"m".to_vec()]));

        let last = r
            .accept(&RangeTombstoneMarker::bound(
                ClusteringBound::exclusive_end(vec![b"z".to_vec()]),
                second,
            ))?
            .expect("second tombstone");
        assert_eq!(last.start, ClusteringBound::exclusive_start(vec![b"m".to_vec()]));
        assert_eq!(last.deletion, second);
        r.finish()
    }

    #[test]
    fn two_opens_are_malformed() {
        let mut r = RangeTombstoneReconciler::new();
        assert!(r.accept(&open_excl(b"a")).is_ok());
        assert!(matches!(r.accept(&open_excl(b"b")), Err(ReconcileError::DoubleOpen(_))));
    }

    #[test]
    fn close_without_open_is_malformed() {
        let mut r = RangeTombstoneReconciler::new();
        assert!(matches!(
            r.accept(&close_incl(b"a")),
            Err(ReconcileError::CloseWithoutOpen(_))
        ));
    }

    #[test]
    fn mismatched_deletion_is_malformed() {
        let mut r = RangeTombstoneReconciler::new();
        assert!(r.accept(&open_excl(b"a")).is_ok());
        let close = RangeTombstoneMarker::bound(
            ClusteringBound::inclusive_end(vec![b"b".to_vec()]),
            DeletionTime::new(1, 1),
        );
        assert!(matches!(r.accept(&close), Err(ReconcileError::DeletionMismatch { .. })));
    }

    #[test]
    fn unclosed_partition_is_malformed() {
        let mut r = RangeTombstoneReconciler::new();
        assert!(r.accept(&open_excl(b"a")).is_ok());
        assert!(matches!(r.finish(), Err(ReconcileError::Unclosed(_))));
        assert!(r.finish().is_ok());
    }
}
