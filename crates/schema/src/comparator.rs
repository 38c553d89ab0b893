use std::cmp::Ordering;

use rows::{Clustering, ClusteringBound};

use crate::table::ClusteringOrder;
use crate::types::CqlType;

/// Orders clusterings and clustering bounds of one table.
///
/// Each component is compared with its column type, reversed for `DESC`
/// columns. A bound covering a prefix sorts before (start inclusive, end
/// exclusive) or after (start exclusive, end inclusive) every clustering that
/// shares the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusteringComparator {
    components: Vec<(CqlType, ClusteringOrder)>,
}

impl ClusteringComparator {
    pub fn new(components: Vec<(CqlType, ClusteringOrder)>) -> Self {
        Self { components }
    }

    /// Number of clustering columns.
    pub fn size(&self) -> usize {
        self.components.len()
    }

    pub fn compare(&self, a: &Clustering, b: &Clustering) -> Ordering {
        match (a, b) {
            (Clustering::Static, Clustering::Static) => Ordering::Equal,
            (Clustering::Static, _) => Ordering::Less,
            (_, Clustering::Static) => Ordering::Greater,
            (Clustering::Regular(x), Clustering::Regular(y)) => self
                .compare_prefix(x, y)
                .then_with(|| x.len().cmp(&y.len())),
        }
    }

    /// Position of `bound` relative to the row at `clustering`.
    pub fn compare_bound_to_clustering(&self, bound: &ClusteringBound, clustering: &Clustering) -> Ordering {
        let values = match clustering {
            Clustering::Static => return Ordering::Greater,
            Clustering::Regular(v) => v,
        };
        match self.compare_prefix(&bound.values, values) {
            Ordering::Equal if bound.values.len() <= values.len() => {
                if bound.kind.weight() < 0 {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            Ordering::Equal => Ordering::Greater,
            other => other,
        }
    }

    pub fn compare_bounds(&self, a: &ClusteringBound, b: &ClusteringBound) -> Ordering {
        match self.compare_prefix(&a.values, &b.values) {
            Ordering::Equal => {}
            other => return other,
        }
        match a.values.len().cmp(&b.values.len()) {
            Ordering::Equal => a.kind.weight().cmp(&b.kind.weight()),
            Ordering::Less => {
                if a.kind.weight() < 0 {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            Ordering::Greater => {
                if b.kind.weight() < 0 {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
        }
    }

    /// Compares the components both sides have.
    fn compare_prefix(&self, a: &[Vec<u8>], b: &[Vec<u8>]) -> Ordering {
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            let ord = match self.components.get(i) {
                Some((ty, ClusteringOrder::Asc)) => ty.compare(x, y),
                Some((ty, ClusteringOrder::Desc)) => ty.compare(x, y).reverse(),
                None => x.cmp(y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    fn asc_int() -> ClusteringComparator {
        ClusteringComparator::new(vec![(CqlType::Int, ClusteringOrder::Asc), (CqlType::Text, ClusteringOrder::Asc)])
    }

    #[test]
    fn static_sorts_first() {
        let c = asc_int();
        let row = Clustering::regular(vec![int(-5)]);
        assert_eq!(c.compare(&Clustering::Static, &row), Ordering::Less);
        assert_eq!(c.compare(&row, &Clustering::Static), Ordering::Greater);
    }

    #[test]
    fn components_use_column_types() {
        let c = asc_int();
        let a = Clustering::regular(vec![int(-1), b"z".to_vec()]);
        let b = Clustering::regular(vec![int(7), b"a".to_vec()]);
        assert_eq!(c.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn descending_columns_reverse() {
        let c = ClusteringComparator::new(vec![(CqlType::Int, ClusteringOrder::Desc)]);
        let a = Clustering::regular(vec![int(1)]);
        let b = Clustering::regular(vec![int(2)]);
        assert_eq!(c.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn bounds_straddle_their_prefix() {
        let c = asc_int();
        let row = Clustering::regular(vec![int(3), b"x".to_vec()]);
        let incl_start = ClusteringBound::inclusive_start(vec![int(3)]);
        let excl_start = ClusteringBound::exclusive_start(vec![int(3)]);
        let incl_end = ClusteringBound::inclusive_end(vec![int(3)]);
        let excl_end = ClusteringBound::exclusive_end(vec![int(3)]);

        assert_eq!(c.compare_bound_to_clustering(&incl_start, &row), Ordering::Less);
        assert_eq!(c.compare_bound_to_clustering(&excl_start, &row), Ordering::Greater);
        assert_eq!(c.compare_bound_to_clustering(&incl_end, &row), Ordering::Greater);
        assert_eq!(c.compare_bound_to_clustering(&excl_end, &row), Ordering::Less);

        let other = Clustering::regular(vec![int(4), b"a".to_vec()]);
        assert_eq!(c.compare_bound_to_clustering(&incl_end, &other), Ordering::Less);
    }

    #[test]
    fn bound_ordering() {
        let c = asc_int();
        let short_start = ClusteringBound::inclusive_start(vec![int(3)]);
        let long_start = ClusteringBound::inclusive_start(vec![int(3), b"m".to_vec()]);
        let short_end = ClusteringBound::inclusive_end(vec![int(3)]);

        assert_eq!(c.compare_bounds(&short_start, &long_start), Ordering::Less);
        assert_eq!(c.compare_bounds(&long_start, &short_end), Ordering::Less);
        assert_eq!(c.compare_bounds(&short_end, &long_start), Ordering::Greater);

        // An exclusive end and an inclusive start at the same prefix touch.
        let excl_end = ClusteringBound::exclusive_end(vec![int(5)]);
        let incl_start = ClusteringBound::inclusive_start(vec![int(5)]);
        assert_eq!(c.compare_bounds(&excl_end, &incl_start), Ordering::Equal);
    }
}
