/// Clustering key of a row. The static row of a partition uses
/// [`Clustering::Static`], which sorts before every regular clustering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Clustering {
    Static,
    Regular(Vec<Vec<u8>>),
}

impl Clustering {
    pub fn regular(values: Vec<Vec<u8>>) -> Self {
        Clustering::Regular(values)
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Clustering::Static)
    }

    /// Component values; empty for the static clustering.
    pub fn values(&self) -> &[Vec<u8>] {
        match self {
            Clustering::Static => &[],
            Clustering::Regular(v) => v,
        }
    }
}

/// Which side of a clustering prefix a bound sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    InclStart,
    ExclStart,
    InclEnd,
    ExclEnd,
}

impl BoundKind {
    pub fn is_start(self) -> bool {
        matches!(self, BoundKind::InclStart | BoundKind::ExclStart)
    }

    pub fn is_end(self) -> bool {
        !self.is_start()
    }

    pub fn is_inclusive(self) -> bool {
        matches!(self, BoundKind::InclStart | BoundKind::InclEnd)
    }

    /// Position relative to all clusterings sharing the bound's prefix:
    /// `-1` sorts before them, `1` after them.
    pub fn weight(self) -> i8 {
        match self {
            BoundKind::InclStart | BoundKind::ExclEnd => -1,
            BoundKind::ExclStart | BoundKind::InclEnd => 1,
        }
    }

    /// The start kind that, placed at the same prefix, begins exactly where
    /// this end kind stops.
    pub fn adjacent_start(self) -> BoundKind {
        match self {
            BoundKind::ExclEnd | BoundKind::InclStart => BoundKind::InclStart,
            BoundKind::InclEnd | BoundKind::ExclStart => BoundKind::ExclStart,
        }
    }
}

/// One end of a clustering interval: a (possibly partial) clustering prefix
/// and a [`BoundKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusteringBound {
    pub kind: BoundKind,
    pub values: Vec<Vec<u8>>,
}

impl ClusteringBound {
    pub fn new(kind: BoundKind, values: Vec<Vec<u8>>) -> Self {
        Self { kind, values }
    }

    pub fn inclusive_start(values: Vec<Vec<u8>>) -> Self {
        Self::new(BoundKind::InclStart, values)
    }

    pub fn exclusive_start(values: Vec<Vec<u8>>) -> Self {
        Self::new(BoundKind::ExclStart, values)
    }

    pub fn inclusive_end(values: Vec<Vec<u8>>) -> Self {
        Self::new(BoundKind::InclEnd, values)
    }

    pub fn exclusive_end(values: Vec<Vec<u8>>) -> Self {
        Self::new(BoundKind::ExclEnd, values)
    }

    pub fn is_start(&self) -> bool {
        self.kind.is_start()
    }

    pub fn is_inclusive(&self) -> bool {
        self.kind.is_inclusive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_kind_weights() {
        assert_eq!(BoundKind::InclStart.weight(), -1);
        assert_eq!(BoundKind::ExclEnd.weight(), -1);
        assert_eq!(BoundKind::ExclStart.weight(), 1);
        assert_eq!(BoundKind::InclEnd.weight(), 1);
    }

    #[test]
    fn adjacent_start_flips_inclusivity() {
        assert_eq!(BoundKind::ExclEnd.adjacent_start(), BoundKind::InclStart);
        assert_eq!(BoundKind::InclEnd.adjacent_start(), BoundKind::ExclStart);
    }

    #[test]
    fn static_clustering_has_no_values() {
        assert!(Clustering::Static.values().is_empty());
        assert!(Clustering::Static.is_static());
        assert_eq!(Clustering::regular(vec![b"a".to_vec()]).values().len(), 1);
    }
}
