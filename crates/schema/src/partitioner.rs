use std::cmp::Ordering;
use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::SchemaError;

/// Distributes partition keys over the token ring and therefore fixes the
/// order of partitions inside an SSTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Partitioner {
    /// Token is the xxh3 64-bit hash of the key, compared as a signed integer.
    #[default]
    Xxh3,
    /// Token is the key itself.
    ByteOrdered,
}

impl Partitioner {
    pub fn name(&self) -> &'static str {
        match self {
            Partitioner::Xxh3 => "Xxh3Partitioner",
            Partitioner::ByteOrdered => "ByteOrderedPartitioner",
        }
    }

    /// Accepts the short name or a fully qualified `a.b.Name` form.
    pub fn from_name(name: &str) -> Result<Self, SchemaError> {
        let short = name.rsplit('.').next().unwrap_or(name);
        match short {
            "Xxh3Partitioner" => Ok(Partitioner::Xxh3),
            "ByteOrderedPartitioner" => Ok(Partitioner::ByteOrdered),
            _ => Err(SchemaError::UnknownPartitioner(name.to_string())),
        }
    }

    pub fn token(&self, key: &[u8]) -> Token {
        match self {
            Partitioner::Xxh3 => Token::Hash(xxh3_64(key) as i64),
            Partitioner::ByteOrdered => Token::Bytes(key.to_vec()),
        }
    }

    pub fn decorate(&self, key: &[u8]) -> DecoratedKey {
        DecoratedKey {
            token: self.token(key),
            key: key.to_vec(),
        }
    }
}

impl fmt::Display for Partitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Hash(i64),
    Bytes(Vec<u8>),
}

/// A partition key together with its token. Orders by token, then by key
/// bytes to break hash collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecoratedKey {
    pub token: Token,
    pub key: Vec<u8>,
}

impl Ord for DecoratedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token
            .cmp(&other.token)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for DecoratedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for p in [Partitioner::Xxh3, Partitioner::ByteOrdered] {
            assert_eq!(Partitioner::from_name(p.name()).unwrap(), p);
        }
        assert_eq!(
            Partitioner::from_name("org.example.dht.ByteOrderedPartitioner").unwrap(),
            Partitioner::ByteOrdered
        );
        assert!(Partitioner::from_name("Murmur3Partitioner").is_err());
    }

    #[test]
    fn byte_ordered_keys_sort_lexically() {
        let p = Partitioner::ByteOrdered;
        assert!(p.decorate(b"a") < p.decorate(b"b"));
        assert!(p.decorate(b"ab") > p.decorate(b"a"));
    }

    #[test]
    fn hashed_keys_are_deterministic() {
        let p = Partitioner::Xxh3;
        assert_eq!(p.decorate(b"key"), p.decorate(b"key"));
        assert_ne!(p.token(b"key1"), p.token(b"key2"));
    }
}
