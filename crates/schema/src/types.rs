use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// CQL column types understood by the remover.
///
/// Values are always handled as their serialized bytes; the type only matters
/// for ordering clustering components and for telling multi-cell columns
/// apart from simple ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CqlType {
    Ascii,
    Text,
    Blob,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Counter,
    Float,
    Double,
    Decimal,
    Varint,
    Timestamp,
    Date,
    Time,
    Uuid,
    TimeUuid,
    Inet,
    Duration,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    Frozen(Box<CqlType>),
}

impl CqlType {
    /// Maps a simple (non-parameterized) type name.
    pub fn simple(name: &str) -> Option<CqlType> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "ascii" => CqlType::Ascii,
            "text" | "varchar" => CqlType::Text,
            "blob" => CqlType::Blob,
            "boolean" => CqlType::Boolean,
            "tinyint" => CqlType::TinyInt,
            "smallint" => CqlType::SmallInt,
            "int" => CqlType::Int,
            "bigint" => CqlType::BigInt,
            "counter" => CqlType::Counter,
            "float" => CqlType::Float,
            "double" => CqlType::Double,
            "decimal" => CqlType::Decimal,
            "varint" => CqlType::Varint,
            "timestamp" => CqlType::Timestamp,
            "date" => CqlType::Date,
            "time" => CqlType::Time,
            "uuid" => CqlType::Uuid,
            "timeuuid" => CqlType::TimeUuid,
            "inet" => CqlType::Inet,
            "duration" => CqlType::Duration,
            _ => return None,
        };
        Some(ty)
    }

    /// Non-frozen collections store one cell per element.
    pub fn is_multi_cell(&self) -> bool {
        matches!(self, CqlType::List(_) | CqlType::Set(_) | CqlType::Map(_, _))
    }

    pub fn is_collection(&self) -> bool {
        match self {
            CqlType::Frozen(inner) => inner.is_collection(),
            other => other.is_multi_cell(),
        }
    }

    /// Compares two serialized values of this type. Empty values sort first.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.is_empty() || b.is_empty() {
            return a.len().cmp(&b.len());
        }
        match self {
            CqlType::TinyInt
            | CqlType::SmallInt
            | CqlType::Int
            | CqlType::BigInt
            | CqlType::Counter
            | CqlType::Timestamp
            | CqlType::Time => compare_fixed_signed(a, b),
            CqlType::Varint => compare_varint(a, b),
            CqlType::Float if a.len() == 4 && b.len() == 4 => {
                let x = f32::from_be_bytes([a[0], a[1], a[2], a[3]]);
                let y = f32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                x.total_cmp(&y)
            }
            CqlType::Double if a.len() == 8 && b.len() == 8 => {
                let x = f64::from_be_bytes(eight(a));
                let y = f64::from_be_bytes(eight(b));
                x.total_cmp(&y)
            }
            CqlType::TimeUuid => compare_time_uuid(a, b),
            CqlType::Uuid if uuid_version(a) == Some(1) && uuid_version(b) == Some(1) => {
                compare_time_uuid(a, b)
            }
            _ => a.cmp(b),
        }
    }
}

fn eight(v: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&v[..8]);
    out
}

fn compare_fixed_signed(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() != b.len() {
        return a.cmp(b);
    }
    let (ha, hb) = (a[0] as i8, b[0] as i8);
    ha.cmp(&hb).then_with(|| a[1..].cmp(&b[1..]))
}

fn compare_varint(a: &[u8], b: &[u8]) -> Ordering {
    let neg_a = a[0] & 0x80 != 0;
    let neg_b = b[0] & 0x80 != 0;
    match (neg_a, neg_b) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (true, true) => b.len().cmp(&a.len()).then_with(|| a.cmp(b)),
    }
}

fn uuid_version(v: &[u8]) -> Option<u8> {
    (v.len() == 16).then(|| v[6] >> 4)
}

fn compare_time_uuid(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() != 16 || b.len() != 16 {
        return a.cmp(b);
    }
    time_uuid_timestamp(a)
        .cmp(&time_uuid_timestamp(b))
        .then_with(|| a.cmp(b))
}

fn time_uuid_timestamp(v: &[u8]) -> u64 {
    (((v[6] & 0x0f) as u64) << 56)
        | ((v[7] as u64) << 48)
        | ((v[4] as u64) << 40)
        | ((v[5] as u64) << 32)
        | ((v[0] as u64) << 24)
        | ((v[1] as u64) << 16)
        | ((v[2] as u64) << 8)
        | (v[3] as u64)
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CqlType::Ascii => "ascii",
            CqlType::Text => "text",
            CqlType::Blob => "blob",
            CqlType::Boolean => "boolean",
            CqlType::TinyInt => "tinyint",
            CqlType::SmallInt => "smallint",
            CqlType::Int => "int",
            CqlType::BigInt => "bigint",
            CqlType::Counter => "counter",
            CqlType::Float => "float",
            CqlType::Double => "double",
            CqlType::Decimal => "decimal",
            CqlType::Varint => "varint",
            CqlType::Timestamp => "timestamp",
            CqlType::Date => "date",
            CqlType::Time => "time",
            CqlType::Uuid => "uuid",
            CqlType::TimeUuid => "timeuuid",
            CqlType::Inet => "inet",
            CqlType::Duration => "duration",
            CqlType::List(t) => return write!(f, "list<{}>", t),
            CqlType::Set(t) => return write!(f, "set<{}>", t),
            CqlType::Map(k, v) => return write!(f, "map<{}, {}>", k, v),
            CqlType::Frozen(t) => return write!(f, "frozen<{}>", t),
            CqlType::Tuple(ts) => {
                write!(f, "tuple<")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                return write!(f, ">");
            }
        };
        f.write_str(name)
    }
}

impl FromStr for CqlType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::cql::parse_type(s)
    }
}
