/// Timestamp used for "no timestamp" (an empty liveness info).
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Local deletion time used for "never deleted".
pub const NO_EXPIRATION_TIME: i32 = i32::MAX;

/// A deletion marker: when the delete was issued and when it was applied locally.
///
/// `marked_for_delete_at` is the client timestamp of the delete (microseconds),
/// `local_deletion_time` is the server-local time in seconds. Both are copied
/// verbatim by every component that touches a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeletionTime {
    pub marked_for_delete_at: i64,
    pub local_deletion_time: i32,
}

impl DeletionTime {
    /// The "not deleted" value.
    pub const LIVE: DeletionTime = DeletionTime {
        marked_for_delete_at: i64::MIN,
        local_deletion_time: i32::MAX,
    };

    pub fn new(marked_for_delete_at: i64, local_deletion_time: i32) -> Self {
        Self {
            marked_for_delete_at,
            local_deletion_time,
        }
    }

    /// Returns `true` for [`DeletionTime::LIVE`].
    pub fn is_live(&self) -> bool {
        *self == Self::LIVE
    }
}

impl Default for DeletionTime {
    fn default() -> Self {
        Self::LIVE
    }
}

/// Time-to-live metadata attached to an expiring cell or row marker.
///
/// `ttl` is the original time-to-live in seconds, `local_expiration_time` the
/// absolute instant (seconds) at which the data stops being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expiration {
    pub ttl: i32,
    pub local_expiration_time: i32,
}

impl Expiration {
    pub fn new(ttl: i32, local_expiration_time: i32) -> Self {
        Self {
            ttl,
            local_expiration_time,
        }
    }
}

/// Primary-key liveness of a row: the write time that keeps the row alive
/// independently of its cells, optionally expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LivenessInfo {
    pub timestamp: i64,
    pub expiration: Option<Expiration>,
}

impl LivenessInfo {
    /// No primary-key liveness at all (row exists only through its cells).
    pub const EMPTY: LivenessInfo = LivenessInfo {
        timestamp: NO_TIMESTAMP,
        expiration: None,
    };

    pub fn live(timestamp: i64) -> Self {
        Self {
            timestamp,
            expiration: None,
        }
    }

    pub fn expiring(timestamp: i64, expiration: Expiration) -> Self {
        Self {
            timestamp,
            expiration: Some(expiration),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp == NO_TIMESTAMP
    }

    pub fn is_expiring(&self) -> bool {
        self.expiration.is_some()
    }

    /// Same timestamp, expiration dropped.
    pub fn without_expiration(self) -> Self {
        Self {
            timestamp: self.timestamp,
            expiration: None,
        }
    }
}

impl Default for LivenessInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}
