use crate::access::PartId;
use crate::units::BytesSize;
use std::error::Error;
use std::fmt;

/// Errors surfaced by the simulation core.
///
/// Structural errors (malformed accesses, sampling from an empty tree) carry the access
/// index and part identity involved so a failing run can be traced back to the exact
/// event in the input sequence. Capacity exhaustion aborts only the run it occurred in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A single access cannot be satisfied even with every other resident part evicted
    InsufficientCapacity {
        access_ind: usize,
        part: PartId,
        part_bytes: BytesSize,
        capacity: BytesSize,
    },
    /// A weighted draw was attempted with no items or a total weight of zero
    EmptyOrZeroWeight,
    /// A configuration value that passed deserialization is semantically unusable
    InvalidConfig { reason: String },
    /// An access does not fit its file's declared size, or has no size at all
    MalformedAccess {
        access_ind: usize,
        file: String,
        reason: String,
    },
    /// A policy failed to nominate a resident victim while space was still needed
    NoEvictionCandidate { access_ind: usize },
    /// A file referenced by an access was never declared
    UnknownFile { access_ind: usize, file: String },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InsufficientCapacity {
                access_ind,
                part,
                part_bytes,
                capacity,
            } => write!(
                f,
                "access {access_ind}: part {part} of {part_bytes} bytes cannot fit a cache of {capacity} bytes"
            ),
            SimError::EmptyOrZeroWeight => {
                write!(f, "cannot sample from an empty or zero-weight selection tree")
            }
            SimError::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            SimError::MalformedAccess {
                access_ind,
                file,
                reason,
            } => write!(f, "access {access_ind} to file {file:?} is malformed: {reason}"),
            SimError::NoEvictionCandidate { access_ind } => write!(
                f,
                "access {access_ind}: the eviction policy produced no resident victim"
            ),
            SimError::UnknownFile { access_ind, file } => {
                write!(f, "access {access_ind} references undeclared file {file:?}")
            }
        }
    }
}

impl Error for SimError {}
