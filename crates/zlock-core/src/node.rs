//! Lock paths, candidate nodes and their ordering.
//!
//! Every acquisition attempt creates one sequential ephemeral child under the
//! lock path. Child names look like
//!
//! ```text
//! _c_<token>-lock-0000000007
//! ```
//!
//! where `<token>` is unique per attempt (used to recover a node whose
//! creation reply was lost) and the ten-digit suffix is assigned by the
//! coordination service. The child with the smallest suffix holds the lock.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    coordination::SessionId,
    error::{Error, Result},
    reentrancy::OwnerId,
};

/// Marker that precedes the sequence suffix in every candidate name
pub const LOCK_NAME: &str = "lock-";

/// Width of the service-assigned sequence suffix
pub const SEQUENCE_WIDTH: usize = 10;

const PROTECTED_PREFIX: &str = "_c_";
const MAX_PATH_LEN: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════
// LOCK PATH
// ═══════════════════════════════════════════════════════════════════════════

/// Identity of a logical lock: the parent path its candidates live under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockPath(String);

impl LockPath {
    /// Parse and validate a lock path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` unless the path is absolute, has no empty or
    /// relative segments, no trailing slash and is not the root.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let path = path.trim().to_string();
        let invalid = |reason: &str| Error::InvalidPath {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if !path.starts_with('/') {
            return Err(invalid("must be absolute"));
        }
        if path == "/" {
            return Err(invalid("cannot be the root"));
        }
        if path.ends_with('/') {
            return Err(invalid("must not end with '/'"));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(invalid("too long"));
        }
        if path.contains('\0') {
            return Err(invalid("contains a null byte"));
        }
        if path
            .split('/')
            .skip(1)
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid("contains an empty or relative segment"));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full path of a child node.
    pub fn child(&self, name: &str) -> String {
        format!("{}/{name}", self.0)
    }

    /// Prefix for a candidate node tagged with `token`; the service appends
    /// the sequence suffix.
    pub fn candidate_prefix(&self, token: &str) -> String {
        self.child(&format!("{PROTECTED_PREFIX}{token}-{LOCK_NAME}"))
    }
}

impl fmt::Display for LockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LockPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for LockPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LockPath> for String {
    fn from(path: LockPath) -> Self {
        path.0
    }
}

/// Fresh per-attempt token embedded in a candidate node's name.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Extract the service-assigned sequence number from a candidate name.
///
/// Returns `None` for children that are not lock candidates.
pub fn parse_sequence(name: &str) -> Option<u64> {
    let marker = name.rfind(LOCK_NAME)?;
    let suffix = &name[marker + LOCK_NAME.len()..];
    if suffix.len() != SEQUENCE_WIDTH || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

// ═══════════════════════════════════════════════════════════════════════════
// CANDIDATES
// ═══════════════════════════════════════════════════════════════════════════

/// One live child under a lock path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub sequence: u64,
}

impl Candidate {
    fn carries_token(&self, token: &str) -> bool {
        self.name
            .strip_prefix(PROTECTED_PREFIX)
            .and_then(|rest| rest.strip_prefix(token))
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Snapshot of every candidate under a lock path, ordered by sequence.
///
/// Never cached: the engine fetches a fresh set on every evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    members: Vec<Candidate>,
}

impl CandidateSet {
    /// Build from raw child names; non-candidate children are ignored.
    pub fn from_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut members: Vec<Candidate> = children
            .into_iter()
            .filter_map(|name| parse_sequence(&name).map(|sequence| Candidate { name, sequence }))
            .collect();
        members.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.name.cmp(&b.name)));
        Self { members }
    }

    /// Position of `name`; 0 means it holds the lock.
    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|c| c.name == name)
    }

    /// The candidate immediately ahead of `name`, if any.
    pub fn predecessor_of(&self, name: &str) -> Option<&Candidate> {
        self.rank_of(name)
            .and_then(|rank| rank.checked_sub(1))
            .and_then(|rank| self.members.get(rank))
    }

    /// Current lock holder
    pub fn holder(&self) -> Option<&Candidate> {
        self.members.first()
    }

    /// Candidate created with `token`, if it exists.
    pub fn find_token(&self, token: &str) -> Option<&Candidate> {
        self.members.iter().find(|c| c.carries_token(token))
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.members
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NODE HANDLE
// ═══════════════════════════════════════════════════════════════════════════

/// The candidate node this process created for one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    path: String,
    name: String,
    sequence: u64,
    session_id: SessionId,
}

impl NodeHandle {
    /// Wrap the full path returned by the service.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the name carries no sequence suffix.
    pub fn from_path(path: impl Into<String>, session_id: SessionId) -> Result<Self> {
        let path = path.into();
        let name = path
            .rsplit_once('/')
            .map_or(path.as_str(), |(_, name)| name)
            .to_string();
        let sequence = parse_sequence(&name)
            .ok_or_else(|| Error::Parse(format!("candidate node '{path}' has no sequence suffix")))?;
        Ok(Self {
            path,
            name,
            sequence,
            session_id,
        })
    }

    /// Full path in the coordination tree
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Child name under the lock path
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Session that owns the node
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PAYLOAD
// ═══════════════════════════════════════════════════════════════════════════

/// Diagnostic data stored in every candidate node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePayload {
    pub host: String,
    pub pid: u32,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl NodePayload {
    /// Describe the current process acting for `owner`.
    pub fn for_owner(owner: &OwnerId) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            host,
            pid: std::process::id(),
            owner: owner.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Current holder of a lock as seen in the coordination tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderInfo {
    pub candidate: Candidate,
    /// `None` if the payload could not be read or decoded
    pub payload: Option<NodePayload>,
}
