use thiserror::Error;

/// Why a claim or commit lost against state already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The ledger already holds an assignment for the resource
    AlreadyAssigned,
    /// A live lease is held under a different holder token
    ReservedByOther,
    /// No live lease matches the supplied token (never acquired, expired or foreign)
    ReservationMissing,
    /// The claimant identity already owns an assignment
    DuplicateClaimant,
}

impl ConflictKind {
    /// Stable machine-readable code used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            ConflictKind::AlreadyAssigned => "ALREADY_ASSIGNED",
            ConflictKind::ReservedByOther => "RESERVED_BY_OTHER",
            ConflictKind::ReservationMissing => "RESERVATION_MISSING",
            ConflictKind::DuplicateClaimant => "DUPLICATE_CLAIMANT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ALREADY_ASSIGNED" => Some(ConflictKind::AlreadyAssigned),
            "RESERVED_BY_OTHER" => Some(ConflictKind::ReservedByOther),
            "RESERVATION_MISSING" => Some(ConflictKind::ReservationMissing),
            "DUPLICATE_CLAIMANT" => Some(ConflictKind::DuplicateClaimant),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::AlreadyAssigned => write!(f, "already assigned"),
            ConflictKind::ReservedByOther => write!(f, "reserved by another holder"),
            ConflictKind::ReservationMissing => write!(f, "reservation missing or expired"),
            ConflictKind::DuplicateClaimant => write!(f, "duplicate claimant"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StakeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource unavailable: {0}")]
    Unavailable(String),

    #[error("conflict on {key}: {kind}")]
    Conflict { key: String, kind: ConflictKind },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("store error: {0}")]
    Store(String),
}

impl StakeError {
    pub fn conflict(key: impl Into<String>, kind: ConflictKind) -> Self {
        StakeError::Conflict {
            key: key.into(),
            kind,
        }
    }

    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            StakeError::NotFound(_) => "NOT_FOUND",
            StakeError::Unavailable(_) => "UNAVAILABLE",
            StakeError::Conflict { kind, .. } => kind.code(),
            StakeError::Invalid(_) => "INVALID",
            StakeError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            StakeError::Conflict { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StakeError {
    fn from(err: rusqlite::Error) -> Self {
        StakeError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StakeError>;
