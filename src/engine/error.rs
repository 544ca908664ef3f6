/// Which kind of booking conflict was detected. Callers react
/// differently: a duplicate means "check your existing appointments",
/// a taken slot means "re-fetch availability and pick another".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    DuplicateSubmission,
    SlotTaken,
}

#[derive(Debug)]
pub enum EngineError {
    /// Malformed request — never retried, the caller must fix it.
    InvalidInput(String),
    /// Entity absent or belongs to another tenant — never retried.
    NotFound(&'static str),
    /// Duplicate submission or occupied slot — retry with different input.
    Conflict(ConflictKind),
    /// Transaction timeout or transient failure — safe to retry with backoff.
    Unavailable(String),
    /// Slug or natural key already registered.
    AlreadyExists(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(what) => write!(f, "{what} not found"),
            EngineError::Conflict(ConflictKind::DuplicateSubmission) => {
                write!(f, "duplicate submission: an appointment at this time already exists for this customer")
            }
            EngineError::Conflict(ConflictKind::SlotTaken) => {
                write!(f, "slot taken: this time is already booked")
            }
            EngineError::Unavailable(msg) => write!(f, "temporarily unavailable: {msg}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
        }
    }
}

impl std::error::Error for EngineError {}
