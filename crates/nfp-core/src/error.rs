use thiserror::Error;

pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ERANGE: i32 = 34;
pub const EOPNOTSUPP: i32 = 95;

pub type Result<T> = std::result::Result<T, NftError>;

/// Failure of a single request against the namespace.
///
/// Every variant maps onto exactly one errno reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NftError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("busy: {0}")]
    Busy(String),
}

impl NftError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Positive errno carried (negated) in error replies.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => EINVAL,
            Self::NotFound(_) => ENOENT,
            Self::AlreadyExists(_) => EEXIST,
            Self::NotSupported(_) => EOPNOTSUPP,
            Self::PermissionDenied(_) => EPERM,
            Self::OutOfRange(_) => ERANGE,
            Self::Busy(_) => EBUSY,
        }
    }

    /// Rebuild an error from the errno of a reply. Accepts either sign.
    pub fn from_errno(errno: i32) -> Self {
        let context = format!("errno {}", errno.abs());
        match errno.abs() {
            EPERM => Self::PermissionDenied(context),
            ENOENT => Self::NotFound(context),
            EEXIST => Self::AlreadyExists(context),
            EOPNOTSUPP => Self::NotSupported(context),
            ERANGE => Self::OutOfRange(context),
            EBUSY => Self::Busy(context),
            _ => Self::InvalidArgument(context),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "exists",
            Self::NotSupported(_) => "unsupported",
            Self::PermissionDenied(_) => "denied",
            Self::OutOfRange(_) => "range",
            Self::Busy(_) => "busy",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
