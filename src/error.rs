use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};

/// Boxed source from an underlying transport primitive.
pub type TransportError = Box<dyn StdError + Send + Sync>;

pub enum Error {
    /// The moniker contains a path separator and cannot name a registry region.
    InvalidMoniker(String),
    /// The shared registry region could not be created or opened.
    RegistryUnavailable(TransportError),
    /// A read or write against an already-open registry region failed.
    RegistryAccess(TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMoniker(moniker) => {
                write!(f, "moniker {moniker:?} must not contain a path separator")
            }
            Self::RegistryUnavailable(inner) => {
                write!(f, "failed to create or open the shared registry: {inner}")
            }
            Self::RegistryAccess(inner) => write!(f, "shared registry access failed: {inner}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidMoniker(_) => None,
            Self::RegistryUnavailable(inner) | Self::RegistryAccess(inner) => Some(&**inner),
        }
    }
}
