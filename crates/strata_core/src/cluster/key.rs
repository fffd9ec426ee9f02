use std::fmt;
use std::sync::Arc;

/// What a key addresses.
///
/// The kind is part of the key's identity, two keys with the same name but
/// different kinds are different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    /// User visible values, frames mostly.
    User,
    /// Column headers.
    Column,
    /// A single chunk of a column.
    Chunk,
    /// Scratch values produced by distributed algorithms.
    Internal,
}

/// Name of a value in the cluster store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: KeyKind,
    name: Arc<str>,
}

impl Key {
    pub fn new(kind: KeyKind, name: impl Into<Arc<str>>) -> Self {
        Key {
            kind,
            name: name.into(),
        }
    }

    pub fn user(name: impl Into<Arc<str>>) -> Self {
        Self::new(KeyKind::User, name)
    }

    pub fn internal(name: impl Into<Arc<str>>) -> Self {
        Self::new(KeyKind::Internal, name)
    }

    /// Generate a new unique column key.
    pub fn random_column() -> Self {
        Self::new(KeyKind::Column, format!("col_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Generate a new unique user key with the given prefix.
    pub fn random_user(prefix: &str) -> Self {
        Self::new(
            KeyKind::User,
            format!("{prefix}_{}", uuid::Uuid::new_v4().simple()),
        )
    }

    /// Key for chunk `cidx` of the column identified by this key.
    pub fn chunk_key(&self, cidx: usize) -> Self {
        debug_assert_eq!(KeyKind::Column, self.kind);
        Self::new(KeyKind::Chunk, format!("{}#{cidx}", self.name))
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?}, {})", self.kind, self.name)
    }
}
