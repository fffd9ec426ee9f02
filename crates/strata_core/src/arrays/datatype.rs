use std::fmt;

/// Logical element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    /// Integer or floating point values.
    Numeric,
    /// Integer codes into a domain of level names.
    Categorical,
    String,
    /// Milliseconds since the unix epoch.
    Time,
}

impl ColumnType {
    /// If values of this type are stored as numbers.
    pub const fn is_numeric_storage(&self) -> bool {
        !matches!(self, ColumnType::String)
    }

    /// If values of this type are always whole numbers.
    pub const fn is_integral(&self) -> bool {
        matches!(self, ColumnType::Categorical | ColumnType::Time)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "Numeric"),
            Self::Categorical => write!(f, "Categorical"),
            Self::String => write!(f, "String"),
            Self::Time => write!(f, "Time"),
        }
    }
}
