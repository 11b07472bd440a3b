use serde::{Deserialize, Serialize};

/// Stored value meaning "any counselor". Not a foreign key.
pub const NO_PREFERENCE: &str = "No preference";

/// Counselor reference on an appointment or follow-up: a concrete counselor
/// identifier, or the "No preference" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CounselorRef {
    NoPreference,
    Counselor(String),
}

impl CounselorRef {
    pub fn counselor(id: impl Into<String>) -> Self {
        Self::Counselor(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoPreference => NO_PREFERENCE,
            Self::Counselor(id) => id,
        }
    }

    /// The concrete counselor id, `None` for the sentinel.
    pub fn counselor_id(&self) -> Option<&str> {
        match self {
            Self::NoPreference => None,
            Self::Counselor(id) => Some(id),
        }
    }

    pub fn is_no_preference(&self) -> bool {
        matches!(self, Self::NoPreference)
    }
}

impl From<String> for CounselorRef {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_PREFERENCE) {
            Self::NoPreference
        } else {
            Self::Counselor(trimmed.to_string())
        }
    }
}

impl From<&str> for CounselorRef {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<CounselorRef> for String {
    fn from(value: CounselorRef) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for CounselorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
