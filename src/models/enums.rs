use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(SessionStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl SessionStatus {
    /// Pending and approved records still occupy a counselor slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub const TERMINAL: [SessionStatus; 3] = [Self::Rejected, Self::Completed, Self::Cancelled];
}

str_enum!(EntityKind {
    Appointment => "appointment",
    FollowUp => "follow_up",
});

impl EntityKind {
    /// Human label used in error messages ("Appointment", "Follow-up session").
    pub fn label(&self) -> &'static str {
        match self {
            Self::Appointment => "Appointment",
            Self::FollowUp => "Follow-up session",
        }
    }
}

str_enum!(NotificationKind {
    Created => "created",
    StatusChanged => "status_changed",
    Cancelled => "cancelled",
});
