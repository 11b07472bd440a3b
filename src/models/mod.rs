pub mod appointment;
pub mod counselor;
pub mod enums;
pub mod follow_up;
pub mod notification;

pub use appointment::*;
pub use counselor::*;
pub use enums::*;
pub use follow_up::*;
pub use notification::*;

/// Storage format for `created_at` / `updated_at` (matches SQLite `datetime()`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
