pub mod capability;
pub mod config;
pub mod frame;
pub mod message;
pub mod types;

pub use capability::*;
pub use frame::Frame;
pub use message::{Message, Role};
pub use types::*;

/// Format a timestamp as RFC 3339, falling back to the unix epoch form if
/// the value is outside the representable range.
pub fn rfc3339(ts: time::OffsetDateTime) -> String {
    ts.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}
