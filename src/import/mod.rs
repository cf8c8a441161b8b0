//! Bulk roster import
//!
//! Shared by user bulk-create and enrollment bulk-upload.

pub mod reader;
pub mod roster;

pub use roster::{RosterEntry, parse_roster, parse_upload};
