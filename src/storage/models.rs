//! 领域枚举
//!
//! Roles and statuses are persisted as upper-case strings.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TS,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    /// Parse a stored role, falling back to STUDENT for unknown values
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(Role::Student)
    }

    pub fn can_manage_grades(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    TS,
    Display,
    EnumString,
    AsRefStr,
)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_strings() {
        assert_eq!(Role::Admin.as_ref(), "ADMIN");
        assert_eq!(Role::from_db("TEACHER"), Role::Teacher);
        assert_eq!(Role::from_db("parent"), Role::Parent);
        assert_eq!(Role::from_db("janitor"), Role::Student);
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Student).expect("serialize");
        assert_eq!(json, "\"STUDENT\"");
        let parsed: Role = serde_json::from_str("\"ADMIN\"").expect("deserialize");
        assert_eq!(parsed, Role::Admin);
    }

    #[test]
    fn test_request_status_strings() {
        assert_eq!(RequestStatus::Pending.to_string(), "PENDING");
        assert_eq!(
            "rejected".parse::<RequestStatus>().expect("parse"),
            RequestStatus::Rejected
        );
    }
}
