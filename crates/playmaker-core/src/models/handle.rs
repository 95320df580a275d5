//! Resource handles and push scopes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of synchronizable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Live score of a tournament match
    MatchScore,
    /// Attendance marks for a coaching session
    AttendanceRoster,
    /// Sessions and hours assigned to a coach
    CoachWorkload,
    /// Announcements posted to a tournament
    UpdateFeed,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [
        Self::MatchScore,
        Self::AttendanceRoster,
        Self::CoachWorkload,
        Self::UpdateFeed,
    ];

    /// Wire name, as used in handles and push events
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MatchScore => "match_score",
            Self::AttendanceRoster => "attendance_roster",
            Self::CoachWorkload => "coach_workload",
            Self::UpdateFeed => "update_feed",
        }
    }

    /// REST collection segment for this kind
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::MatchScore => "match-scores",
            Self::AttendanceRoster => "attendance-rosters",
            Self::CoachWorkload => "coach-workloads",
            Self::UpdateFeed => "update-feeds",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.path_segment() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resource kind '{s}'")))
    }
}

/// Stable identifier of one synchronizable resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawHandle")]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: String,
}

/// Wire shape of a handle before its id is validated
#[derive(Deserialize)]
struct RawHandle {
    kind: ResourceKind,
    id: String,
}

impl TryFrom<RawHandle> for ResourceHandle {
    type Error = Error;

    fn try_from(raw: RawHandle) -> Result<Self, Self::Error> {
        Self::new(raw.kind, raw.id)
    }
}

impl ResourceHandle {
    /// Create a handle, rejecting blank ids
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{kind} handle id must not be empty"
            )));
        }
        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }

    pub fn match_score(id: impl Into<String>) -> crate::Result<Self> {
        Self::new(ResourceKind::MatchScore, id)
    }

    pub fn attendance_roster(id: impl Into<String>) -> crate::Result<Self> {
        Self::new(ResourceKind::AttendanceRoster, id)
    }

    pub fn coach_workload(id: impl Into<String>) -> crate::Result<Self> {
        Self::new(ResourceKind::CoachWorkload, id)
    }

    pub fn update_feed(id: impl Into<String>) -> crate::Result<Self> {
        Self::new(ResourceKind::UpdateFeed, id)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ResourceHandle {
    type Err = Error;

    /// Parse `kind:id`, e.g. `match_score:42`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("expected <kind>:<id>, got '{s}'")))?;
        Self::new(kind.parse()?, id)
    }
}

/// Named push channel (a tournament, a coach, or a session)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    /// Create a scope from a raw name, rejecting blank names
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("scope must not be empty".to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn tournament(id: impl fmt::Display) -> Self {
        Self(format!("tournament:{id}"))
    }

    pub fn coach(id: impl fmt::Display) -> Self {
        Self(format!("coach:{id}"))
    }

    pub fn session(id: impl fmt::Display) -> Self {
        Self(format!("session:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.0
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_display_and_parse_agree() {
        let handle = ResourceHandle::match_score("42").unwrap();
        assert_eq!(handle.to_string(), "match_score:42");
        let parsed: ResourceHandle = "match_score:42".parse().unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn handle_parse_accepts_path_segment_kind() {
        let parsed: ResourceHandle = "coach-workloads: c-7 ".parse().unwrap();
        assert_eq!(parsed.kind, ResourceKind::CoachWorkload);
        assert_eq!(parsed.id, "c-7");
    }

    #[test]
    fn handle_rejects_blank_id_and_unknown_kind() {
        assert!(ResourceHandle::update_feed("  ").is_err());
        assert!("scoreboard:1".parse::<ResourceHandle>().is_err());
        assert!("match_score".parse::<ResourceHandle>().is_err());
    }

    #[test]
    fn handle_serializes_kind_snake_case() {
        let handle = ResourceHandle::attendance_roster("s-1").unwrap();
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "attendance_roster", "id": "s-1" })
        );
    }

    #[test]
    fn wire_handles_are_trimmed_and_validated() {
        let handle: ResourceHandle =
            serde_json::from_value(serde_json::json!({ "kind": "match_score", "id": " 42 " }))
                .unwrap();
        assert_eq!(handle, ResourceHandle::match_score("42").unwrap());

        let blank = serde_json::from_value::<ResourceHandle>(
            serde_json::json!({ "kind": "match_score", "id": "" }),
        );
        assert!(blank.is_err());
    }

    #[test]
    fn wire_scopes_round_trip_as_plain_strings() {
        let scope: Scope = serde_json::from_value(serde_json::json!(" tournament:3 ")).unwrap();
        assert_eq!(scope, Scope::tournament(3));
        assert_eq!(serde_json::to_value(&scope).unwrap(), serde_json::json!("tournament:3"));
        assert!(serde_json::from_value::<Scope>(serde_json::json!("  ")).is_err());
    }

    #[test]
    fn scope_constructors() {
        assert_eq!(Scope::tournament(12).as_str(), "tournament:12");
        assert_eq!(Scope::coach("c-1").as_str(), "coach:c-1");
        assert_eq!(Scope::session("s-9").to_string(), "session:s-9");
        assert!(Scope::new(" ").is_err());
    }
}
