//! Domain types shared across the resolution pipeline.
//!
//! Contacts, groups and group members mirror the shapes served by a
//! OneBot-compatible endpoint; fragments and candidates are the intermediate
//! currency between recognition, extraction and matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence assigned to a recognized fragment when the backend omits one.
pub const DEFAULT_FRAGMENT_CONFIDENCE: f64 = 0.8;

/// One run of recognized text, as normalized by the recognition adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFragment {
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f64,
    /// Opaque locator (bounding box or similar) passed through from the
    /// backend when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Value>,
}

impl RecognizedFragment {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            region: None,
        }
    }

    pub fn with_region(mut self, region: Value) -> Self {
        self.region = Some(region);
        self
    }
}

/// Where a candidate name was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamePosition {
    /// Index of the source fragment.
    pub fragment: usize,
    /// Index of the hit within that fragment.
    pub hit: usize,
    /// The source fragment's region, when it carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Value>,
}

/// A substring hypothesized to be a person's name, carrying the confidence
/// inherited from its source fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateName {
    pub name: String,
    pub confidence: f64,
    pub position: NamePosition,
}

impl CandidateName {
    /// A candidate entered directly by the caller rather than extracted from
    /// recognized text.
    pub fn manual(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            position: NamePosition {
                fragment: 0,
                hit: 0,
                region: None,
            },
        }
    }
}

/// A friend-level identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub avatar: String,
}

/// Group metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub group_name: String,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub max_member_count: u32,
}

/// Member role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl GroupRole {
    /// Parses the OneBot role string, treating anything unknown as a plain
    /// member.
    pub fn parse(role: &str) -> Self {
        match role {
            "owner" => GroupRole::Owner,
            "admin" => GroupRole::Admin,
            _ => GroupRole::Member,
        }
    }
}

/// An identity scoped to one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub nickname: String,
    pub card: String,
    #[serde(default)]
    pub role: GroupRole,
}

/// Which side of the directory a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Friend,
    GroupMember,
}

/// The matched identity itself. Group members carry a `card` field, which is
/// what the untagged deserialization keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchedParty {
    Member(GroupMember),
    Friend(Contact),
}

impl MatchedParty {
    pub fn user_id(&self) -> &str {
        match self {
            MatchedParty::Friend(c) => &c.user_id,
            MatchedParty::Member(m) => &m.user_id,
        }
    }

    pub fn nickname(&self) -> &str {
        match self {
            MatchedParty::Friend(c) => &c.nickname,
            MatchedParty::Member(m) => &m.nickname,
        }
    }

    /// The user-chosen label when one exists (remark or card), falling back
    /// to the nickname.
    pub fn label(&self) -> &str {
        let label = match self {
            MatchedParty::Friend(c) => &c.remark,
            MatchedParty::Member(m) => &m.card,
        };
        if label.is_empty() {
            self.nickname()
        } else {
            label
        }
    }
}

/// One ranked match produced by the match engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedContact {
    pub contact: MatchedParty,
    /// Fused score in `[0, 1]`, higher is better.
    pub score: f64,
    pub kind: ContactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl MatchedContact {
    pub fn friend(contact: Contact, score: f64) -> Self {
        Self {
            contact: MatchedParty::Friend(contact),
            score,
            kind: ContactKind::Friend,
            group_id: None,
            group_name: None,
        }
    }

    pub fn group_member(
        member: GroupMember,
        score: f64,
        group_id: impl Into<String>,
        group_name: impl Into<String>,
    ) -> Self {
        Self {
            contact: MatchedParty::Member(member),
            score,
            kind: ContactKind::GroupMember,
            group_id: Some(group_id.into()),
            group_name: Some(group_name.into()),
        }
    }

    /// The tuple distinguishing one logical contact-in-context from another.
    /// Two matches sharing this key are the same target.
    pub fn identity_key(&self) -> (String, ContactKind, String) {
        (
            self.contact.user_id().to_string(),
            self.kind,
            self.group_id.clone().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_confidence_clamped() {
        assert_eq!(RecognizedFragment::new("a", 1.7).confidence, 1.0);
        assert_eq!(RecognizedFragment::new("a", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_group_role_parse() {
        assert_eq!(GroupRole::parse("owner"), GroupRole::Owner);
        assert_eq!(GroupRole::parse("admin"), GroupRole::Admin);
        assert_eq!(GroupRole::parse("member"), GroupRole::Member);
        assert_eq!(GroupRole::parse("whatever"), GroupRole::Member);
    }

    #[test]
    fn test_identity_key_distinguishes_scope() {
        let friend = MatchedContact::friend(
            Contact {
                user_id: "1001".into(),
                nickname: "alice".into(),
                remark: String::new(),
                avatar: String::new(),
            },
            0.9,
        );
        let member = MatchedContact::group_member(
            GroupMember {
                user_id: "1001".into(),
                nickname: "alice".into(),
                card: String::new(),
                role: GroupRole::Member,
            },
            0.9,
            "42",
            "team",
        );

        assert_ne!(friend.identity_key(), member.identity_key());
        assert_eq!(friend.identity_key().2, "");
        assert_eq!(member.identity_key().2, "42");
    }

    #[test]
    fn test_label_prefers_remark_and_card() {
        let friend = MatchedParty::Friend(Contact {
            user_id: "1".into(),
            nickname: "nick".into(),
            remark: "boss".into(),
            avatar: String::new(),
        });
        assert_eq!(friend.label(), "boss");

        let member = MatchedParty::Member(GroupMember {
            user_id: "2".into(),
            nickname: "nick".into(),
            card: String::new(),
            role: GroupRole::Member,
        });
        assert_eq!(member.label(), "nick");
    }

    #[test]
    fn test_matched_contact_serde_roundtrip() {
        let member = MatchedContact::group_member(
            GroupMember {
                user_id: "7".into(),
                nickname: "bob".into(),
                card: "bob-ops".into(),
                role: GroupRole::Admin,
            },
            0.75,
            "g1",
            "ops",
        );

        let json = serde_json::to_string(&member).expect("serialize");
        let back: MatchedContact = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, member);
        assert!(matches!(back.contact, MatchedParty::Member(_)));
    }
}
