//! Group members and the membership view.
//!
//! A [`MemberView`] is the locally known set of participants in a group
//! channel.  It is not the result of a consensus protocol: each channel keeps
//! its own view from the presence announcements it has seen (join, present,
//! leave).  The view id increases by one on every change so status text can
//! show that a view was replaced.

use std::fmt;

use uuid::Uuid;

/// Identity of one group member: a stable UUID plus a logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberId {
    /// Unique per channel instance; survives transport hot-swaps.
    pub uuid: Uuid,
    /// Human-readable member name (e.g. `"ANDROID"`).
    pub name: String,
}

impl MemberId {
    /// Creates a member id with a fresh random UUID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// The identifier shown to users: the logical name, or the UUID when the
    /// sender did not supply one.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.uuid.to_string()
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// The locally known membership of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    view_id: u64,
    members: Vec<MemberId>,
}

impl MemberView {
    /// Creates the initial view containing only the local member.
    pub fn new(local: MemberId) -> Self {
        Self {
            view_id: 0,
            members: vec![local],
        }
    }

    /// Monotonically increasing view number.
    pub fn view_id(&self) -> u64 {
        self.view_id
    }

    /// Members in the order they were first seen.
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    /// Number of members in the view.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the view has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if a member with `uuid` is in the view.
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.members.iter().any(|m| &m.uuid == uuid)
    }

    /// Adds `member` if absent.  Returns `true` when the view changed.
    pub fn add(&mut self, member: MemberId) -> bool {
        if self.contains(&member.uuid) {
            return false;
        }
        self.members.push(member);
        self.view_id += 1;
        true
    }

    /// Removes the member with `uuid`.  Returns `true` when the view changed.
    pub fn remove(&mut self, uuid: &Uuid) -> bool {
        let before = self.members.len();
        self.members.retain(|m| &m.uuid != uuid);
        if self.members.len() == before {
            return false;
        }
        self.view_id += 1;
        true
    }
}

impl fmt::Display for MemberView {
    /// Renders as `[first|id] (n) [a, b, c]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self
            .members
            .first()
            .map(MemberId::display_name)
            .unwrap_or_default();
        let names: Vec<String> = self.members.iter().map(MemberId::display_name).collect();
        write!(
            f,
            "[{first}|{}] ({}) [{}]",
            self.view_id,
            self.members.len(),
            names.join(", ")
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
