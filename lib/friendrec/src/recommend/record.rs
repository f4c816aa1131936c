use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Why `candidate` was emitted for `target_user`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutualMarker {
    /// The two are already direct friends; never recommend.
    AlreadyFriend,
    /// The given user is a friend of both.
    Via(UserId),
}

/// Intermediate record passed from the emitter to the reducer, keyed by `target_user`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FriendRecord {
    pub target_user: UserId,
    pub candidate: UserId,
    pub marker: MutualMarker,
}

impl FriendRecord {
    pub fn already_friends(target_user: UserId, candidate: UserId) -> Self {
        Self { target_user, candidate, marker: MutualMarker::AlreadyFriend }
    }

    pub fn mutual(target_user: UserId, candidate: UserId, via: UserId) -> Self {
        Self { target_user, candidate, marker: MutualMarker::Via(via) }
    }

    pub fn is_already_friend(&self) -> bool {
        matches!(self.marker, MutualMarker::AlreadyFriend)
    }
}
