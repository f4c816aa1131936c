use crate::api::Reducer;
use crate::error::RecommendError;
use crate::recommend::record::{FriendRecord, MutualMarker, UserId};
use anyhow::Result;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TallyEntry {
    /// Mutual friends seen so far, in arrival order. Never empty.
    Mutuals(Vec<UserId>),
    /// Already a direct friend. Sticky for the rest of the group.
    Suppressed,
}

/// Per-group accumulator: candidate id -> mutual friends or tombstone.
#[derive(Debug, Default)]
pub struct CandidateTally {
    entries: HashMap<UserId, TallyEntry>,
}

impl CandidateTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &FriendRecord) {
        match record.marker {
            MutualMarker::AlreadyFriend => {
                self.entries.insert(record.candidate, TallyEntry::Suppressed);
            }
            MutualMarker::Via(mutual) => {
                let entry = self
                    .entries
                    .entry(record.candidate)
                    .or_insert_with(|| TallyEntry::Mutuals(Vec::with_capacity(1)));
                if let TallyEntry::Mutuals(list) = entry {
                    list.push(mutual);
                }
            }
        }
    }

    pub fn get(&self, candidate: UserId) -> Option<&TallyEntry> {
        self.entries.get(&candidate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops tombstones and orders survivors by (mutual count desc, id asc), keeping `limit`.
    pub fn rank(self, limit: usize) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = self
            .entries
            .into_iter()
            .filter_map(|(user, entry)| match entry {
                TallyEntry::Mutuals(mutual_friends) => Some(RankedCandidate { user, mutual_friends }),
                TallyEntry::Suppressed => None,
            })
            .collect();
        ranked.sort_unstable_by_key(|c| (Reverse(c.mutual_friends.len()), c.user));
        ranked.truncate(limit);
        for c in &mut ranked {
            c.mutual_friends.sort_unstable();
        }
        ranked
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedCandidate {
    pub user: UserId,
    /// Sorted ascending.
    pub mutual_friends: Vec<UserId>,
}

/// Final output for one user: `<user>\t<id>,<id>,...` when displayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub user: UserId,
    pub ranked: Vec<RankedCandidate>,
}

impl Recommendation {
    pub fn candidate_ids(&self) -> Vec<UserId> {
        self.ranked.iter().map(|c| c.user).collect()
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t", self.user)?;
        for (i, c) in self.ranked.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", c.user)?;
        }
        Ok(())
    }
}

/// Folds every record of one group into a fresh tally and ranks it.
pub fn recommend_for<I>(target: UserId, records: I, limit: usize) -> Result<Recommendation, RecommendError>
where
    I: IntoIterator<Item = FriendRecord>,
{
    let mut tally = CandidateTally::new();
    for record in records {
        if record.target_user != target {
            return Err(RecommendError::StructuralViolation { group: target, found: record.target_user });
        }
        tally.add(&record);
    }
    Ok(Recommendation { user: target, ranked: tally.rank(limit) })
}

#[derive(Clone, Copy, Debug)]
pub struct RecommendationReducer {
    limit: usize,
}

impl RecommendationReducer {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for RecommendationReducer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECOMMENDATIONS)
    }
}

impl Reducer for RecommendationReducer {
    type Key = UserId;
    type ValueIn = FriendRecord;
    type Out = Recommendation;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(Self::Out),
    {
        emit(recommend_for(*key, values, self.limit)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use crate::recommend::emit::emit_candidates;
    use crate::recommend::parse::parse_line;

    fn ids(records: Vec<FriendRecord>) -> Vec<UserId> {
        recommend_for(1, records, DEFAULT_MAX_RECOMMENDATIONS).unwrap().candidate_ids()
    }

    #[test]
    fn ranks_by_count_then_id() {
        let records = vec![
            FriendRecord::mutual(1, 30, 100),
            FriendRecord::mutual(1, 20, 100),
            FriendRecord::mutual(1, 20, 101),
            FriendRecord::mutual(1, 10, 102),
            FriendRecord::mutual(1, 40, 103),
            FriendRecord::mutual(1, 40, 104),
        ];
        assert_eq!(ids(records), vec![20, 40, 10, 30]);
    }

    #[test]
    fn already_friend_suppresses_in_any_position() {
        let mut records = vec![
            FriendRecord::mutual(1, 5, 100),
            FriendRecord::mutual(1, 5, 101),
            FriendRecord::mutual(1, 6, 100),
        ];
        records.insert(1, FriendRecord::already_friends(1, 5));
        assert_eq!(ids(records.clone()), vec![6]);

        records.rotate_left(1);
        assert_eq!(ids(records.clone()), vec![6]);
        records.reverse();
        assert_eq!(ids(records), vec![6]);
    }

    #[test]
    fn repeated_already_friend_is_idempotent() {
        let records = vec![
            FriendRecord::already_friends(1, 5),
            FriendRecord::mutual(1, 5, 100),
            FriendRecord::already_friends(1, 5),
            FriendRecord::mutual(1, 5, 101),
        ];
        let recommendation = recommend_for(1, records, 10).unwrap();
        assert!(recommendation.ranked.is_empty());
        assert_eq!(recommendation.to_string(), "1\t");
    }

    #[test]
    fn tally_tombstone_is_sticky() {
        let mut tally = CandidateTally::new();
        tally.add(&FriendRecord::mutual(1, 5, 100));
        tally.add(&FriendRecord::already_friends(1, 5));
        tally.add(&FriendRecord::mutual(1, 5, 101));
        assert_eq!(tally.get(5), Some(&TallyEntry::Suppressed));
        assert_eq!(tally.len(), 1);
    }

    #[test]
    fn truncates_to_limit_and_keeps_all_when_fewer() {
        let many: Vec<FriendRecord> = (0..25).map(|c| FriendRecord::mutual(1, c, 1000)).collect();
        assert_eq!(ids(many), (0..10).collect::<Vec<_>>());

        let few: Vec<FriendRecord> = (0..3).map(|c| FriendRecord::mutual(1, c, 1000)).collect();
        assert_eq!(ids(few), vec![0, 1, 2]);

        let custom = recommend_for(1, (0..25).map(|c| FriendRecord::mutual(1, c, 7)), 4).unwrap();
        assert_eq!(custom.candidate_ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn output_ignores_record_order() {
        let mut records = Vec::new();
        for candidate in 2..30 {
            for via in 0..(candidate % 5) {
                records.push(FriendRecord::mutual(1, candidate, 100 + via));
            }
            if candidate % 7 == 0 {
                records.push(FriendRecord::already_friends(1, candidate));
            }
        }
        let expected = recommend_for(1, records.clone(), 10).unwrap();

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            records.shuffle(&mut rng);
            assert_eq!(recommend_for(1, records.clone(), 10).unwrap(), expected);
        }
    }

    #[test]
    fn mutual_friends_are_reported_sorted() {
        let records = vec![
            FriendRecord::mutual(1, 9, 300),
            FriendRecord::mutual(1, 9, 100),
            FriendRecord::mutual(1, 9, 200),
        ];
        let r = recommend_for(1, records, 10).unwrap();
        assert_eq!(r.ranked, vec![RankedCandidate { user: 9, mutual_friends: vec![100, 200, 300] }]);
        assert_eq!(r.to_string(), "1\t9");
    }

    #[test]
    fn foreign_record_is_structural_violation() {
        let err = recommend_for(1, vec![FriendRecord::mutual(2, 3, 4)], 10).unwrap_err();
        assert!(matches!(err, RecommendError::StructuralViolation { group: 1, found: 2 }));
    }

    #[test]
    fn reducer_emits_exactly_one_record() {
        let mut out = Vec::new();
        RecommendationReducer::default()
            .do_reduce(&3, vec![FriendRecord::mutual(3, 8, 1)], &mut |r| out.push(r.to_string()))
            .unwrap();
        assert_eq!(out, vec!["3\t8".to_string()]);
    }

    fn recommend_all(lines: &[&str]) -> Vec<String> {
        let mut groups: std::collections::BTreeMap<UserId, Vec<FriendRecord>> = Default::default();
        for line in lines {
            let edge = parse_line(line).unwrap();
            emit_candidates(&edge, &mut |k, r| groups.entry(k).or_default().push(r));
        }
        groups
            .into_iter()
            .map(|(user, records)| recommend_for(user, records, 10).unwrap().to_string())
            .collect()
    }

    #[test]
    fn self_reference_is_never_recommended() {
        assert_eq!(recommend_all(&["1\t1"]), vec!["1\t"]);
        assert_eq!(
            recommend_all(&["1\t1,2,3", "2\t1", "3\t1"]),
            vec!["1\t", "2\t3", "3\t2"]
        );
    }

    #[test]
    fn duplicate_friend_becomes_its_own_candidate() {
        assert_eq!(recommend_all(&["1\t2,2", "2\t1"]), vec!["1\t", "2\t2"]);
        let r = recommend_for(
            2,
            vec![FriendRecord::mutual(2, 2, 1), FriendRecord::mutual(2, 2, 1), FriendRecord::already_friends(2, 1)],
            10,
        )
        .unwrap();
        assert_eq!(r.ranked, vec![RankedCandidate { user: 2, mutual_friends: vec![1, 1] }]);
    }
}
