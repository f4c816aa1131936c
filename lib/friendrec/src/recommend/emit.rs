use crate::api::Mapper;
use crate::error::RecommendError;
use crate::recommend::parse::{parse_line, EdgeLine};
use crate::recommend::record::{FriendRecord, UserId};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// What to do with a line that fails to parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Log the line, count it and keep going.
    #[default]
    Skip,
    /// Fail the job on the first bad line.
    Abort,
}

/// Emits already-friend markers and mutual-friend candidates for one parsed line.
///
/// For friends `F` of `user` this emits `|F|` already-friend records keyed by
/// `user`, then two records per unordered pair of `F` naming `user` as the
/// mutual friend.
pub fn emit_candidates<F>(edge: &EdgeLine, emit: &mut F)
where
    F: FnMut(UserId, FriendRecord),
{
    let EdgeLine { user, friends } = edge;
    for &friend in friends {
        emit(*user, FriendRecord::already_friends(*user, friend));
    }
    for (i, &a) in friends.iter().enumerate() {
        for &b in &friends[i + 1..] {
            emit(a, FriendRecord::mutual(a, b, *user));
            emit(b, FriendRecord::mutual(b, a, *user));
        }
    }
}

/// Map side of the job: text lines in, `(target user, FriendRecord)` pairs out.
#[derive(Debug, Default)]
pub struct CandidateEmitter {
    policy: ParsePolicy,
    skipped: Arc<AtomicU64>,
}

impl CandidateEmitter {
    pub fn new(policy: ParsePolicy) -> Self {
        Self { policy, skipped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    /// Number of lines rejected so far under [`ParsePolicy::Skip`].
    pub fn skipped_lines(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Shared handle on the skip count, readable after the emitter has been handed to an engine.
    pub fn skip_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.skipped)
    }
}

impl Mapper for CandidateEmitter {
    type Input = String;
    type Key = UserId;
    type Value = FriendRecord;

    fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::Input>,
        F: FnMut(Self::Key, Self::Value),
    {
        for line in input {
            if line.trim_end_matches(['\n', '\r']).is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(edge) => emit_candidates(&edge, emit),
                Err(e) => match self.policy {
                    ParsePolicy::Skip => {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "skipping malformed line");
                    }
                    ParsePolicy::Abort => return Err(RecommendError::from(e).into()),
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::record::MutualMarker;

    fn collect(line: &str) -> Vec<(UserId, FriendRecord)> {
        let mut out = Vec::new();
        let edge = parse_line(line).unwrap();
        emit_candidates(&edge, &mut |k, v| out.push((k, v)));
        out
    }

    #[test]
    fn emits_friend_markers_and_pair_candidates() {
        let out = collect("1\t2,3");
        assert_eq!(
            out,
            vec![
                (1, FriendRecord::already_friends(1, 2)),
                (1, FriendRecord::already_friends(1, 3)),
                (2, FriendRecord::mutual(2, 3, 1)),
                (3, FriendRecord::mutual(3, 2, 1)),
            ]
        );
    }

    #[test]
    fn record_counts_are_linear_plus_quadratic() {
        for n in 0..8i64 {
            let friends: Vec<String> = (100..100 + n).map(|f| f.to_string()).collect();
            let line = format!("1\t{}", friends.join(","));
            let out = collect(&line);
            let already = out.iter().filter(|(_, r)| r.is_already_friend()).count() as i64;
            let mutual = out.len() as i64 - already;
            assert_eq!(already, n);
            assert_eq!(mutual, n * (n - 1));
            assert!(out
                .iter()
                .filter(|(_, r)| !r.is_already_friend())
                .all(|(_, r)| r.marker == MutualMarker::Via(1)));
        }
    }

    #[test]
    fn key_always_matches_target_user() {
        assert!(collect("9\t1,2,3,4").iter().all(|(k, r)| *k == r.target_user));
    }

    #[test]
    fn no_friends_emits_nothing() {
        assert!(collect("5").is_empty());
    }

    #[test]
    fn skip_policy_counts_bad_lines() {
        let emitter = CandidateEmitter::new(ParsePolicy::Skip);
        let mut emitted = 0usize;
        let lines = vec!["1\t2".to_string(), "oops".to_string(), "".to_string(), "2\t1,x".to_string()];
        emitter.do_map(lines, &mut |_, _| emitted += 1).unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(emitter.skipped_lines(), 2);
    }

    #[test]
    fn abort_policy_fails_with_parse_error() {
        let emitter = CandidateEmitter::new(ParsePolicy::Abort);
        let err = emitter
            .do_map(vec!["1\t2".to_string(), "x\t1".to_string()], &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecommendError>(),
            Some(RecommendError::Parse(_))
        ));
    }
}
