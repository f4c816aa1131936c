use crate::api::Grouping;
use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;

/// Buckets pairs in a hash map, then reduces buckets in parallel.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashGrouping;

impl Grouping for HashGrouping {
    fn group_by_key<K, V, T, H>(&self, pairs: Vec<(K, V)>, handler: H) -> Result<Vec<(K, T)>>
    where
        K: Hash + Ord + Send + Sync,
        V: Send,
        T: Send,
        H: Fn(&K, Vec<V>) -> Result<T> + Send + Sync,
    {
        let mut groups: HashMap<K, Vec<V>> = HashMap::new();
        for (k, v) in pairs {
            groups.entry(k).or_default().push(v);
        }
        let mut groups: Vec<(K, Vec<V>)> = groups.into_iter().collect();
        groups.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));
        groups
            .into_par_iter()
            .map(|(k, vals)| -> Result<(K, T)> {
                let out = handler(&k, vals)?;
                Ok((k, out))
            })
            .collect()
    }
}

/// Sorts pairs by key and cuts the sorted run at key boundaries, the way an
/// external sort-based shuffle hands groups to reducers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SortGrouping;

impl Grouping for SortGrouping {
    fn group_by_key<K, V, T, H>(&self, mut pairs: Vec<(K, V)>, handler: H) -> Result<Vec<(K, T)>>
    where
        K: Hash + Ord + Send + Sync,
        V: Send,
        T: Send,
        H: Fn(&K, Vec<V>) -> Result<T> + Send + Sync,
    {
        pairs.par_sort_by(|a, b| a.0.cmp(&b.0));

        let mut groups: Vec<(K, Vec<V>)> = Vec::new();
        for (k, v) in pairs {
            match groups.last_mut() {
                Some((cur, vals)) if *cur == k => vals.push(v),
                _ => groups.push((k, vec![v])),
            }
        }
        groups
            .into_par_iter()
            .map(|(k, vals)| -> Result<(K, T)> {
                let out = handler(&k, vals)?;
                Ok((k, out))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<(u32, &'static str)> {
        vec![(3, "c"), (1, "a"), (3, "cc"), (2, "b"), (1, "aa"), (3, "ccc")]
    }

    fn sizes<G: Grouping>(g: G) -> Vec<(u32, usize)> {
        g.group_by_key(pairs(), |_, vals| Ok(vals.len())).unwrap()
    }

    #[test]
    fn hash_grouping_calls_once_per_key_in_key_order() {
        assert_eq!(sizes(HashGrouping), vec![(1, 2), (2, 1), (3, 3)]);
    }

    #[test]
    fn sort_grouping_matches_hash_grouping() {
        assert_eq!(sizes(SortGrouping), sizes(HashGrouping));
    }

    #[test]
    fn handler_error_propagates() {
        let res = SortGrouping.group_by_key(pairs(), |k, _| {
            if *k == 2 {
                anyhow::bail!("boom")
            }
            Ok(())
        });
        assert!(res.is_err());
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let out = HashGrouping.group_by_key(Vec::<(u32, u32)>::new(), |_, v| Ok(v.len())).unwrap();
        assert!(out.is_empty());
    }
}
