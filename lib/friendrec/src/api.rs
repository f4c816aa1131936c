use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::hash::Hash;

// ========== Core MapReduce traits ==========

pub trait Mapper {
    type Input: Send + 'static;
    type Key: Send + Sync + Serialize + DeserializeOwned + Hash + Ord + Clone + 'static;
    type Value: Send + Sync + Serialize + DeserializeOwned + Clone + 'static;

    /// Feeds every input record through the mapper. An `Err` aborts the whole job.
    fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::Input>,
        F: FnMut(Self::Key, Self::Value);
}

/// Reducer produces typed output records for one grouped key.
/// The values arrive in no particular order; the engine guarantees that every
/// value emitted for `key` anywhere in the job is present.
pub trait Reducer {
    type Key: Send + Sync + Serialize + DeserializeOwned + Hash + Ord + Clone + 'static;
    type ValueIn: Send + Sync + Serialize + DeserializeOwned + Clone + 'static;
    type Out: Send + Display + 'static;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(Self::Out);
}

// ========== Grouping contract ==========

/// Given emitted (key, value) pairs, invoke `handler` once per distinct key with
/// all values sharing that key. Results come back ordered by ascending key.
///
/// Implementations may call `handler` concurrently for different keys, never
/// twice for the same key.
pub trait Grouping: Send + Sync {
    fn group_by_key<K, V, T, H>(&self, pairs: Vec<(K, V)>, handler: H) -> Result<Vec<(K, T)>>
    where
        K: Hash + Ord + Send + Sync,
        V: Send,
        T: Send,
        H: Fn(&K, Vec<V>) -> Result<T> + Send + Sync;
}

// ========== Executable pipeline interface ==========

pub trait ExecutablePipeline {
    fn add_input(&mut self, input_path: impl Into<String>);
    fn add_output(&mut self, output_path: impl Into<String>);

    fn map_reduce<M, R>(&mut self, mapper: M, reducer: R) -> Result<()>
    where
        M: Mapper<Input = String> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static;
}
