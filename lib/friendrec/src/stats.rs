use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct MapTaskStats {
    pub task_id: usize,
    pub num_files: u64,
    pub total_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SortTaskStats {
    pub reducer: usize,
    pub input_files: u64,
    pub lines_in: u64,
    pub bytes_in: u64,
    pub wall_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ReduceTaskStats {
    pub reducer: usize,
    pub lines_in: u64,
    pub groups: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct MapStats {
    pub tasks: usize,
    pub total_emits: u64,
    pub total_bytes_out: u64,
    pub total_flushes: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct SortStatsAgg {
    pub reducers: usize,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct ReduceStatsAgg {
    pub reducers: usize,
    pub total_lines: u64,
    pub total_groups: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug)]
pub struct StatsCollector {
    pub map: Option<MapStats>,
    pub sort: Option<SortStatsAgg>,
    pub reduce: Option<ReduceStatsAgg>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_map(&mut self, per_task: &[MapTaskStats], wall_ms: u64) {
        if per_task.is_empty() {
            return;
        }
        let s = MapStats {
            tasks: per_task.len(),
            total_emits: per_task.iter().map(|t| t.total_emits).sum(),
            total_bytes_out: per_task.iter().map(|t| t.total_bytes_out).sum(),
            total_flushes: per_task.iter().map(|t| t.total_flushes).sum(),
            min_task_ms: per_task.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_task_ms: per_task.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        info!(phase = "map",
              tasks = s.tasks, total_emits = s.total_emits, total_bytes_out = s.total_bytes_out, total_flushes = s.total_flushes,
              min_task_ms = s.min_task_ms, max_task_ms = s.max_task_ms, wall_ms,
              "Map phase complete");
        self.map = Some(s);
    }

    pub fn record_sort(&mut self, per_reducer: &[SortTaskStats], wall_ms: u64) {
        if per_reducer.is_empty() {
            return;
        }
        let s = SortStatsAgg {
            reducers: per_reducer.len(),
            total_lines: per_reducer.iter().map(|t| t.lines_in).sum(),
            total_bytes: per_reducer.iter().map(|t| t.bytes_in).sum(),
            min_reducer_ms: per_reducer.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        info!(phase = "sort",
              reducers = s.reducers, total_lines = s.total_lines, total_bytes = s.total_bytes,
              min_reducer_ms = s.min_reducer_ms, max_reducer_ms = s.max_reducer_ms, wall_ms,
              "Sort phase complete");
        self.sort = Some(s);
    }

    pub fn record_reduce(&mut self, per_reducer: &[ReduceTaskStats], wall_ms: u64) {
        if per_reducer.is_empty() {
            return;
        }
        let s = ReduceStatsAgg {
            reducers: per_reducer.len(),
            total_lines: per_reducer.iter().map(|t| t.lines_in).sum(),
            total_groups: per_reducer.iter().map(|t| t.groups).sum(),
            min_reducer_ms: per_reducer.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_reducer_ms: per_reducer.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        };
        info!(phase = "reduce",
              reducers = s.reducers, total_lines = s.total_lines, total_groups = s.total_groups,
              min_reducer_ms = s.min_reducer_ms, max_reducer_ms = s.max_reducer_ms, wall_ms,
              "Reduce phase complete");
        self.reduce = Some(s);
    }
}
