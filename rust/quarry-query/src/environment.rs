use std::sync::Arc;

use quarry_planner::ShardMetadata;
use quarry_sorted_set::SortedSetFileHandlerFactory;
use quarry_source::SourceFactory;
use quarry_workflow::ThreadPool;

/// Everything a shard query reads from or writes to, besides its options.
#[derive(Clone)]
pub struct ShardEnvironment {
    pub metadata: Arc<dyn ShardMetadata>,
    /// Creates cursors over the shard table.
    pub sources: Arc<dyn SourceFactory>,
    /// Where ivarator sets spill their partitions.
    pub spill: Arc<dyn SortedSetFileHandlerFactory>,
    /// Runs ivarator population.
    pub thread_pool: ThreadPool,
}

impl ShardEnvironment {
    /// Uses the global worker pool for ivarator population.
    pub fn new(
        metadata: Arc<dyn ShardMetadata>,
        sources: Arc<dyn SourceFactory>,
        spill: Arc<dyn SortedSetFileHandlerFactory>,
    ) -> ShardEnvironment {
        ShardEnvironment {
            metadata,
            sources,
            spill,
            thread_pool: ThreadPool::global().clone(),
        }
    }

    pub fn with_thread_pool(mut self, thread_pool: ThreadPool) -> ShardEnvironment {
        self.thread_pool = thread_pool;
        self
    }
}
