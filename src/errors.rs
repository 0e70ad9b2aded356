use thiserror::Error;

#[derive(Debug, Error, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub enum QueueError {
    #[error("work queue is invalid or shut down")]
    Invalid,
    #[error("failed to allocate a work queue entry")]
    Allocation,
    #[error("synchronization primitive failure")]
    Sync,
    #[error("parallelism bound must be positive")]
    ZeroParallelism,
}
