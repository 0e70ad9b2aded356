use super::errors::QueueError;

pub type QueueResult<T> = Result<T, QueueError>;
