//! Job consumption: the loop pulling jobs from a source and the worker pool running them.

mod consumer;
mod worker_pool;

pub use consumer::JobConsumer;
pub use worker_pool::WorkerPool;
