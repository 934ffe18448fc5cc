//! HTTP front door and background worker for the research pipeline.

pub mod routes;
pub mod worker;

pub use routes::{router, AppState};
pub use worker::{job_queue, spawn_worker, QueueDispatcher};
