//! Ordered single-consumer job queue

pub mod scheduler;

pub use scheduler::{JobQueue, PositionReceiver};
