pub mod server;

pub use server::{ExitReason, RequestHandler, WorkerError, WorkerServer};
