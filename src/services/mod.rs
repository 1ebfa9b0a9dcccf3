pub mod backoff;
pub mod clock;
pub mod dispatcher;
pub mod emitter;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod sender;
pub mod signature;
