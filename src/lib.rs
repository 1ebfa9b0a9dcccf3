pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod system;
pub mod web;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{ApiResult, DeliveryErrorKind, WebhookError};
pub use models::{
    DeliveryStatus, EventContext, EventType, NewSubscription, WebhookDelivery,
    WebhookEventPayload, WebhookSubscription,
};
pub use system::{SystemBuilder, WebhookEventSystem};
