pub mod health;
pub mod metrics;

pub use health::{
    AppState, ComponentHealth, HealthResponse, HealthServer, HealthStatus,
};
pub use metrics::Metrics;
