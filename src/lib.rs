use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;
use std::sync::Arc;

pub mod ai;
pub mod config;
pub mod extract;
pub mod highlight;
pub mod middleware;
pub mod pipeline;
pub mod positions;
pub mod roles;
pub mod scoring;
pub mod utils;
pub mod wizard;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub ai: ai::AiClient,
}
