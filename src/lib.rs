pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod twitter_parser;

pub use api::{HttpGateway, TwitterApi};
pub use cache::{TweetCache, TweetStore};
pub use config::Config;
pub use error::{ApiError, ResolveError};
pub use model::{Thread, Tweet, TweetId};
pub use render::Renderer;
pub use resolver::{ResolveOptions, ThreadResolver};
pub use scheduler::Scheduler;
