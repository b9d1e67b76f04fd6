pub mod config;
pub mod error;
pub mod http;
pub mod memory_store;
pub mod notify;
pub mod optimistic;
pub mod position;
pub mod store_client;

pub use config::{Config, ScheduleConfig, ScrapeConfig, StoreConfig};
pub use error::{CrawlerError, CrawlerResult, StoreError};
pub use memory_store::MemoryStore;
pub use notify::{Notifier, UpdateNotification};
pub use optimistic::{overwrite_with_retry, store_with_retry, BeforeOverwrite, RetryPolicy};
pub use position::Position;
pub use store_client::{ArtifactStore, GithubStoreClient, StoreEntry, StoredObject};
