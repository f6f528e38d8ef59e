pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::canvas::CanvasLinkService;
pub use application::loader::{BulkLoader, LoadSummary};
pub use application::notifier::{Mood, MoodEngine, MoodSignals, MoodTimings, TimerGroup};
pub use application::sync::SyncCoordinator;
pub use domain::models::{Project, ProjectSource, Record, RecordKind};
pub use domain::projection::{project, BucketLabel, DayBucket, Projection};
pub use infrastructure::config::{ApiConfig, Environment};
pub use infrastructure::error::{CacheError, GatewayError, SessionError, SyncError};
pub use infrastructure::gateway::{AllUserData, CanvasApi, HttpGateway, PlannerApi};
pub use infrastructure::record_cache::{InMemoryRecordCache, RecordCache, SqliteRecordCache};
pub use infrastructure::session::{InMemorySessionStore, KeyringSessionStore, SessionStore};
