pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod sync;
pub mod upstream;

pub use config::Config;
pub use error::{StoreError, SyncError, UpstreamError};
pub use store::Store;
pub use sync::{CancelToken, RangeReport, Scheduler, Syncer};
pub use upstream::{Upstream, WakaTimeClient};
