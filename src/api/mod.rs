//! Operations exposed to the host application
//!
//! Each handler on [`StoreApi`] wraps one storage or analysis operation in
//! an [`ApiResponse`] envelope so callers across a process boundary get a
//! uniform success/error shape.

mod response;
mod store;

pub use response::{ApiError, ApiResponse};
pub use store::{
    CheckpointOptionsUpdate, CheckpointStatus, JournalModeChange, ReindexOutcome, StoreApi,
    WalInfo, WalStatus,
};
