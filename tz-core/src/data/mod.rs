//! Data types shared by the engine and its callers

mod types;

pub use types::{
    Admission, Band, Completion, PendingInfo, RequestId, Timeout, WatchRequest, WatchSpec,
    ZoneSnapshot, READING_SIZE,
};
