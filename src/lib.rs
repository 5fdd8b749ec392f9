pub mod adapter;
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod constructors;
pub mod demand;
pub mod error;
pub mod operators;
pub mod pull;
pub mod pull_stream_ext;
pub mod push;
pub mod scheduler;

// Re-export the working surface at the crate root
pub use adapter::{into_stream, pull_to_push};
pub use bridge::DemandBridge;
pub use buffer::Buffered;
pub use config::{BridgeConfig, BufferPolicy};
pub use constructors::{defer, empty, fail, from_iter, just, Defer, Fail, Iter};
pub use demand::Demand;
pub use error::BridgeError;
pub use operators::{
    AsResult, AssertNoOverflow, DelaySubscription, ExponentialRetry, FlatMapLatest, Map,
    MapError, OnErrorResumeWith, RetryCursor, Scan, SwitchLatest, WithLatestFrom,
};
pub use pull::{
    BoxPullStream, Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};
pub use pull_stream_ext::PullStreamExt;
pub use push::{Disposal, PushObserver, PushSource, PushSubject};
pub use scheduler::{ScheduledHandle, Scheduler, TokioScheduler};
