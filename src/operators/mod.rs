//! Derived pull-stream operators.

pub mod delay_subscription;
pub mod map;
pub mod recover;
pub mod retry;
pub mod switch_latest;
pub mod with_latest_from;

pub use delay_subscription::DelaySubscription;
pub use map::{Map, MapError, Scan};
pub use recover::{AsResult, AssertNoOverflow, OnErrorResumeWith};
pub use retry::{ExponentialRetry, RetryCursor};
pub use switch_latest::{FlatMapLatest, SwitchLatest};
pub use with_latest_from::WithLatestFrom;
