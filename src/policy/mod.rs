//! Lockdown policies: dial vectors and their application over time.

pub mod dial;
pub mod timeline;

pub use dial::{Dial, PolicyVector, DIAL_COUNT};
pub use timeline::{
    PolicyApplication, PolicyEnd, PolicyTimeline, TimelineBuilder, TimelineIndex,
    DEFAULT_OPEN_ENDED_DAYS,
};
