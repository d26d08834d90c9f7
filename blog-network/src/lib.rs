pub mod types;
pub mod utils;
pub mod post;
pub mod options;
pub mod blog;
pub mod network;
mod select;

pub use types::*;
pub use post::{Post, SlotId};
pub use options::{Exclusions, SelectOptions, RECOGNIZED_OPTIONS};
pub use blog::{Blog, Posts};
pub use network::{Network, Selected};
pub use interfaces::{BaselineQueryMatcher, StaticLoader};
