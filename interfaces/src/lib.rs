pub mod baseline;
pub mod defs;
pub mod static_loader;

pub use baseline::BaselineQueryMatcher;
pub use static_loader::StaticLoader;
