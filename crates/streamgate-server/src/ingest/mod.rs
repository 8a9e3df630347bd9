pub mod feeds;
pub mod status;

pub use feeds::{FeedWatcher, LiveFeed, DEFAULT_STAT_URL};
pub use status::{parse_stat_xml, StreamStats};
