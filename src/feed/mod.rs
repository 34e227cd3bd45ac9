mod fetch;
mod normalize;
mod parse;

pub use fetch::{
    fetch_feed_bytes, fetch_podcast, is_url, parse_podcast, read_feed_file, read_podcast_file,
};
pub use normalize::{NormalizeIssue, Normalized};
