mod image;
mod podcast;

pub use image::{Image, Version, mime_type_of};
pub use podcast::{Episode, Podcast};
