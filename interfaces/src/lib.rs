pub mod defs;

pub use defs::{CanonicalMedia, MediaImage, MediaVideo, NormalizedItem, RawItem};
