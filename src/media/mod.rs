pub mod frames;
pub mod extractor;
