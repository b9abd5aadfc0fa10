pub mod normalizer;
pub mod segmenter;
