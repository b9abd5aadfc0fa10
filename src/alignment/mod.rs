pub mod aggregation;
pub mod spans;
pub mod tokenization;
pub mod viterbi;
pub mod vocabulary;
