use crate::alignment::vocabulary::Vocabulary;
use crate::error::AlignmentError;
use crate::pipeline::traits::{Normalizer, Romanizer};
use crate::types::{TextSegment, Token, TokenSequence};

/// Normalizes and romanizes every segment, then lays the words out as
/// tokens after the leading sentinel.
///
/// Words with no character the model knows are dropped; a segment made only
/// of such words keeps an empty token list.
pub fn build_token_sequence(
    mut segments: Vec<TextSegment>,
    normalizer: &dyn Normalizer,
    romanizer: &dyn Romanizer,
    vocab: &Vocabulary,
    language: Option<&str>,
) -> Result<TokenSequence, AlignmentError> {
    let normalized = segments
        .iter()
        .map(|segment| normalizer.normalize(segment.raw_text.trim(), language))
        .collect::<Result<Vec<_>, _>>()?;
    let romanized = romanizer.romanize(&normalized, language)?;
    if romanized.len() != segments.len() {
        return Err(AlignmentError::normalization(format!(
            "romanizer returned {} lines for {} segments",
            romanized.len(),
            segments.len()
        )));
    }

    let mut tokens = vec![Token::sentinel()];
    let mut symbols = vec![vocab.resolve(&tokens[0].romanized)];

    for ((segment, normalized_line), romanized_line) in
        segments.iter_mut().zip(&normalized).zip(romanized)
    {
        let raw_words: Vec<&str> = segment.raw_text.split_whitespace().collect();
        let norm_words: Vec<&str> = normalized_line.split_whitespace().collect();
        let rom_words: Vec<&str> = romanized_line.split_whitespace().collect();
        // word-level pairing only holds when nothing was merged or split
        let aligned_raw = raw_words.len() == rom_words.len();
        let aligned_norm = norm_words.len() == rom_words.len();

        segment.token_indices.clear();
        for (position, word) in rom_words.iter().copied().enumerate() {
            let word_symbols = vocab.resolve(word);
            if word_symbols.is_empty() {
                tracing::debug!(
                    segment = segment.index,
                    word,
                    "tokenization: word has no known symbols, skipping"
                );
                continue;
            }
            let index = tokens.len();
            tokens.push(Token {
                index,
                raw_text: if aligned_raw { raw_words[position] } else { word }.to_string(),
                normalized: if aligned_norm { norm_words[position] } else { word }.to_string(),
                romanized: word.to_string(),
                segment: Some(segment.index),
            });
            symbols.push(word_symbols);
            segment.token_indices.push(index);
        }
        segment.romanized = rom_words.join(" ");

        if segment.token_indices.is_empty() {
            tracing::warn!(
                segment = segment.index,
                text = segment.raw_text.as_str(),
                "tokenization: segment has nothing to align"
            );
        }
    }

    tracing::debug!(
        segments = segments.len(),
        tokens = tokens.len(),
        symbols = symbols.iter().map(Vec::len).sum::<usize>(),
        "tokenization: built token sequence"
    );

    Ok(TokenSequence {
        tokens,
        symbols,
        segments,
    })
}
