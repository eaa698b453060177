//! Token estimation
//!
//! The window manager only needs a token count per piece of text. The default
//! estimator approximates one token per four characters; tiktoken and the
//! word-based estimator are drop-in replacements.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::{ContextError, Result};

/// Character class of a token piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Number,
    Punctuation,
    Whitespace,
}

/// A piece of text with its estimated cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub tokens: usize,
    pub kind: TokenKind,
}

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Split text into word/number/punctuation/whitespace pieces, each costed
    fn tokenize(&self, text: &str) -> Vec<Token> {
        segment(text)
            .into_iter()
            .map(|(piece, kind)| Token {
                text: piece.to_string(),
                tokens: self.estimate(piece),
                kind,
            })
            .collect()
    }
}

fn classify(c: char) -> TokenKind {
    if c.is_whitespace() {
        TokenKind::Whitespace
    } else if c.is_ascii_digit() {
        TokenKind::Number
    } else if c.is_alphanumeric() || c == '_' {
        TokenKind::Word
    } else {
        TokenKind::Punctuation
    }
}

/// Runs of the same class form one piece; punctuation is one piece per char
fn segment(text: &str) -> Vec<(&str, TokenKind)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut current: Option<TokenKind> = None;

    for (idx, c) in text.char_indices() {
        let kind = classify(c);
        match current {
            Some(prev) if prev == kind && kind != TokenKind::Punctuation => {}
            Some(prev) => {
                pieces.push((&text[start..idx], prev));
                start = idx;
                current = Some(kind);
            }
            None => current = Some(kind),
        }
    }
    if let Some(kind) = current {
        pieces.push((&text[start..], kind));
    }
    pieces
}

/// Fixed characters-per-token ratio, rounded up
#[derive(Debug, Clone)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Tiktoken-based token estimator using cl100k_base (GPT-4, GPT-3.5-turbo)
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| ContextError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Word-based token estimator (fallback, ~1.3 tokens per word)
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}
