//! Token table: maps model output ids to text pieces.
//!
//! The file format is one `piece id` pair per line, e.g.
//!
//! ```text
//! <blk> 0
//! ▁THE 1
//! S 2
//! ```
//!
//! Ids must be dense (`0..len`). The word-boundary marker `▁` is rendered as
//! a space when text is assembled.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{EarshotError, Result};

/// Token id as emitted by the joiner.
pub type TokenId = u32;

/// SentencePiece word-boundary marker.
pub const WORD_BOUNDARY: char = '\u{2581}';

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pieces: Vec<String>,
    ids: HashMap<String, TokenId>,
}

impl SymbolTable {
    /// Build from pieces already in id order.
    pub fn from_pieces<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<String> = pieces.into_iter().map(Into::into).collect();
        let ids = pieces
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i as TokenId))
            .collect();
        Self { pieces, ids }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries: Vec<(TokenId, String)> = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            // The piece itself may be a single space, so split from the right.
            let (piece, id) = line.rsplit_once(char::is_whitespace).ok_or_else(|| {
                EarshotError::TokenTable {
                    line: line_no,
                    reason: format!("expected '<piece> <id>', found '{line}'"),
                }
            })?;
            let id: TokenId = id.parse().map_err(|_| EarshotError::TokenTable {
                line: line_no,
                reason: format!("id '{id}' is not a non-negative integer"),
            })?;
            let piece = if piece.trim().is_empty() {
                piece.to_string()
            } else {
                piece.trim().to_string()
            };
            entries.push((id, piece));
        }

        if entries.is_empty() {
            return Err(EarshotError::TokenTable {
                line: 0,
                reason: "token table is empty".into(),
            });
        }

        entries.sort_by_key(|(id, _)| *id);
        for (expected, (id, _)) in entries.iter().enumerate() {
            if *id as usize != expected {
                return Err(EarshotError::TokenTable {
                    line: 0,
                    reason: format!("ids must be dense: expected {expected}, found {id}"),
                });
            }
        }

        Ok(Self::from_pieces(entries.into_iter().map(|(_, p)| p)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn piece(&self, id: TokenId) -> Option<&str> {
        self.pieces.get(id as usize).map(String::as_str)
    }

    pub fn id(&self, piece: &str) -> Option<TokenId> {
        self.ids.get(piece).copied()
    }

    /// Concatenate pieces, turning word-boundary markers into spaces.
    /// Leading whitespace is dropped.
    pub fn detokenize(&self, tokens: &[TokenId]) -> String {
        let mut text = String::new();
        for &t in tokens {
            if let Some(p) = self.piece(t) {
                text.push_str(p);
            }
        }
        let text = text.replace(WORD_BOUNDARY, " ");
        text.trim_start().to_string()
    }
}
