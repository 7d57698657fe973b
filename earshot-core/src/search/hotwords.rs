//! Hotword boosting graph.
//!
//! ## Design
//!
//! Phrases are token sequences inserted into a trie; fail and output links
//! are then filled breadth-first, Aho-Corasick style. A beam hypothesis
//! carries the index of the graph node it has reached, and every emitted
//! token moves it with [`ContextGraph::forward_one_step`]:
//!
//! ```text
//!   root ─A─▶ n1 ─B─▶ n2 (end of "A B")
//!     └──B─▶ n3 (end of "B")        n2.fail = n3
//! ```
//!
//! * A matching arc earns the arc's token score.
//! * A miss falls back through fail links, and the score earned so far on the
//!   abandoned partial match is taken back.
//! * Reaching a node whose suffix completes a phrase adds that phrase's total.
//!
//! Nodes live in a `Vec` and refer to each other by index, root is index 0.

use std::collections::{BTreeMap, VecDeque};
use std::io::BufRead;

use crate::error::{EarshotError, Result};
use crate::tokens::{SymbolTable, TokenId};

/// Node index into the graph arena.
pub type StateId = usize;

pub const ROOT: StateId = 0;

#[derive(Debug, Clone)]
struct Node {
    token_score: f32,
    node_score: f32,
    output_score: f32,
    is_end: bool,
    next: BTreeMap<TokenId, StateId>,
    fail: StateId,
}

impl Node {
    fn root() -> Self {
        Self {
            token_score: 0.0,
            node_score: 0.0,
            output_score: 0.0,
            is_end: false,
            next: BTreeMap::new(),
            fail: ROOT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextGraph {
    nodes: Vec<Node>,
    context_score: f32,
}

impl ContextGraph {
    /// Build from `(tokens, score)` pairs. A score of 0 means "use
    /// `context_score` per token"; otherwise the phrase score is spread
    /// evenly over its tokens.
    pub fn new(phrases: &[(Vec<TokenId>, f32)], context_score: f32) -> Self {
        let mut graph = Self {
            nodes: vec![Node::root()],
            context_score,
        };
        for (tokens, score) in phrases {
            graph.insert(tokens, *score);
        }
        graph.fill_fail_output();
        graph
    }

    /// Parse hotword lines (pieces separated by whitespace) against the token
    /// table. Blank lines are skipped. An unknown piece is an error.
    pub fn parse_phrases<R: BufRead>(
        reader: R,
        symbols: &SymbolTable,
    ) -> Result<Vec<Vec<TokenId>>> {
        let mut phrases = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let ids = line
                .split_whitespace()
                .map(|piece| {
                    symbols.id(piece).ok_or_else(|| EarshotError::UnknownHotword {
                        piece: piece.to_string(),
                        line: idx + 1,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if !ids.is_empty() {
                phrases.push(ids);
            }
        }
        Ok(phrases)
    }

    pub fn num_states(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].next.is_empty()
    }

    fn insert(&mut self, tokens: &[TokenId], score: f32) {
        if tokens.is_empty() {
            return;
        }
        let token_score = if score == 0.0 {
            self.context_score
        } else {
            score / tokens.len() as f32
        };

        let mut node = ROOT;
        for (j, &token) in tokens.iter().enumerate() {
            let is_end = j + 1 == tokens.len();
            let parent_score = self.nodes[node].node_score;
            node = match self.nodes[node].next.get(&token).copied() {
                Some(child) => {
                    let c = &mut self.nodes[child];
                    c.is_end |= is_end;
                    c.token_score = c.token_score.max(token_score);
                    c.node_score = parent_score + c.token_score;
                    c.output_score = if c.is_end { c.node_score } else { 0.0 };
                    child
                }
                None => {
                    let child = self.nodes.len();
                    let node_score = parent_score + token_score;
                    self.nodes.push(Node {
                        token_score,
                        node_score,
                        output_score: if is_end { node_score } else { 0.0 },
                        is_end,
                        next: BTreeMap::new(),
                        fail: ROOT,
                    });
                    self.nodes[node].next.insert(token, child);
                    child
                }
            };
        }
    }

    /// Follow fail links from `from` until a node with an arc on `token` is
    /// found, and return that arc's target (or root).
    fn goto(&self, mut from: StateId, token: TokenId) -> StateId {
        loop {
            if let Some(&next) = self.nodes[from].next.get(&token) {
                return next;
            }
            if from == ROOT {
                return ROOT;
            }
            from = self.nodes[from].fail;
        }
    }

    fn fill_fail_output(&mut self) {
        let mut queue: VecDeque<StateId> = self.nodes[ROOT].next.values().copied().collect();
        for &child in &queue {
            self.nodes[child].fail = ROOT;
        }

        while let Some(current) = queue.pop_front() {
            let arcs: Vec<(TokenId, StateId)> = self.nodes[current]
                .next
                .iter()
                .map(|(&t, &c)| (t, c))
                .collect();
            for (token, child) in arcs {
                let fail = self.goto(self.nodes[current].fail, token);
                self.nodes[child].fail = fail;

                // Nearest proper suffix that completes a phrase.
                let mut output = fail;
                while output != ROOT && !self.nodes[output].is_end {
                    output = self.nodes[output].fail;
                }
                if output != ROOT {
                    let extra = self.nodes[output].output_score;
                    self.nodes[child].output_score += extra;
                }
                queue.push_back(child);
            }
        }
    }

    /// Advance `state` by `token`. Returns the score delta and the new state.
    pub fn forward_one_step(&self, state: StateId, token: TokenId) -> (f32, StateId) {
        let (score, node) = match self.nodes[state].next.get(&token) {
            Some(&next) => (self.nodes[next].token_score, next),
            None => {
                let node = if state == ROOT {
                    ROOT
                } else {
                    self.goto(self.nodes[state].fail, token)
                };
                (self.nodes[node].node_score - self.nodes[state].node_score, node)
            }
        };
        (score + self.nodes[node].output_score, node)
    }

    /// Cancel a dangling partial match. Returns the score to add and root.
    pub fn finalize(&self, state: StateId) -> (f32, StateId) {
        (-self.nodes[state].node_score, ROOT)
    }
}
