//! Modified beam search.
//!
//! Like greedy search, every frame emits at most one token per path, but
//! `num_active_paths` paths survive each frame. Per frame:
//!
//! 1. take the best `k` hypotheses by length-normalised score;
//! 2. score every `(hypothesis, token)` extension with the joiner's
//!    log-softmax plus the hypothesis score (plus a hotword boost);
//! 3. keep the best `k` extensions, merging equal token sequences.

use ndarray::ArrayView2;

use super::{decoder_context, log_softmax, ContextGraph, DecoderResult, Hypotheses};
use crate::error::Result;
use crate::inference::TransducerModel;
use crate::tokens::TokenId;

pub fn search<M: TransducerModel>(
    model: &M,
    encoder_out: ArrayView2<'_, f32>,
    result: &mut DecoderResult,
    num_active_paths: usize,
    context_graph: Option<&ContextGraph>,
) -> Result<()> {
    let meta = model.meta();
    let (blank, context_size) = (meta.blank_id, meta.context_size);
    let k = num_active_paths.max(1);

    let mut cur = std::mem::take(&mut result.hyps);
    if cur.is_empty() {
        cur = Hypotheses::initial();
    }

    for (t, frame) in encoder_out.outer_iter().enumerate() {
        let prev = cur.top_k(k, context_size);

        // (score, hypothesis index, token)
        let mut candidates: Vec<(f64, usize, TokenId)> =
            Vec::with_capacity(prev.len() * meta.vocab_size);
        for (i, hyp) in prev.iter().enumerate() {
            let decoder_out = model.run_decoder(&decoder_context(&hyp.ys, context_size, blank))?;
            let mut logits = model.run_joiner(frame, decoder_out.view())?;
            log_softmax(&mut logits);
            candidates.extend(
                logits
                    .iter()
                    .enumerate()
                    .map(|(token, &lp)| (hyp.log_prob + lp as f64, i, token as TokenId)),
            );
        }
        // Stable: equal scores stay in (hypothesis, token) order.
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(k);

        let mut next = Hypotheses::default();
        for (score, i, token) in candidates {
            let mut hyp = prev[i].clone();
            hyp.log_prob = score;
            if token == blank {
                hyp.num_trailing_blanks += 1;
            } else {
                hyp.ys.push(token);
                hyp.timestamps.push(result.frame_offset + t as u32);
                hyp.num_trailing_blanks = 0;
                if let Some(graph) = context_graph {
                    let (boost, state) = graph.forward_one_step(hyp.context_state, token);
                    hyp.log_prob += boost as f64;
                    hyp.context_state = state;
                }
            }
            next.add(hyp);
        }
        cur = next;
    }

    result.frame_offset += encoder_out.nrows() as u32;
    if let Some(best) = cur.best(context_size) {
        result.tokens = best.ys.clone();
        result.timestamps = best.timestamps.clone();
        result.num_trailing_blanks = best.num_trailing_blanks;
    }
    result.hyps = cur;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::greedy;
    use crate::search::testing::{frames, ScriptedModel};
    use ndarray::array;

    #[test]
    fn confident_frames_match_greedy() {
        let model = ScriptedModel::new(5);
        let enc = frames(5, &[0, 1, 1, 0, 4, 0, 0]);

        let mut g = DecoderResult::default();
        greedy::search(&model, enc.view(), &mut g).unwrap();

        let mut b = DecoderResult::default();
        search(&model, enc.view(), &mut b, 4, None).unwrap();

        assert_eq!(b.tokens, g.tokens);
        assert_eq!(b.timestamps, g.timestamps);
        assert_eq!(b.num_trailing_blanks, 2);
        assert_eq!(b.frame_offset, 7);
    }

    #[test]
    fn never_keeps_more_than_k_paths() {
        let model = ScriptedModel::new(6);
        // Flat logits: every extension is equally likely.
        let enc = ndarray::Array2::<f32>::zeros((5, 6));
        let mut result = DecoderResult::default();
        search(&model, enc.view(), &mut result, 3, None).unwrap();
        assert!(result.hyps.len() <= 3);
        assert!(!result.hyps.is_empty());
    }

    #[test]
    fn silence_keeps_the_empty_path_on_top() {
        let model = ScriptedModel::new(3);
        let enc = frames(3, &[0, 0]);
        let mut result = DecoderResult::default();
        search(&model, enc.view(), &mut result, 2, None).unwrap();
        assert!(result.tokens.is_empty());
        assert_eq!(result.num_trailing_blanks, 2);
    }

    #[test]
    fn hotword_boost_flips_close_call() {
        let model = ScriptedModel::new(4);
        // Token 1 is slightly ahead of token 2.
        let enc = array![[0.0f32, 2.0, 1.8, 0.0]];

        let mut plain = DecoderResult::default();
        search(&model, enc.view(), &mut plain, 4, None).unwrap();
        assert_eq!(plain.tokens, vec![1]);

        let graph = ContextGraph::new(&[(vec![2], 0.0)], 1.5);
        let mut boosted = DecoderResult::default();
        search(&model, enc.view(), &mut boosted, 4, Some(&graph)).unwrap();
        assert_eq!(boosted.tokens, vec![2]);
    }

    #[test]
    fn resumes_from_stored_hypotheses() {
        let model = ScriptedModel::new(4);
        let mut result = DecoderResult {
            hyps: Hypotheses::initial(),
            ..DecoderResult::default()
        };
        search(&model, frames(4, &[2]).view(), &mut result, 2, None).unwrap();
        search(&model, frames(4, &[0, 3]).view(), &mut result, 2, None).unwrap();
        assert_eq!(result.tokens, vec![2, 3]);
        assert_eq!(result.timestamps, vec![0, 2]);
        assert_eq!(result.hyps.best(2).unwrap().ys, vec![2, 3]);
    }
}
