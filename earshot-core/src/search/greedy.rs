//! Greedy transducer search: one hypothesis, at most one token per frame.

use ndarray::ArrayView2;

use super::{argmax, decoder_context, DecoderResult};
use crate::error::Result;
use crate::inference::TransducerModel;
use crate::tokens::TokenId;

pub fn search<M: TransducerModel>(
    model: &M,
    encoder_out: ArrayView2<'_, f32>,
    result: &mut DecoderResult,
) -> Result<()> {
    let meta = model.meta();
    let blank = meta.blank_id;

    // The cached decoder output always matches the current token context.
    let mut decoder_out = match result.decoder_out.take() {
        Some(out) => out,
        None => model.run_decoder(&decoder_context(&result.tokens, meta.context_size, blank))?,
    };

    for (t, frame) in encoder_out.outer_iter().enumerate() {
        let logits = model.run_joiner(frame, decoder_out.view())?;
        let token = argmax(&logits) as TokenId;
        if token == blank {
            result.num_trailing_blanks += 1;
            continue;
        }
        result.tokens.push(token);
        result.timestamps.push(result.frame_offset + t as u32);
        result.num_trailing_blanks = 0;
        decoder_out =
            model.run_decoder(&decoder_context(&result.tokens, meta.context_size, blank))?;
    }

    result.frame_offset += encoder_out.nrows() as u32;
    result.decoder_out = Some(decoder_out);
    Ok(())
}
