//! Splitting outgoing data messages into frames.

use crate::protocol::{Frame, OpCode};

/// Frames for one data message: the first carries `opcode`, the rest are
/// continuations, and only the last has FIN set. An empty payload still
/// yields one frame.
pub(crate) fn fragments(
    opcode: OpCode,
    payload: &[u8],
    fragment_size: usize,
) -> impl Iterator<Item = Frame> + '_ {
    let size = fragment_size.max(1);
    let count = payload.len().div_ceil(size).max(1);
    (0..count).map(move |i| {
        let start = i * size;
        let end = (start + size).min(payload.len());
        let opcode = if i == 0 { opcode } else { OpCode::Continuation };
        Frame::new(i + 1 == count, opcode, payload[start..end].to_vec())
    })
}
