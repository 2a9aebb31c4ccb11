pub mod codec;
pub mod reducer;
pub mod session;

pub use codec::{decode_line, decode_stream, encode, encode_all, DecodeError, FrameDecoder};
pub use reducer::{Applied, ConversationReducer};
pub use session::{
    ChatRequest, ChatSession, ChatTransport, HttpTransport, TransportError, TurnOutcome,
};
