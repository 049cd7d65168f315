//! Chat session state and streaming reply consumption

mod decode;
mod message;
mod session;
mod stream;

pub use decode::Utf8Decoder;
pub use message::{ChatMessage, HistoryEntry, IdClock, MessageId, Role};
pub use session::{CHAT_ERROR_MESSAGE, ChatSession, SessionPhase, SubmitRejected};
pub use stream::{ChatBackend, FragmentStream, StreamSummary, consume_fragments};
