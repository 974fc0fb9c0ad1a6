mod stream;
pub use stream::Buffer;
pub use stream::Revert;
pub use stream::StreamCursor;
pub use stream::Token;

mod request_parser;
pub use request_parser::Parser;
pub use request_parser::State;

mod response_encoder;
pub(crate) use response_encoder::encode;
