mod completion;
mod http_transport;

pub use completion::{fetch_embedding, open_completion_stream, PreparedCompletion};
pub use http_transport::HttpTransport;
