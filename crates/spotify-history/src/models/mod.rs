pub mod stream;

pub use stream::StreamRecord;
