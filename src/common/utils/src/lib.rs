mod cursor;
mod range;
mod write;

pub use cursor::{ByteCursor, OutOfBounds};
pub use range::ByteRange;
pub use write::BufMutExt;
