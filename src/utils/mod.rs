pub mod block;
pub mod buffer;
