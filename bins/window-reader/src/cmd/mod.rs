pub mod decode;
pub mod read;
