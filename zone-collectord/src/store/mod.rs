pub mod file;
pub mod hash;

pub use file::SdFile;
