pub mod archive;
pub mod index;
