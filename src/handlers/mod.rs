pub mod file;
pub mod resource;
