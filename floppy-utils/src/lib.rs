pub mod file;
pub mod hexprint;
pub mod read_be;
pub mod write_be;
