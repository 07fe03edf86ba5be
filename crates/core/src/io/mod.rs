//! I/O operations for reading and writing mugimap JSON documents

mod json;

pub use json::{read_json, read_json_opt, write_json, write_text};
