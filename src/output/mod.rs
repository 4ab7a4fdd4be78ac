//! Console output module

mod formatter;

pub use formatter::{doc_lines, Console};
#[cfg(test)]
pub use formatter::SharedBuffer;
