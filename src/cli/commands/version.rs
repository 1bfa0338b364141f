//! Version command

/// Print the dotrun version
pub fn execute() -> i32 {
    println!("dotrun {}", env!("CARGO_PKG_VERSION"));
    0
}
