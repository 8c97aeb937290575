mod file;
mod memory;

pub use file::FileSideChannel;
pub use memory::MemorySideChannel;
