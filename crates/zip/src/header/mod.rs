pub(crate) mod central_directory;
pub(crate) mod local_file;

pub use central_directory::{CentralDirectoryEntry, EndOfCentralDirectory};
pub use local_file::LocalFileHeader;
