//! Hearth Virtual Filesystem
//!
//! In-memory resources a Hearth guest can see through its descriptors:
//!
//! - [`VirtualFile`]: a shared, growable byte buffer
//! - [`OpenFile`]: a cursor over a virtual file
//! - [`PreopenDirectory`]: a named, flat directory of virtual files
//! - [`DescriptorTable`]: descriptor numbers bound to files and directories
//! - [`EnvironmentContext`]: the argument vector and environment
//!
//! Nothing here touches the host filesystem. Contents are built by the
//! embedder before a run and read back (for example, captured stdout) after.
//!
//! # Example
//!
//! ```
//! use hearth_vfs::{DescriptorInit, DescriptorTable, StandardStreams};
//!
//! let table = DescriptorTable::install(
//!     StandardStreams::new(),
//!     vec![DescriptorInit::directory(".", [("a.txt", "hi")])],
//! );
//!
//! let dir = table.directory(3).unwrap();
//! assert_eq!(dir.resolve("a.txt").unwrap().contents(), b"hi");
//! assert!(dir.resolve("missing.txt").is_err());
//! ```

pub mod directory;
pub mod environment;
pub mod error;
pub mod file;
pub mod table;

pub use directory::PreopenDirectory;
pub use environment::{EncodedSizes, EnvironmentContext};
pub use error::{VfsError, VfsResult};
pub use file::{MAX_FILE_SIZE, OpenFile, OpenMode, VirtualFile, Whence};
pub use table::{
    Descriptor, DescriptorInit, DescriptorTable, STDERR_FD, STDIN_FD, STDOUT_FD, StandardStreams,
};
