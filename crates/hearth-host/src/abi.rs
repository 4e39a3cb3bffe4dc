//! WASI preview1 ABI definitions.
//!
//! Errno values, flag sets, and the enumerated table of host functions a
//! guest may import from `wasi_snapshot_preview1`.

use hearth_core::{FuncSignature, WasmValType};
use hearth_vfs::VfsError;

/// Import module name of the WASI preview1 surface.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// WASI error codes returned to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Errno {
    /// Success.
    Success = 0,
    /// Bad file descriptor.
    Badf = 8,
    /// File exists.
    Exist = 20,
    /// Bad address.
    Fault = 21,
    /// File too large.
    Fbig = 22,
    /// Illegal byte sequence.
    Ilseq = 25,
    /// Invalid argument.
    Inval = 28,
    /// Is a directory.
    Isdir = 31,
    /// Filename too long.
    Nametoolong = 37,
    /// Too many files open in system.
    Nfile = 41,
    /// No such file or directory.
    Noent = 44,
    /// Not a directory.
    Notdir = 54,
}

impl Errno {
    /// The numeric errno value.
    pub fn raw(self) -> u16 {
        self as u16
    }

    /// Lowercase WASI name, as used in logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            Errno::Success => "success",
            Errno::Badf => "badf",
            Errno::Exist => "exist",
            Errno::Fault => "fault",
            Errno::Fbig => "fbig",
            Errno::Ilseq => "ilseq",
            Errno::Inval => "inval",
            Errno::Isdir => "isdir",
            Errno::Nametoolong => "nametoolong",
            Errno::Nfile => "nfile",
            Errno::Noent => "noent",
            Errno::Notdir => "notdir",
        }
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.raw())
    }
}

impl From<&VfsError> for Errno {
    fn from(err: &VfsError) -> Self {
        match err {
            VfsError::BadDescriptor(_) => Errno::Badf,
            VfsError::NotFound { .. } => Errno::Noent,
            VfsError::InvalidOffset { .. } => Errno::Inval,
            VfsError::FileTooLarge { .. } => Errno::Fbig,
            VfsError::IsADirectory(_) => Errno::Isdir,
            VfsError::NotADirectory(_) => Errno::Notdir,
            VfsError::TableFull => Errno::Nfile,
        }
    }
}

bitflags::bitflags! {
    /// Open flags for `path_open`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OFlags: u16 {
        const CREAT = 1 << 0;
        const DIRECTORY = 1 << 1;
        const EXCL = 1 << 2;
        const TRUNC = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u16 {
        const APPEND = 1 << 0;
        const DSYNC = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC = 1 << 3;
        const SYNC = 1 << 4;
    }
}

/// The type of a descriptor, as reported by `fd_fdstat_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    /// Character device; used for the standard streams.
    CharacterDevice = 2,
    /// Directory.
    Directory = 3,
    /// Regular file.
    RegularFile = 4,
}

/// `prestat` tag for a preopened directory.
pub const PREOPEN_TYPE_DIR: u8 = 0;

/// Every right defined by preview1. Descriptors are not rights-restricted.
pub const RIGHTS_ALL: u64 = (1 << 29) - 1;

/// Size of the `fdstat` record.
pub const FDSTAT_SIZE: usize = 24;

/// Size of the `filestat` record.
pub const FILESTAT_SIZE: usize = 64;

/// Size of the `prestat` record.
pub const PRESTAT_SIZE: usize = 8;

/// One entry of the WASI import table.
#[derive(Debug, Clone, Copy)]
pub struct WasiImport {
    /// Function name within [`WASI_MODULE`].
    pub name: &'static str,
    /// Parameter types.
    pub params: &'static [WasmValType],
    /// Result types.
    pub results: &'static [WasmValType],
}

impl WasiImport {
    /// The signature as checked against module imports.
    pub fn signature(&self) -> FuncSignature {
        FuncSignature::new(self.params, self.results)
    }
}

use WasmValType::{I32, I64};

const ERRNO: &[WasmValType] = &[I32];

/// Every function this host provides, with its exact signature.
pub const WASI_IMPORTS: &[WasiImport] = &[
    WasiImport { name: "args_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "args_sizes_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "environ_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "environ_sizes_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "fd_close", params: &[I32], results: ERRNO },
    WasiImport { name: "fd_fdstat_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "fd_filestat_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "fd_prestat_get", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "fd_prestat_dir_name", params: &[I32, I32, I32], results: ERRNO },
    WasiImport { name: "fd_read", params: &[I32, I32, I32, I32], results: ERRNO },
    WasiImport { name: "fd_seek", params: &[I32, I64, I32, I32], results: ERRNO },
    WasiImport { name: "fd_tell", params: &[I32, I32], results: ERRNO },
    WasiImport { name: "fd_write", params: &[I32, I32, I32, I32], results: ERRNO },
    WasiImport {
        name: "path_open",
        params: &[I32, I32, I32, I32, I32, I64, I64, I32, I32],
        results: ERRNO,
    },
    WasiImport { name: "proc_exit", params: &[I32], results: &[] },
];

/// Look up an entry of [`WASI_IMPORTS`] by name.
pub fn wasi_import(name: &str) -> Option<&'static WasiImport> {
    WASI_IMPORTS.iter().find(|import| import.name == name)
}
