//! WASI preview1 syscall bindings.
//!
//! [`add_to_linker`] registers every entry of [`WASI_IMPORTS`] on a
//! [`HostLinker`]. The store data gives the bindings its [`WasiCtx`] through
//! the [`WasiView`] trait.
//!
//! Resource failures come back to the guest as an errno. A missing `memory`
//! export traps, and `proc_exit` unwinds with a [`ProcExit`] error that the
//! caller of `_start` is expected to downcast.

use hearth_core::FuncSignature;
use hearth_vfs::{
    Descriptor, DescriptorTable, EnvironmentContext, OpenFile, OpenMode, STDERR_FD, Whence,
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use wasmtime::Caller;

use crate::abi::{
    Errno, FDSTAT_SIZE, FILESTAT_SIZE, FdFlags, FileType, OFlags, PREOPEN_TYPE_DIR, PRESTAT_SIZE,
    RIGHTS_ALL, WASI_MODULE, WasiImport, wasi_import,
};
use crate::context::{GuestMemory, IntoHostContext};
use crate::error::{HostError, HostResult};
use crate::linker::HostLinker;

/// Per-run state behind the WASI bindings.
#[derive(Debug, Clone, Default)]
pub struct WasiCtx {
    /// Descriptor table, standard streams included.
    pub descriptors: DescriptorTable,
    /// Argument vector and environment.
    pub environment: EnvironmentContext,
}

impl WasiCtx {
    /// Create a context from a populated table and environment.
    pub fn new(descriptors: DescriptorTable, environment: EnvironmentContext) -> Self {
        Self {
            descriptors,
            environment,
        }
    }
}

/// Access to the [`WasiCtx`] inside a store's data.
pub trait WasiView {
    /// The WASI context.
    fn ctx(&self) -> &WasiCtx;

    /// The WASI context, mutably.
    fn ctx_mut(&mut self) -> &mut WasiCtx;

    /// Called after every syscall that returned to the guest.
    fn on_syscall(&mut self, _name: &'static str, _errno: Errno) {}
}

impl WasiView for WasiCtx {
    fn ctx(&self) -> &WasiCtx {
        self
    }

    fn ctx_mut(&mut self) -> &mut WasiCtx {
        self
    }
}

/// The guest called `proc_exit`.
///
/// Returned as the error of the `_start` call; the code is the guest's exit
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guest exited with code {0}")]
pub struct ProcExit(pub i32);

/// Register every WASI function on `linker`.
pub fn add_to_linker<T: WasiView + 'static>(linker: &mut HostLinker<T>) -> HostResult<()> {
    let sig = |name: &str| -> HostResult<FuncSignature> {
        wasi_import(name)
            .map(WasiImport::signature)
            .ok_or_else(|| HostError::RegistrationFailed {
                module: WASI_MODULE.to_string(),
                name: name.to_string(),
                reason: "not in the WASI import table".to_string(),
            })
    };

    linker
        .func_wrap(
            WASI_MODULE,
            "args_get",
            sig("args_get")?,
            |caller: Caller<'_, T>, argv: i32, argv_buf: i32| {
                syscall(caller, "args_get", |memory, ctx| {
                    memory.write_string_vector(argv as u32, argv_buf as u32, ctx.environment.args())
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "args_sizes_get",
            sig("args_sizes_get")?,
            |caller: Caller<'_, T>, count: i32, buf_size: i32| {
                syscall(caller, "args_sizes_get", |memory, ctx| {
                    let sizes = ctx.environment.args_sizes();
                    write_sizes(memory, count, buf_size, sizes.count, sizes.buffer_len)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "environ_get",
            sig("environ_get")?,
            |caller: Caller<'_, T>, environ: i32, environ_buf: i32| {
                syscall(caller, "environ_get", |memory, ctx| {
                    memory.write_string_vector(
                        environ as u32,
                        environ_buf as u32,
                        ctx.environment.env(),
                    )
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "environ_sizes_get",
            sig("environ_sizes_get")?,
            |caller: Caller<'_, T>, count: i32, buf_size: i32| {
                syscall(caller, "environ_sizes_get", |memory, ctx| {
                    let sizes = ctx.environment.env_sizes();
                    write_sizes(memory, count, buf_size, sizes.count, sizes.buffer_len)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_close",
            sig("fd_close")?,
            |caller: Caller<'_, T>, fd: i32| {
                syscall(caller, "fd_close", |_, ctx| {
                    Ok(ctx.descriptors.close(fd as u32)?)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_fdstat_get",
            sig("fd_fdstat_get")?,
            |caller: Caller<'_, T>, fd: i32, stat: i32| {
                syscall(caller, "fd_fdstat_get", |memory, ctx| {
                    fd_fdstat_get(memory, &ctx.descriptors, fd as u32, stat as u32)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_filestat_get",
            sig("fd_filestat_get")?,
            |caller: Caller<'_, T>, fd: i32, stat: i32| {
                syscall(caller, "fd_filestat_get", |memory, ctx| {
                    fd_filestat_get(memory, &ctx.descriptors, fd as u32, stat as u32)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_prestat_get",
            sig("fd_prestat_get")?,
            |caller: Caller<'_, T>, fd: i32, prestat: i32| {
                syscall(caller, "fd_prestat_get", |memory, ctx| {
                    let name_len = preopen_name(&ctx.descriptors, fd as u32)?.len();
                    let mut record = [0u8; PRESTAT_SIZE];
                    record[0] = PREOPEN_TYPE_DIR;
                    record[4..8].copy_from_slice(&(name_len as u32).to_le_bytes());
                    memory.write_bytes(prestat as u32, &record)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_prestat_dir_name",
            sig("fd_prestat_dir_name")?,
            |caller: Caller<'_, T>, fd: i32, path: i32, path_len: i32| {
                syscall(caller, "fd_prestat_dir_name", |memory, ctx| {
                    let name = preopen_name(&ctx.descriptors, fd as u32)?;
                    if name.len() > path_len as u32 as usize {
                        return Err(Errno::Nametoolong.into());
                    }
                    memory.write_bytes(path as u32, name.as_bytes())
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_read",
            sig("fd_read")?,
            |caller: Caller<'_, T>, fd: i32, iovs: i32, iovs_len: i32, nread: i32| {
                syscall(caller, "fd_read", |memory, ctx| {
                    let file = ctx.descriptors.file_mut(fd as u32)?;
                    let mut total: u32 = 0;
                    for (buf, len) in memory.iovecs(iovs as u32, iovs_len as u32)? {
                        let read = file.read(memory.slice_mut(buf, len)?);
                        total = total.saturating_add(read as u32);
                        if read < len as usize {
                            break;
                        }
                    }
                    trace!(fd, bytes = total, "fd_read");
                    memory.write_u32(nread as u32, total)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_seek",
            sig("fd_seek")?,
            |caller: Caller<'_, T>, fd: i32, offset: i64, whence: i32, new_offset: i32| {
                syscall(caller, "fd_seek", |memory, ctx| {
                    let file = ctx.descriptors.file_mut(fd as u32)?;
                    let whence = u8::try_from(whence)
                        .ok()
                        .and_then(Whence::from_raw)
                        .ok_or(Errno::Inval)?;
                    let position = file.seek(offset, whence)?;
                    memory.write_u64(new_offset as u32, position)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_tell",
            sig("fd_tell")?,
            |caller: Caller<'_, T>, fd: i32, offset: i32| {
                syscall(caller, "fd_tell", |memory, ctx| {
                    let position = ctx.descriptors.file_mut(fd as u32)?.tell();
                    memory.write_u64(offset as u32, position)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "fd_write",
            sig("fd_write")?,
            |caller: Caller<'_, T>, fd: i32, iovs: i32, iovs_len: i32, nwritten: i32| {
                syscall(caller, "fd_write", |memory, ctx| {
                    let file = ctx.descriptors.file_mut(fd as u32)?;
                    let mut total: u32 = 0;
                    for (buf, len) in memory.iovecs(iovs as u32, iovs_len as u32)? {
                        let written = file.write(memory.slice(buf, len)?)?;
                        total = total.saturating_add(written as u32);
                    }
                    trace!(fd, bytes = total, "fd_write");
                    memory.write_u32(nwritten as u32, total)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "path_open",
            sig("path_open")?,
            |caller: Caller<'_, T>,
             dirfd: i32,
             _dirflags: i32,
             path: i32,
             path_len: i32,
             oflags: i32,
             _rights_base: i64,
             _rights_inheriting: i64,
             fdflags: i32,
             opened: i32| {
                syscall(caller, "path_open", |memory, ctx| {
                    let request = OpenRequest {
                        dirfd: dirfd as u32,
                        path: memory.read_str(path as u32, path_len as u32)?.to_owned(),
                        oflags: OFlags::from_bits_truncate(oflags as u16),
                        fdflags: FdFlags::from_bits_truncate(fdflags as u16),
                    };
                    let fd = path_open(&mut ctx.descriptors, &request)?;
                    memory.write_u32(opened as u32, fd)
                })
            },
        )?
        .func_wrap(
            WASI_MODULE,
            "proc_exit",
            sig("proc_exit")?,
            |mut caller: Caller<'_, T>, code: i32| -> wasmtime::Result<()> {
                caller.data_mut().on_syscall("proc_exit", Errno::Success);
                debug!(code, "Guest called proc_exit");
                Err(wasmtime::Error::new(ProcExit(code)))
            },
        )?;

    Ok(())
}

/// Run one syscall body and turn its outcome into an errno for the guest.
fn syscall<T: WasiView>(
    caller: Caller<'_, T>,
    name: &'static str,
    body: impl FnOnce(&mut GuestMemory<'_>, &mut WasiCtx) -> HostResult<()>,
) -> wasmtime::Result<i32> {
    let mut ctx = caller.into_context();

    let outcome = match ctx.split() {
        Ok((mut memory, state)) => body(&mut memory, state.ctx_mut()),
        Err(err) => Err(err),
    };

    let errno = match outcome {
        Ok(()) => Errno::Success,
        Err(err) => match err.errno() {
            Some(errno) => {
                trace!(syscall = name, %errno, error = %err, "Syscall failed");
                errno
            }
            None => {
                warn!(syscall = name, error = %err, "Fatal host error");
                return Err(wasmtime::Error::new(err));
            }
        },
    };

    ctx.data_mut().on_syscall(name, errno);
    Ok(i32::from(errno.raw()))
}

fn write_sizes(
    memory: &mut GuestMemory<'_>,
    count_ptr: i32,
    size_ptr: i32,
    count: usize,
    size: usize,
) -> HostResult<()> {
    let count = u32::try_from(count).map_err(|_| HostError::Errno(Errno::Inval))?;
    let size = u32::try_from(size).map_err(|_| HostError::Errno(Errno::Inval))?;
    memory.write_u32(count_ptr as u32, count)?;
    memory.write_u32(size_ptr as u32, size)
}

fn preopen_name(descriptors: &DescriptorTable, fd: u32) -> HostResult<&str> {
    match descriptors.lookup(fd)? {
        Descriptor::Directory(directory) => Ok(directory.name()),
        Descriptor::File(_) => Err(Errno::Badf.into()),
    }
}

fn fd_fdstat_get(
    memory: &mut GuestMemory<'_>,
    descriptors: &DescriptorTable,
    fd: u32,
    stat: u32,
) -> HostResult<()> {
    let (filetype, flags) = match descriptors.lookup(fd)? {
        Descriptor::Directory(_) => (FileType::Directory, FdFlags::empty()),
        Descriptor::File(file) => {
            let filetype = if fd <= STDERR_FD {
                FileType::CharacterDevice
            } else {
                FileType::RegularFile
            };
            (filetype, fd_flags(file))
        }
    };

    let mut record = [0u8; FDSTAT_SIZE];
    record[0] = filetype as u8;
    record[2..4].copy_from_slice(&flags.bits().to_le_bytes());
    record[8..16].copy_from_slice(&RIGHTS_ALL.to_le_bytes());
    record[16..24].copy_from_slice(&RIGHTS_ALL.to_le_bytes());
    memory.write_bytes(stat, &record)
}

fn fd_filestat_get(
    memory: &mut GuestMemory<'_>,
    descriptors: &DescriptorTable,
    fd: u32,
    stat: u32,
) -> HostResult<()> {
    let (filetype, size) = match descriptors.lookup(fd)? {
        Descriptor::Directory(directory) => (FileType::Directory, directory.len() as u64),
        Descriptor::File(file) if fd <= STDERR_FD => (FileType::CharacterDevice, file.file().len()),
        Descriptor::File(file) => (FileType::RegularFile, file.file().len()),
    };

    // dev, ino and the timestamps stay zero.
    let mut record = [0u8; FILESTAT_SIZE];
    record[16] = filetype as u8;
    record[24..32].copy_from_slice(&1u64.to_le_bytes());
    record[32..40].copy_from_slice(&size.to_le_bytes());
    memory.write_bytes(stat, &record)
}

fn fd_flags(file: &OpenFile) -> FdFlags {
    match file.mode() {
        OpenMode::Append => FdFlags::APPEND,
        OpenMode::Read => FdFlags::empty(),
    }
}

struct OpenRequest {
    dirfd: u32,
    path: String,
    oflags: OFlags,
    fdflags: FdFlags,
}

/// Open `request.path` relative to a directory descriptor.
///
/// Files are never created: `O_CREAT` on a missing path still fails with
/// `NOENT`. `"."` names the directory itself.
fn path_open(descriptors: &mut DescriptorTable, request: &OpenRequest) -> HostResult<u32> {
    let directory = descriptors.directory(request.dirfd)?;

    if request.path == "." || request.path.is_empty() {
        let directory = directory.clone();
        let fd = descriptors.push(directory)?;
        debug!(dirfd = request.dirfd, fd, "Opened directory");
        return Ok(fd);
    }

    if request.oflags.contains(OFlags::DIRECTORY) {
        // Preopened directories are flat.
        directory.resolve(&request.path)?;
        return Err(Errno::Notdir.into());
    }

    if request.oflags.contains(OFlags::CREAT | OFlags::EXCL)
        && directory.resolve(&request.path).is_ok()
    {
        return Err(Errno::Exist.into());
    }

    let mode = if request.fdflags.contains(FdFlags::APPEND) {
        OpenMode::Append
    } else {
        OpenMode::Read
    };
    let file = directory.open_at(&request.path, mode)?;
    if request.oflags.contains(OFlags::TRUNC) {
        file.file().truncate();
    }

    let fd = descriptors.push(file)?;
    debug!(dirfd = request.dirfd, path = %request.path, fd, "Opened file");
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::WASI_IMPORTS;
    use hearth_core::{HearthEngine, IntoShared, ModuleLoader};
    use hearth_vfs::{DescriptorInit, StandardStreams};
    use wasmtime::Store;

    /// Instantiate `wat` against a fresh context and call `_start`.
    fn run(wat: &str, ctx: WasiCtx) -> (Store<WasiCtx>, wasmtime::Result<()>) {
        let (store, result, _) = run_with_memory(wat, ctx);
        (store, result)
    }

    /// Like [`run`], also returning a copy of the guest's memory afterwards.
    fn run_with_memory(
        wat: &str,
        ctx: WasiCtx,
    ) -> (Store<WasiCtx>, wasmtime::Result<()>, Vec<u8>) {
        let engine = HearthEngine::default_engine().unwrap().into_shared();
        let module = ModuleLoader::new(engine.clone()).load_wat(wat).unwrap();

        let mut linker = HostLinker::<WasiCtx>::new(engine.inner());
        add_to_linker(&mut linker).unwrap();
        linker.resolve_imports(&module).unwrap();

        let mut store = Store::new(engine.inner(), ctx);
        store.set_fuel(10_000_000).unwrap();
        let instance = linker
            .inner()
            .instantiate(&mut store, module.inner())
            .unwrap();
        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .unwrap();
        let result = start.call(&mut store, ());
        let memory = instance
            .get_memory(&mut store, "memory")
            .map(|memory| memory.data(&store).to_vec())
            .unwrap_or_default();
        (store, result, memory)
    }

    fn u32_at(memory: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(memory[offset..offset + 4].try_into().unwrap())
    }

    fn u64_at(memory: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(memory[offset..offset + 8].try_into().unwrap())
    }

    fn with_dir() -> WasiCtx {
        WasiCtx::new(
            DescriptorTable::install(
                StandardStreams::new(),
                vec![DescriptorInit::directory(".", [("a.txt", "hi")])],
            ),
            EnvironmentContext::default(),
        )
    }

    #[test]
    fn test_all_imports_registered() {
        let engine = HearthEngine::default_engine().unwrap();
        let mut linker = HostLinker::<WasiCtx>::new(engine.inner());
        add_to_linker(&mut linker).unwrap();

        for import in WASI_IMPORTS {
            let registered = linker.lookup(WASI_MODULE, import.name).unwrap();
            assert_eq!(registered.signature, import.signature());
        }
    }

    #[test]
    fn test_fd_write_to_stdout() {
        let (store, result) = run(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 8) "hello\n")
                (func (export "_start")
                    (i32.store (i32.const 0) (i32.const 8))
                    (i32.store (i32.const 4) (i32.const 6))
                    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))
                )
            )
        "#,
            WasiCtx::default(),
        );

        result.unwrap();
        assert_eq!(store.data().descriptors.stdout().contents(), b"hello\n");
    }

    #[test]
    fn test_proc_exit_unwinds() {
        let (store, result) = run(
            r#"
            (module
                (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 8) "after")
                (func (export "_start")
                    (call $exit (i32.const 3))
                    (i32.store (i32.const 0) (i32.const 8))
                    (i32.store (i32.const 4) (i32.const 5))
                    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))
                )
            )
        "#,
            WasiCtx::default(),
        );

        let err = result.unwrap_err();
        assert_eq!(err.downcast_ref::<ProcExit>(), Some(&ProcExit(3)));
        assert!(store.data().descriptors.stdout().is_empty());
    }

    #[test]
    fn test_missing_memory_traps() {
        let (_, result) = run(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_close" (func $close (param i32) (result i32)))
                (func (export "_start") (drop (call $close (i32.const 0))))
            )
        "#,
            WasiCtx::default(),
        );

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::MemoryNotFound)
        ));
    }

    #[test]
    fn test_errno_is_returned_to_guest() {
        // Stores the errno of fd_close(99) at address 0, then of a negative
        // seek on stdin at address 4, and keeps running.
        let (store, result) = run(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_close" (func $close (param i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_seek"
                    (func $seek (param i32 i64 i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start")
                    (i32.store (i32.const 0) (call $close (i32.const 99)))
                    (i32.store (i32.const 4)
                        (call $seek (i32.const 0) (i64.const -1) (i32.const 0) (i32.const 16)))
                    (i32.store (i32.const 32) (i32.const 0))
                    (i32.store (i32.const 36) (i32.const 8))
                    (drop (call $fd_write
                        (i32.const 1) (i32.const 32) (i32.const 1) (i32.const 40)))
                )
            )
        "#,
            WasiCtx::default(),
        );

        result.unwrap();
        let out = store.data().descriptors.stdout().contents();
        assert_eq!(u32::from_le_bytes(out[0..4].try_into().unwrap()), 8);
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), 28);
    }

    #[test]
    fn test_path_open_and_read() {
        // Opens "a.txt" under descriptor 3, reads it into address 64 and
        // echoes it to stdout.
        let (store, result) = run(
            r#"
            (module
                (import "wasi_snapshot_preview1" "path_open"
                    (func $open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_read"
                    (func $read (param i32 i32 i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 100) "a.txt")
                (func (export "_start")
                    (drop (call $open (i32.const 3) (i32.const 0) (i32.const 100) (i32.const 5)
                        (i32.const 0) (i64.const 0) (i64.const 0) (i32.const 0) (i32.const 0)))
                    (i32.store (i32.const 8) (i32.const 64))
                    (i32.store (i32.const 12) (i32.const 16))
                    (drop (call $read
                        (i32.load (i32.const 0)) (i32.const 8) (i32.const 1) (i32.const 16)))
                    (i32.store (i32.const 12) (i32.load (i32.const 16)))
                    (drop (call $write (i32.const 1) (i32.const 8) (i32.const 1) (i32.const 20)))
                )
            )
        "#,
            with_dir(),
        );

        result.unwrap();
        assert_eq!(store.data().descriptors.stdout().contents(), b"hi");
        assert_eq!(store.data().descriptors.len(), 5);
    }

    #[test]
    fn test_args_layout_is_byte_exact() {
        let ctx = WasiCtx::new(
            DescriptorTable::new(),
            EnvironmentContext::new(["prog", "ab"], Vec::<String>::new()),
        );
        let (_, result, memory) = run_with_memory(
            r#"
            (module
                (import "wasi_snapshot_preview1" "args_sizes_get"
                    (func $sizes (param i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "args_get"
                    (func $get (param i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start")
                    (i32.store (i32.const 8) (call $sizes (i32.const 0) (i32.const 4)))
                    (i32.store (i32.const 12) (call $get (i32.const 16) (i32.const 64)))
                )
            )
        "#,
            ctx,
        );

        result.unwrap();
        assert_eq!(u32_at(&memory, 0), 2);
        assert_eq!(u32_at(&memory, 4), 8);
        assert_eq!(u32_at(&memory, 8), 0);
        assert_eq!(u32_at(&memory, 12), 0);
        assert_eq!(u32_at(&memory, 16), 64);
        assert_eq!(u32_at(&memory, 20), 69);
        assert_eq!(&memory[64..73], b"prog\0ab\0\0");
    }

    #[test]
    fn test_prestat_records_in_guest_memory() {
        let ctx = WasiCtx::new(
            DescriptorTable::install(
                StandardStreams::new(),
                vec![DescriptorInit::directory("data", [("a.txt", "hi")])],
            ),
            EnvironmentContext::default(),
        );
        // errnos at 0, 4, 16 and 20; prestat at 8; the name lands at 32 and
        // the too-short buffer is at 48.
        let (_, result, memory) = run_with_memory(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_prestat_get"
                    (func $prestat (param i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_prestat_dir_name"
                    (func $dir_name (param i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start")
                    (i32.store (i32.const 0) (call $prestat (i32.const 3) (i32.const 8)))
                    (i32.store (i32.const 4)
                        (call $dir_name (i32.const 3) (i32.const 32) (i32.const 4)))
                    (i32.store (i32.const 16)
                        (call $dir_name (i32.const 3) (i32.const 48) (i32.const 3)))
                    (i32.store (i32.const 20) (call $prestat (i32.const 1) (i32.const 56)))
                )
            )
        "#,
            ctx,
        );

        result.unwrap();
        assert_eq!(u32_at(&memory, 0), u32::from(Errno::Success.raw()));
        assert_eq!(memory[8], PREOPEN_TYPE_DIR);
        assert_eq!(u32_at(&memory, 12), 4);

        assert_eq!(u32_at(&memory, 4), u32::from(Errno::Success.raw()));
        assert_eq!(&memory[32..36], b"data");

        assert_eq!(u32_at(&memory, 16), u32::from(Errno::Nametoolong.raw()));
        assert_eq!(&memory[48..52], &[0, 0, 0, 0]);

        assert_eq!(u32_at(&memory, 20), u32::from(Errno::Badf.raw()));
        assert_eq!(u64_at(&memory, 56), 0);
    }

    #[test]
    fn test_fd_tell_follows_the_cursor() {
        let ctx = WasiCtx::new(
            DescriptorTable::install(
                StandardStreams::new(),
                vec![DescriptorInit::Content(b"abcdef".to_vec())],
            ),
            EnvironmentContext::default(),
        );
        let (_, result, memory) = run_with_memory(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_seek"
                    (func $seek (param i32 i64 i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_tell"
                    (func $tell (param i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start")
                    (drop (call $tell (i32.const 3) (i32.const 0)))
                    (drop (call $seek (i32.const 3) (i64.const 2) (i32.const 0) (i32.const 40)))
                    (drop (call $tell (i32.const 3) (i32.const 8)))
                    (drop (call $seek (i32.const 3) (i64.const 3) (i32.const 1) (i32.const 40)))
                    (drop (call $tell (i32.const 3) (i32.const 16)))
                    (i32.store (i32.const 24) (call $tell (i32.const 99) (i32.const 32)))
                )
            )
        "#,
            ctx,
        );

        result.unwrap();
        assert_eq!(u64_at(&memory, 0), 0);
        assert_eq!(u64_at(&memory, 8), 2);
        assert_eq!(u64_at(&memory, 16), 5);
        assert_eq!(u32_at(&memory, 24), u32::from(Errno::Badf.raw()));
        assert_eq!(u64_at(&memory, 32), 0);
    }

    #[test]
    fn test_filestat_records_in_guest_memory() {
        let ctx = WasiCtx::new(
            DescriptorTable::install(
                StandardStreams::new(),
                vec![
                    DescriptorInit::Content(b"hello".to_vec()),
                    DescriptorInit::directory("d", [("a", "1"), ("b", "2")]),
                ],
            ),
            EnvironmentContext::default(),
        );
        // Records at 0 (fd 3), 64 (fd 4) and 128 (stdout); errnos from 200.
        let (_, result, memory) = run_with_memory(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_filestat_get"
                    (func $stat (param i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "_start")
                    (i32.store (i32.const 200) (call $stat (i32.const 3) (i32.const 0)))
                    (i32.store (i32.const 204) (call $stat (i32.const 4) (i32.const 64)))
                    (i32.store (i32.const 208) (call $stat (i32.const 1) (i32.const 128)))
                    (i32.store (i32.const 212) (call $stat (i32.const 99) (i32.const 256)))
                )
            )
        "#,
            ctx,
        );

        result.unwrap();
        assert_eq!(&memory[200..212], &[0; 12]);
        assert_eq!(u32_at(&memory, 212), u32::from(Errno::Badf.raw()));

        assert_eq!(u64_at(&memory, 0), 0);
        assert_eq!(memory[16], FileType::RegularFile as u8);
        assert_eq!(u64_at(&memory, 24), 1);
        assert_eq!(u64_at(&memory, 32), 5);

        assert_eq!(memory[64 + 16], FileType::Directory as u8);
        assert_eq!(u64_at(&memory, 64 + 32), 2);

        assert_eq!(memory[128 + 16], FileType::CharacterDevice as u8);
        assert_eq!(u64_at(&memory, 128 + 32), 0);

        assert_eq!(&memory[256..320], &[0; 64]);
    }

    #[test]
    fn test_path_open_missing_file() {
        let mut descriptors = with_dir().descriptors;
        let request = OpenRequest {
            dirfd: 3,
            path: "missing.txt".to_string(),
            oflags: OFlags::CREAT,
            fdflags: FdFlags::empty(),
        };

        let err = path_open(&mut descriptors, &request).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::Noent));
    }

    #[test]
    fn test_path_open_truncate_and_append() {
        let mut descriptors = with_dir().descriptors;

        let fd = path_open(
            &mut descriptors,
            &OpenRequest {
                dirfd: 3,
                path: "a.txt".to_string(),
                oflags: OFlags::TRUNC,
                fdflags: FdFlags::APPEND,
            },
        )
        .unwrap();

        let file = descriptors.file_mut(fd).unwrap();
        assert_eq!(file.mode(), OpenMode::Append);
        file.write(b"new").unwrap();
        let contents = descriptors.directory(3).unwrap().resolve("a.txt").unwrap().contents();
        assert_eq!(contents, b"new");
    }

    #[test]
    fn test_path_open_on_file_descriptor() {
        let mut descriptors = with_dir().descriptors;
        let request = OpenRequest {
            dirfd: 1,
            path: "a.txt".to_string(),
            oflags: OFlags::empty(),
            fdflags: FdFlags::empty(),
        };

        let err = path_open(&mut descriptors, &request).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::Notdir));
    }

    #[test]
    fn test_prestat_reports_directory_name() {
        let descriptors = with_dir().descriptors;
        assert_eq!(preopen_name(&descriptors, 3).unwrap(), ".");
        assert_eq!(
            preopen_name(&descriptors, 1).unwrap_err().errno(),
            Some(Errno::Badf)
        );
        assert_eq!(
            preopen_name(&descriptors, 4).unwrap_err().errno(),
            Some(Errno::Badf)
        );
    }

    #[test]
    fn test_fdstat_layout() {
        let descriptors = with_dir().descriptors;
        let mut data = vec![0u8; 64];
        let mut memory = GuestMemory::new(&mut data);

        fd_fdstat_get(&mut memory, &descriptors, 1, 0).unwrap();
        fd_fdstat_get(&mut memory, &descriptors, 3, 32).unwrap();

        assert_eq!(data[0], FileType::CharacterDevice as u8);
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), FdFlags::APPEND.bits());
        assert_eq!(data[32], FileType::Directory as u8);
    }
}
