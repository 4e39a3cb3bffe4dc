//! The descriptor table.

use tracing::debug;

use crate::directory::PreopenDirectory;
use crate::error::{VfsError, VfsResult};
use crate::file::{MAX_FILE_SIZE, OpenFile, OpenMode, VirtualFile};

/// Descriptor number of standard input.
pub const STDIN_FD: u32 = 0;
/// Descriptor number of standard output.
pub const STDOUT_FD: u32 = 1;
/// Descriptor number of standard error.
pub const STDERR_FD: u32 = 2;

/// A resource bound to a descriptor number.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// An open file (standard streams included).
    File(OpenFile),
    /// A preopened directory.
    Directory(PreopenDirectory),
}

impl Descriptor {
    /// Whether this is a directory descriptor.
    pub fn is_directory(&self) -> bool {
        matches!(self, Descriptor::Directory(_))
    }

    fn cap_file_size(&mut self, bytes: u64) {
        if let Descriptor::File(file) = self {
            file.set_max_size(bytes);
        }
    }
}

/// One entry of the construction-time descriptor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorInit {
    /// An empty file.
    Empty,
    /// A file holding literal bytes.
    Content(Vec<u8>),
    /// A named directory of literal byte files.
    Directory {
        /// Name reported to the guest.
        name: String,
        /// Relative path and contents of each file.
        files: Vec<(String, Vec<u8>)>,
    },
}

impl DescriptorInit {
    /// Build a directory entry from `(path, contents)` pairs.
    pub fn directory<P, C>(name: impl Into<String>, files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        DescriptorInit::Directory {
            name: name.into(),
            files: files
                .into_iter()
                .map(|(path, contents)| (path.into(), contents.into()))
                .collect(),
        }
    }

    fn into_descriptor(self) -> Descriptor {
        match self {
            DescriptorInit::Empty => {
                Descriptor::File(OpenFile::new(VirtualFile::empty(), OpenMode::Read))
            }
            DescriptorInit::Content(bytes) => {
                Descriptor::File(OpenFile::new(VirtualFile::new(bytes), OpenMode::Read))
            }
            DescriptorInit::Directory { name, files } => {
                let mut directory = PreopenDirectory::new(name);
                for (path, contents) in files {
                    directory.insert(path, contents);
                }
                Descriptor::Directory(directory)
            }
        }
    }
}

impl From<PreopenDirectory> for Descriptor {
    fn from(directory: PreopenDirectory) -> Self {
        Descriptor::Directory(directory)
    }
}

impl From<OpenFile> for Descriptor {
    fn from(file: OpenFile) -> Self {
        Descriptor::File(file)
    }
}

/// The files behind descriptors 0, 1 and 2.
#[derive(Debug, Clone, Default)]
pub struct StandardStreams {
    /// Standard input; empty unless overridden.
    pub stdin: VirtualFile,
    /// Standard output; grows as the guest writes.
    pub stdout: VirtualFile,
    /// Standard error; grows as the guest writes.
    pub stderr: VirtualFile,
}

impl StandardStreams {
    /// Empty streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace standard input.
    pub fn with_stdin(mut self, stdin: impl Into<VirtualFile>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// Replace standard output.
    pub fn with_stdout(mut self, stdout: VirtualFile) -> Self {
        self.stdout = stdout;
        self
    }

    /// Replace standard error.
    pub fn with_stderr(mut self, stderr: VirtualFile) -> Self {
        self.stderr = stderr;
        self
    }
}

/// Ordered table of descriptors, indexed by descriptor number.
///
/// Slots 0/1/2 always hold the standard streams; everything supplied at
/// construction follows from 3 in order, and descriptors opened later are
/// appended. Numbers are never handed out twice in a run, closed or not.
///
/// Every file handle in the table shares one size cap, see
/// [`DescriptorTable::with_max_file_size`].
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    slots: Vec<Option<Descriptor>>,
    streams: StandardStreams,
    max_file_size: u64,
}

impl DescriptorTable {
    /// A table holding only empty standard streams.
    pub fn new() -> Self {
        Self::install(StandardStreams::default(), std::iter::empty())
    }

    /// Populate a table: standard streams first, then `descriptors` from 3.
    pub fn install(
        streams: StandardStreams,
        descriptors: impl IntoIterator<Item = DescriptorInit>,
    ) -> Self {
        let mut slots = vec![
            Some(Descriptor::File(OpenFile::new(
                streams.stdin.clone(),
                OpenMode::Read,
            ))),
            Some(Descriptor::File(OpenFile::new(
                streams.stdout.clone(),
                OpenMode::Append,
            ))),
            Some(Descriptor::File(OpenFile::new(
                streams.stderr.clone(),
                OpenMode::Append,
            ))),
        ];
        slots.extend(
            descriptors
                .into_iter()
                .map(|init| Some(init.into_descriptor())),
        );

        debug!(descriptors = slots.len(), "Installed descriptor table");
        Self {
            slots,
            streams,
            max_file_size: MAX_FILE_SIZE,
        }
    }

    /// Cap the size any file may be grown to through this table's handles,
    /// including handles pushed later.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes.min(MAX_FILE_SIZE);
        for descriptor in self.slots.iter_mut().flatten() {
            descriptor.cap_file_size(self.max_file_size);
        }
        self
    }

    /// The file size cap applied to every handle.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Append an already-built descriptor and return its number.
    pub fn push(&mut self, descriptor: impl Into<Descriptor>) -> VfsResult<u32> {
        let fd = u32::try_from(self.slots.len()).map_err(|_| VfsError::TableFull)?;
        let mut descriptor = descriptor.into();
        descriptor.cap_file_size(self.max_file_size);
        self.slots.push(Some(descriptor));
        Ok(fd)
    }

    /// The resource bound to `fd`.
    pub fn lookup(&self, fd: u32) -> VfsResult<&Descriptor> {
        self.slots
            .get(fd as usize)
            .and_then(Option::as_ref)
            .ok_or(VfsError::BadDescriptor(fd))
    }

    /// Mutable access to the resource bound to `fd`.
    pub fn lookup_mut(&mut self, fd: u32) -> VfsResult<&mut Descriptor> {
        self.slots
            .get_mut(fd as usize)
            .and_then(Option::as_mut)
            .ok_or(VfsError::BadDescriptor(fd))
    }

    /// The open file bound to `fd`.
    pub fn file_mut(&mut self, fd: u32) -> VfsResult<&mut OpenFile> {
        match self.lookup_mut(fd)? {
            Descriptor::File(file) => Ok(file),
            Descriptor::Directory(_) => Err(VfsError::IsADirectory(fd)),
        }
    }

    /// The directory bound to `fd`.
    pub fn directory(&self, fd: u32) -> VfsResult<&PreopenDirectory> {
        match self.lookup(fd)? {
            Descriptor::Directory(directory) => Ok(directory),
            Descriptor::File(_) => Err(VfsError::NotADirectory(fd)),
        }
    }

    /// Release `fd`. Its number stays retired for the rest of the run.
    pub fn close(&mut self, fd: u32) -> VfsResult<()> {
        let slot = self
            .slots
            .get_mut(fd as usize)
            .filter(|slot| slot.is_some())
            .ok_or(VfsError::BadDescriptor(fd))?;
        *slot = None;
        debug!(fd, "Closed descriptor");
        Ok(())
    }

    /// Number of descriptor numbers handed out so far, closed ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: the standard streams occupy the first three slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Open preopened directories with their descriptor numbers.
    pub fn preopens(&self) -> impl Iterator<Item = (u32, &PreopenDirectory)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| match slot {
                Some(Descriptor::Directory(directory)) => Some((fd as u32, directory)),
                _ => None,
            })
    }

    /// The file behind standard input.
    pub fn stdin(&self) -> &VirtualFile {
        &self.streams.stdin
    }

    /// The file behind standard output.
    pub fn stdout(&self) -> &VirtualFile {
        &self.streams.stdout
    }

    /// The file behind standard error.
    pub fn stderr(&self) -> &VirtualFile {
        &self.streams.stderr
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_table() -> DescriptorTable {
        DescriptorTable::install(
            StandardStreams::new(),
            vec![DescriptorInit::directory(".", [("a.txt", "hi")])],
        )
    }

    #[test]
    fn test_standard_streams_come_first() {
        let table = DescriptorTable::install(
            StandardStreams::new(),
            vec![
                DescriptorInit::directory("one", Vec::<(String, Vec<u8>)>::new()),
                DescriptorInit::directory("two", Vec::<(String, Vec<u8>)>::new()),
                DescriptorInit::Content(b"data".to_vec()),
            ],
        );

        for fd in [STDIN_FD, STDOUT_FD, STDERR_FD] {
            assert!(matches!(table.lookup(fd).unwrap(), Descriptor::File(_)));
        }
        assert_eq!(table.directory(3).unwrap().name(), "one");
        assert_eq!(table.directory(4).unwrap().name(), "two");
        assert!(matches!(table.lookup(5).unwrap(), Descriptor::File(_)));
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_example_directory_resolution() {
        let table = example_table();
        let dir = table.directory(3).unwrap();

        assert_eq!(dir.resolve("a.txt").unwrap().contents(), b"hi");
        assert!(matches!(
            dir.resolve("missing.txt"),
            Err(VfsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_lookup_out_of_range() {
        let table = example_table();
        assert_eq!(table.lookup(4).unwrap_err(), VfsError::BadDescriptor(4));
        assert_eq!(
            table.lookup(u32::MAX).unwrap_err(),
            VfsError::BadDescriptor(u32::MAX)
        );
    }

    #[test]
    fn test_kind_mismatch_errors() {
        let mut table = example_table();
        assert_eq!(table.file_mut(3).unwrap_err(), VfsError::IsADirectory(3));
        assert_eq!(table.directory(1).unwrap_err(), VfsError::NotADirectory(1));
    }

    #[test]
    fn test_stdout_writes_are_captured() {
        let mut table = example_table();
        table.file_mut(STDOUT_FD).unwrap().write(b"hello ").unwrap();
        table.file_mut(STDOUT_FD).unwrap().write(b"world").unwrap();

        assert_eq!(table.stdout().contents(), b"hello world");
        assert!(table.stderr().is_empty());
    }

    #[test]
    fn test_stdin_override() {
        let mut table = DescriptorTable::install(
            StandardStreams::new().with_stdin("input"),
            Vec::<DescriptorInit>::new(),
        );

        let mut buf = [0u8; 16];
        let n = table.file_mut(STDIN_FD).unwrap().read(&mut buf);
        assert_eq!(&buf[..n], b"input");
    }

    #[test]
    fn test_push_appends_and_close_retires_numbers() {
        let mut table = example_table();
        let handle = table
            .directory(3)
            .unwrap()
            .open_at("a.txt", OpenMode::Read)
            .unwrap();

        let fd = table.push(handle).unwrap();
        assert_eq!(fd, 4);

        table.close(fd).unwrap();
        assert_eq!(table.lookup(fd).unwrap_err(), VfsError::BadDescriptor(fd));
        assert_eq!(table.close(fd).unwrap_err(), VfsError::BadDescriptor(fd));

        let handle = table
            .directory(3)
            .unwrap()
            .open_at("a.txt", OpenMode::Read)
            .unwrap();
        assert_eq!(table.push(handle).unwrap(), 5);
    }

    #[test]
    fn test_preopens_listing() {
        let table = example_table();
        let preopens: Vec<_> = table.preopens().map(|(fd, dir)| (fd, dir.name())).collect();
        assert_eq!(preopens, vec![(3, ".")]);
    }

    #[test]
    fn test_file_size_cap_covers_installed_and_pushed_files() {
        let mut table = DescriptorTable::install(
            StandardStreams::new(),
            vec![
                DescriptorInit::Empty,
                DescriptorInit::directory(".", [("a.txt", "hi")]),
            ],
        )
        .with_max_file_size(1 << 20);
        assert_eq!(table.max_file_size(), 1 << 20);

        let file = table.file_mut(3).unwrap();
        file.seek(1_073_741_823, crate::file::Whence::Set).unwrap();
        assert!(matches!(file.write(b"x"), Err(VfsError::FileTooLarge { .. })));
        assert!(file.file().is_empty());

        let stdout = table.file_mut(STDOUT_FD).unwrap();
        assert_eq!(stdout.max_size(), 1 << 20);
        assert!(stdout.write(&vec![0u8; (1 << 20) + 1]).is_err());
        assert!(table.stdout().is_empty());

        let handle = table
            .directory(4)
            .unwrap()
            .open_at("a.txt", OpenMode::Read)
            .unwrap();
        let fd = table.push(handle).unwrap();
        assert_eq!(table.file_mut(fd).unwrap().max_size(), 1 << 20);
    }
}
