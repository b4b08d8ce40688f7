//! `FilesystemOverlay`: the mounted-filesystem external collaborator
//! (`spec.md` §6), plus a real POSIX-backed implementation and an in-memory
//! test double.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// One directory entry as returned by `list_dir`/`stat`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// A file opened for writing. `flush_and_sync` is the upload consumer's
/// finalize step before the atomic rename (`spec.md` §4.4).
pub trait WriteFile: Write + Send {
    fn flush_and_sync(&mut self) -> io::Result<()>;
}

/// The mounted filesystem the core drives while `Mode == AppMounted`.
pub trait FilesystemOverlay: Send + Sync {
    fn mount(&self, mount_point: &Path) -> io::Result<()>;
    fn unmount(&self) -> io::Result<()>;
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;
    fn stat(&self, path: &Path) -> io::Result<DirEntryInfo>;
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn WriteFile>>;
    fn unlink(&self, path: &Path) -> io::Result<()>;
    fn mkdir(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// A real POSIX filesystem overlay, rooted wherever `mount`/`unmount` point
/// it. This is the implementation the crate's own demo binary uses; an
/// ESP-IDF host would instead adapt its SPIFFS/FATFS driver to this trait.
pub struct StdFilesystemOverlay;

impl FilesystemOverlay for StdFilesystemOverlay {
    fn mount(&self, _mount_point: &Path) -> io::Result<()> {
        // Mounting the block device onto a path is the BlockDevice/SDMMC
        // transport's job; by the time FsHandlers call into this overlay
        // the mount point is assumed already live.
        Ok(())
    }

    fn unmount(&self) -> io::Result<()> {
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        Ok(out)
    }

    fn stat(&self, path: &Path) -> io::Result<DirEntryInfo> {
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(DirEntryInfo {
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        })
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn WriteFile>> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(StdWriteFile(std::io::BufWriter::with_capacity(
            64 * 1024,
            file,
        ))))
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

struct StdWriteFile(std::io::BufWriter<std::fs::File>);

impl Write for StdWriteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl WriteFile for StdWriteFile {
    fn flush_and_sync(&mut self) -> io::Result<()> {
        self.0.flush()?;
        self.0.get_ref().sync_all()
    }
}

/// An in-process directory tree, used by unit/integration tests in place of
/// a real mounted filesystem (`spec.md` test tooling, per `SPEC_FULL.md`).
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Node {
        Dir,
        File(Vec<u8>),
    }

    type NodeMap = Arc<Mutex<HashMap<PathBuf, Node>>>;

    /// `/`-joined path keys into a flat map; enough to exercise every
    /// `FsHandlers` code path without a real disk.
    pub struct InMemoryOverlay {
        nodes: NodeMap,
    }

    impl Default for InMemoryOverlay {
        fn default() -> Self {
            let mut nodes = HashMap::new();
            nodes.insert(PathBuf::from("/"), Node::Dir);
            InMemoryOverlay {
                nodes: Arc::new(Mutex::new(nodes)),
            }
        }
    }

    impl InMemoryOverlay {
        fn parent_must_exist(&self, path: &Path) -> io::Result<()> {
            let parent = path.parent().unwrap_or(Path::new("/"));
            let nodes = self.nodes.lock().unwrap();
            match nodes.get(parent) {
                Some(Node::Dir) => Ok(()),
                Some(Node::File(_)) => Err(io::Error::new(io::ErrorKind::Other, "parent is a file")),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "parent missing")),
            }
        }
    }

    impl FilesystemOverlay for InMemoryOverlay {
        fn mount(&self, _mount_point: &Path) -> io::Result<()> {
            Ok(())
        }

        fn unmount(&self) -> io::Result<()> {
            Ok(())
        }

        fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
            let nodes = self.nodes.lock().unwrap();
            match nodes.get(path) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(io::Error::new(io::ErrorKind::Other, "not a directory"))
                }
                None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory")),
            }
            let mut out = Vec::new();
            for (candidate, node) in nodes.iter() {
                if candidate == path {
                    continue;
                }
                if candidate.parent() != Some(path) {
                    continue;
                }
                out.push(DirEntryInfo {
                    name: candidate.file_name().unwrap().to_string_lossy().into_owned(),
                    is_dir: matches!(node, Node::Dir),
                    size: match node {
                        Node::File(data) => data.len() as u64,
                        Node::Dir => 0,
                    },
                });
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        }

        fn stat(&self, path: &Path) -> io::Result<DirEntryInfo> {
            let nodes = self.nodes.lock().unwrap();
            let node = nodes
                .get(path)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such entry"))?;
            Ok(DirEntryInfo {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                is_dir: matches!(node, Node::Dir),
                size: match node {
                    Node::File(data) => data.len() as u64,
                    Node::Dir => 0,
                },
            })
        }

        fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            let nodes = self.nodes.lock().unwrap();
            match nodes.get(path) {
                Some(Node::File(data)) => Ok(Box::new(io::Cursor::new(data.clone()))),
                Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::Other, "is a directory")),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
            }
        }

        fn open_write(&self, path: &Path) -> io::Result<Box<dyn WriteFile>> {
            self.parent_must_exist(path)?;
            {
                let mut nodes = self.nodes.lock().unwrap();
                if matches!(nodes.get(path), Some(Node::Dir)) {
                    return Err(io::Error::new(io::ErrorKind::Other, "is a directory"));
                }
                nodes.insert(path.to_path_buf(), Node::File(Vec::new()));
            }
            Ok(Box::new(InMemoryWriteFile {
                path: path.to_path_buf(),
                buf: Vec::new(),
                nodes: self.nodes.clone(),
            }))
        }

        fn unlink(&self, path: &Path) -> io::Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            match nodes.get(path) {
                Some(Node::File(_)) => {
                    nodes.remove(path);
                    Ok(())
                }
                Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::Other, "is a directory")),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
            }
        }

        fn mkdir(&self, path: &Path) -> io::Result<()> {
            self.parent_must_exist(path)?;
            let mut nodes = self.nodes.lock().unwrap();
            if nodes.contains_key(path) {
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
            }
            nodes.insert(path.to_path_buf(), Node::Dir);
            Ok(())
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            let node = nodes
                .remove(from)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
            nodes.insert(to.to_path_buf(), node);
            Ok(())
        }
    }

    struct InMemoryWriteFile {
        path: PathBuf,
        buf: Vec<u8>,
        nodes: NodeMap,
    }

    impl Write for InMemoryWriteFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            nodes.insert(self.path.clone(), Node::File(self.buf.clone()));
            Ok(())
        }
    }

    impl WriteFile for InMemoryWriteFile {
        fn flush_and_sync(&mut self) -> io::Result<()> {
            self.flush()
        }
    }
}
