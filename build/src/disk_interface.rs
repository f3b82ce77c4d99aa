use std::{
    cell::RefCell,
    collections::HashMap,
    io::{Error, ErrorKind, Result},
    path::{Path, PathBuf},
    rc::Rc,
    time::SystemTime,
};

/// The only view of the filesystem the engine has: modification times.
pub trait DiskInterface {
    fn modified(&self, path: &Path) -> Result<SystemTime>;

    fn exists(&self, path: &Path) -> bool {
        self.modified(path).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SystemDiskInterface;

impl DiskInterface for SystemDiskInterface {
    fn modified(&self, path: &Path) -> Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

/// In-memory modification times. Clones share the same table, so a test can keep one handle and
/// give another to the engine.
#[derive(Debug, Default, Clone)]
pub struct MapDiskInterface {
    map: Rc<RefCell<HashMap<PathBuf, SystemTime>>>,
}

impl MapDiskInterface {
    pub fn touch<P: Into<PathBuf>>(&self, path: P, mtime: SystemTime) {
        self.map.borrow_mut().insert(path.into(), mtime);
    }

    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        self.map.borrow_mut().remove(path.as_ref());
    }
}

impl DiskInterface for MapDiskInterface {
    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.map
            .borrow()
            .get(path)
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "not found"))
    }
}
