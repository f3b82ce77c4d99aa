use mason_build::{Engine, MapDiskInterface};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// An engine over an in-memory disk. The fixture keeps its own handle on the disk so tests can
/// change mtimes between builds.
pub struct Fixture {
    pub disk: MapDiskInterface,
    pub engine: Engine,
}

impl Fixture {
    pub fn new(files: &[(&str, u64)]) -> Fixture {
        let disk = MapDiskInterface::default();
        for (path, secs) in files {
            disk.touch(*path, at(*secs));
        }
        let engine = Engine::with_disk(Box::new(disk.clone()));
        Fixture { disk, engine }
    }

    /// Same disk, empty memo table and rule set.
    pub fn fresh_engine(&self) -> Engine {
        Engine::with_disk(Box::new(self.disk.clone()))
    }
}

/// Shared call counter for actions.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn hit(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

/// Records what an action was called with, in call order.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push<S: Into<String>>(&self, entry: S) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}
