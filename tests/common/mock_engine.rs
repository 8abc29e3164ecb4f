#![allow(dead_code)]

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sim_bridge::{
    EngineModule, FileStat, FsError, FsResult, InitError, ModuleLoader, NativeModel, NativeState,
    PathInfo, Teardown,
};

enum Node {
    Dir,
    File(Vec<u8>),
}

struct FsState {
    nodes: BTreeMap<String, Node>,
    cwd: String,
}

/// In-memory engine: a flat path -> node map plus a toy parser that checks
/// every `file="..."` reference resolves against the current directory.
pub(crate) struct MockEngine {
    fs: Mutex<FsState>,
    events: Arc<Mutex<Vec<String>>>,
    release_supported: bool,
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn file_references(xml: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = xml;
    while let Some(idx) = rest.find("file=\"") {
        rest = &rest[idx + 6..];
        if let Some(end) = rest.find('"') {
            refs.push(rest[..end].to_string());
            rest = &rest[end..];
        }
    }
    refs
}

impl MockEngine {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(true)
    }

    /// Engine whose models and states expose no teardown.
    pub(crate) fn without_teardown() -> Arc<Self> {
        Self::build(false)
    }

    fn build(release_supported: bool) -> Arc<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Arc::new(Self {
            fs: Mutex::new(FsState {
                nodes,
                cwd: "/".to_string(),
            }),
            events: Arc::new(Mutex::new(Vec::new())),
            release_supported,
        })
    }

    pub(crate) fn cwd(&self) -> String {
        self.fs.lock().unwrap().cwd.clone()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.fs.lock().unwrap().nodes.get(path) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub(crate) fn files(&self) -> Vec<String> {
        self.fs
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl EngineModule for MockEngine {
    fn mkdir(&self, path: &str) -> FsResult<()> {
        let mut fs = self.fs.lock().unwrap();
        if fs.nodes.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }
        if !matches!(fs.nodes.get(&parent(path)), Some(Node::Dir)) {
            return Err(FsError::NotFound);
        }
        fs.nodes.insert(path.to_string(), Node::Dir);
        drop(fs);
        self.record(format!("mkdir:{}", path));
        Ok(())
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> FsResult<()> {
        let mut fs = self.fs.lock().unwrap();
        if !matches!(fs.nodes.get(&parent(path)), Some(Node::Dir)) {
            return Err(FsError::NotFound);
        }
        if matches!(fs.nodes.get(path), Some(Node::Dir)) {
            return Err(FsError::IsADirectory);
        }
        fs.nodes.insert(path.to_string(), Node::File(bytes.to_vec()));
        drop(fs);
        self.record(format!("write:{}", path));
        Ok(())
    }

    fn analyze_path(&self, path: &str) -> PathInfo {
        PathInfo {
            exists: self.fs.lock().unwrap().nodes.contains_key(path),
        }
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let fs = self.fs.lock().unwrap();
        match fs.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }

        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(
            fs.nodes
                .keys()
                .filter(|p| p.as_str() != "/" && parent(p) == path)
                .map(|p| p.rsplit('/').next().unwrap_or(p).to_string()),
        );
        Ok(names)
    }

    fn stat(&self, path: &str) -> FsResult<FileStat> {
        match self.fs.lock().unwrap().nodes.get(path) {
            Some(Node::Dir) => Ok(FileStat {
                is_directory: true,
                size: 0,
            }),
            Some(Node::File(bytes)) => Ok(FileStat {
                is_directory: false,
                size: bytes.len() as u64,
            }),
            None => Err(FsError::NotFound),
        }
    }

    fn chdir(&self, path: &str) -> FsResult<()> {
        let mut fs = self.fs.lock().unwrap();
        match fs.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        fs.cwd = path.to_string();
        drop(fs);
        self.record(format!("chdir:{}", path));
        Ok(())
    }

    async fn parse_model_from_file(
        &self,
        filename: &str,
    ) -> Result<Box<dyn NativeModel>, String> {
        // Give overlapping loads a chance to interleave if they are not serialized.
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (cwd, contents) = {
            let fs = self.fs.lock().unwrap();
            let path = join(&fs.cwd, filename);
            match fs.nodes.get(&path) {
                Some(Node::File(bytes)) => (fs.cwd.clone(), String::from_utf8_lossy(bytes).to_string()),
                _ => return Err(format!("could not open file '{}'", path)),
            }
        };
        self.record(format!("parse:{}", join(&cwd, filename)));

        if !contents.contains("<mujoco") {
            return Err("XML Error: document is empty or not a model".to_string());
        }

        for reference in file_references(&contents) {
            let resolved = join(&cwd, &reference);
            if !matches!(self.fs.lock().unwrap().nodes.get(&resolved), Some(Node::File(_))) {
                return Err(format!("resource not found: '{}'", resolved));
            }
        }

        Ok(Box::new(MockModel {
            name: join(&cwd, filename),
            events: Arc::clone(&self.events),
            release_supported: self.release_supported,
        }))
    }

    fn create_state(&self, model: &dyn NativeModel) -> Result<Box<dyn NativeState>, String> {
        let model = model
            .as_any()
            .downcast_ref::<MockModel>()
            .ok_or_else(|| "foreign model".to_string())?;
        self.record(format!("create_state:{}", model.name));
        Ok(Box::new(MockState {
            name: model.name.clone(),
            events: Arc::clone(&self.events),
            release_supported: self.release_supported,
            steps: 0,
        }))
    }
}

pub(crate) struct MockModel {
    pub(crate) name: String,
    events: Arc<Mutex<Vec<String>>>,
    release_supported: bool,
}

impl NativeModel for MockModel {
    fn release(&mut self) -> Teardown {
        if !self.release_supported {
            return Teardown::Unsupported;
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("release_model:{}", self.name));
        Teardown::Released
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct MockState {
    pub(crate) name: String,
    events: Arc<Mutex<Vec<String>>>,
    release_supported: bool,
    pub(crate) steps: u32,
}

impl NativeState for MockState {
    fn release(&mut self) -> Teardown {
        if !self.release_supported {
            return Teardown::Unsupported;
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("release_state:{}", self.name));
        Teardown::Released
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Loader handing out a prepared [`MockEngine`], optionally failing first.
pub(crate) struct MockLoader {
    engine: Arc<MockEngine>,
    calls: AtomicU32,
    failures_left: AtomicU32,
    delay: Duration,
}

impl MockLoader {
    pub(crate) fn new(engine: Arc<MockEngine>) -> Arc<Self> {
        Self::failing(engine, 0)
    }

    pub(crate) fn failing(engine: Arc<MockEngine>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            engine,
            calls: AtomicU32::new(0),
            failures_left: AtomicU32::new(failures),
            delay: Duration::from_millis(20),
        })
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleLoader for MockLoader {
    async fn load(&self) -> Result<Arc<dyn EngineModule>, InitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(InitError::Startup("module instantiation aborted".into()));
        }

        let engine: Arc<dyn EngineModule> = self.engine.clone();
        Ok(engine)
    }
}
