//! Process state
//!
//! Everything needed to continue a process: the frame arena, the threads and
//! their stacks. The state holds no references to the runtime or the program,
//! so it serializes as a single value and resumes in another process.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::errors::ErrorInfo;
use super::types::{Frame, FrameId, Thread, ThreadId, ThreadStatus};

/* ===================== State ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub instance_id: Uuid,
    /// Fingerprint of the definition the state was created from
    pub definition_hash: String,
    /// Frame arena; `None` marks a released slot
    frames: Vec<Option<Frame>>,
    free_frames: Vec<usize>,
    threads: Vec<Thread>,
    next_thread_id: u32,
}

impl State {
    /// Create a state with an empty root thread
    pub fn new(instance_id: Uuid, definition_hash: impl Into<String>) -> Self {
        Self {
            instance_id,
            definition_hash: definition_hash.into(),
            frames: Vec::new(),
            free_frames: Vec::new(),
            threads: vec![Thread::new(ThreadId::ROOT, None)],
            next_thread_id: 1,
        }
    }

    /* ---------- serialization ---------- */

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /* ---------- threads ---------- */

    pub fn root_thread(&self) -> Option<&Thread> {
        self.thread(ThreadId::ROOT)
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    /// Create a runnable thread forked from `parent`
    pub fn spawn_thread(&mut self, parent: ThreadId) -> ThreadId {
        let id = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;
        self.threads.push(Thread::new(id, Some(parent)));
        if let Some(p) = self.thread_mut(parent) {
            p.children.push(id);
        }
        id
    }

    /// Drop a finished thread and release any frames it still holds
    pub fn remove_thread(&mut self, id: ThreadId) {
        let Some(idx) = self.threads.iter().position(|t| t.id == id) else {
            return;
        };
        let thread = self.threads.remove(idx);
        for frame in thread.frames {
            self.free_frame(frame);
        }
        if let Some(parent) = thread.parent.and_then(|p| self.thread_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
    }

    /// Next runnable thread after `after`, wrapping around
    pub fn next_runnable(&self, after: Option<ThreadId>) -> Option<ThreadId> {
        let runnable = self
            .threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Runnable)
            .map(|t| t.id);

        match after {
            Some(last) => {
                let mut ids: Vec<ThreadId> = runnable.collect();
                ids.sort();
                ids.iter().find(|id| **id > last).or(ids.first()).copied()
            }
            None => runnable.min(),
        }
    }

    /// Events the suspended threads are waiting for, in thread order
    pub fn suspended_events(&self) -> Vec<String> {
        let mut threads: Vec<&Thread> = self
            .threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Suspended)
            .collect();
        threads.sort_by_key(|t| t.id);
        threads.into_iter().filter_map(|t| t.event.clone()).collect()
    }

    /// Schedule a failure on a thread; it unwinds on its next step
    pub fn inject_failure(&mut self, thread: ThreadId, error: ErrorInfo) -> bool {
        match self.thread_mut(thread) {
            Some(t) if !t.status.is_finished() => {
                t.pending_failure = Some(error);
                t.status = ThreadStatus::Runnable;
                t.event = None;
                true
            }
            _ => false,
        }
    }

    /// Flow variables of the root thread's outermost frame
    pub fn root_variables(&self) -> Option<&Map<String, JsonValue>> {
        let root = self.root_thread()?.frames.first().copied()?;
        self.frame(root).map(|f| &f.locals)
    }

    /* ---------- frames ---------- */

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0).and_then(|f| f.as_ref())
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0).and_then(|f| f.as_mut())
    }

    /// Number of live frames in the arena
    pub fn frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    fn alloc_frame(&mut self, frame: Frame) -> FrameId {
        match self.free_frames.pop() {
            Some(idx) => {
                self.frames[idx] = Some(frame);
                FrameId(idx)
            }
            None => {
                self.frames.push(Some(frame));
                FrameId(self.frames.len() - 1)
            }
        }
    }

    fn free_frame(&mut self, id: FrameId) {
        if let Some(slot) = self.frames.get_mut(id.0) {
            if slot.take().is_some() {
                self.free_frames.push(id.0);
            }
        }
    }

    /// Push a frame on top of a thread's stack
    pub fn push_frame(&mut self, thread: ThreadId, frame: Frame) -> Option<FrameId> {
        if self.thread(thread).is_none() {
            return None;
        }
        let id = self.alloc_frame(frame);
        if let Some(t) = self.thread_mut(thread) {
            t.frames.push(id);
        }
        Some(id)
    }

    /// Pop and release a thread's innermost frame
    pub fn pop_frame(&mut self, thread: ThreadId) -> Option<Frame> {
        let id = self.thread_mut(thread)?.frames.pop()?;
        let frame = self.frames.get_mut(id.0).and_then(|f| f.take());
        if frame.is_some() {
            self.free_frames.push(id.0);
        }
        frame
    }

    /// Innermost frame of a thread
    pub fn peek_frame(&self, thread: ThreadId) -> Option<FrameId> {
        self.thread(thread).and_then(|t| t.current_frame())
    }

    /* ---------- variables ---------- */

    /// Resolve a variable through the frame's parent chain
    pub fn get_local(&self, frame: FrameId, key: &str) -> Option<&JsonValue> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let f = self.frame(id)?;
            if let Some(value) = f.get_local(key) {
                return Some(value);
            }
            current = f.parent;
        }
        None
    }

    /// Write variables into this frame only
    pub fn put_locals(&mut self, frame: FrameId, values: Map<String, JsonValue>) {
        if let Some(f) = self.frame_mut(frame) {
            f.locals.extend(values);
        }
    }

    pub fn put_local(&mut self, frame: FrameId, key: impl Into<String>, value: JsonValue) {
        if let Some(f) = self.frame_mut(frame) {
            f.locals.insert(key.into(), value);
        }
    }

    /// Nearest root frame on the parent chain, or the outermost frame
    pub fn nearest_root(&self, frame: FrameId) -> FrameId {
        let mut current = frame;
        loop {
            let Some(f) = self.frame(current) else {
                return current;
            };
            if f.is_root() {
                return current;
            }
            match f.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Write flow-wide variables visible from `frame`
    pub fn put_root_locals(&mut self, frame: FrameId, values: Map<String, JsonValue>) {
        let root = self.nearest_root(frame);
        self.put_locals(root, values);
    }

    /// All variables visible from `frame`, inner definitions shadowing outer ones
    pub fn visible_locals(&self, frame: FrameId) -> Map<String, JsonValue> {
        let mut chain = Vec::new();
        let mut current = Some(frame);
        while let Some(id) = current {
            let Some(f) = self.frame(id) else { break };
            chain.push(f);
            current = f.parent;
        }

        let mut out = Map::new();
        for f in chain.into_iter().rev() {
            for (k, v) in &f.locals {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}
