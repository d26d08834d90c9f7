use std::collections::VecDeque;

use serde_json::Value;

use crate::defs::Loader;
use crate::defs::LoaderEvent;
use crate::defs::PostRef;
use crate::defs::RawPost;

/// A loader whose whole event stream is scripted up front.
///
/// Handy for tests and for feeding records that were already read from disk.
#[derive(Debug, Default)]
pub struct StaticLoader {
    queue: VecDeque<LoaderEvent>,
}

impl StaticLoader {
    pub fn new(records: Vec<RawPost>) -> Self {
        Self {
            queue: VecDeque::from([LoaderEvent::Loaded(records)]),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            queue: VecDeque::from([LoaderEvent::Failed(reason.into())]),
        }
    }

    /// A loader that has not delivered an initial batch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: LoaderEvent) -> &mut Self {
        self.queue.push_back(event);
        self
    }

    pub fn add_post(&mut self, record: RawPost) -> &mut Self {
        self.push(LoaderEvent::PostAdded(record))
    }

    pub fn update_post(&mut self, record: RawPost) -> &mut Self {
        self.push(LoaderEvent::PostUpdated(record))
    }

    pub fn remove_post(&mut self, id: impl Into<Value>) -> &mut Self {
        self.push(LoaderEvent::PostRemoved(PostRef::Id(id.into())))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Loader for StaticLoader {
    fn next_event(&mut self) -> Option<LoaderEvent> {
        self.queue.pop_front()
    }
}
