use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, trace};

use crate::model::error::ModelError;
use crate::state::identity::ConcreteId;
use crate::state::state_model::{Element, State};

/// Anything stored in a registry is deduplicated by its key.
pub trait Keyed {
    type Key: Clone + Eq + Hash + Ord + Send + 'static;

    fn key(&self) -> Self::Key;
}

impl Keyed for State {
    type Key = ConcreteId;

    fn key(&self) -> ConcreteId {
        self.id()
    }
}

impl Keyed for Element {
    type Key = ConcreteId;

    fn key(&self) -> ConcreteId {
        self.id()
    }
}

enum Message<V: Keyed> {
    Add(Arc<V>),
    AddAll(Vec<Arc<V>>),
    Get(V::Key, Sender<Option<Arc<V>>>),
    GetAll(Sender<Vec<Arc<V>>>),
    Len(Sender<usize>),
    Stop,
}

/// Worker thread that exclusively owns one collection. Reads and writes are
/// messages handled in arrival order.
pub struct CollectionActor<V: Keyed + Send + Sync + 'static> {
    name: &'static str,
    inbox: Sender<Message<V>>,
    worker: Option<JoinHandle<()>>,
}

impl<V: Keyed + Send + Sync + 'static> CollectionActor<V> {
    pub fn spawn(name: &'static str) -> Result<Self, ModelError> {
        let (inbox, rx) = channel::unbounded();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(name, rx))
            .map_err(|e| ModelError::io(name, e))?;

        Ok(Self {
            name,
            inbox,
            worker: Some(worker),
        })
    }

    /// Adding is fire-and-forget; re-adding an existing key is a no-op.
    pub fn add(&self, value: Arc<V>) -> Result<(), ModelError> {
        self.send(Message::Add(value))
    }

    /// All values become visible together.
    pub fn add_all(&self, values: Vec<Arc<V>>) -> Result<(), ModelError> {
        self.send(Message::AddAll(values))
    }

    pub fn get(&self, key: V::Key) -> Result<Option<Arc<V>>, ModelError> {
        let (tx, rx) = channel::bounded(1);
        self.send(Message::Get(key, tx))?;
        self.receive(rx)
    }

    /// Snapshot of the collection, ordered by key.
    pub fn get_all(&self) -> Result<Vec<Arc<V>>, ModelError> {
        let (tx, rx) = channel::bounded(1);
        self.send(Message::GetAll(tx))?;
        self.receive(rx)
    }

    pub fn len(&self) -> Result<usize, ModelError> {
        let (tx, rx) = channel::bounded(1);
        self.send(Message::Len(tx))?;
        self.receive(rx)
    }

    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    fn send(&self, msg: Message<V>) -> Result<(), ModelError> {
        self.inbox
            .send(msg)
            .map_err(|_| ModelError::RegistryClosed(self.name))
    }

    fn receive<T>(&self, rx: Receiver<T>) -> Result<T, ModelError> {
        rx.recv().map_err(|_| ModelError::RegistryClosed(self.name))
    }
}

impl<V: Keyed + Send + Sync + 'static> Drop for CollectionActor<V> {
    fn drop(&mut self) {
        let _ = self.inbox.send(Message::Stop);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run<V: Keyed>(name: &'static str, inbox: Receiver<Message<V>>) {
    let mut collection: HashMap<V::Key, Arc<V>> = HashMap::new();
    trace!("{} started", name);

    for msg in inbox.iter() {
        match msg {
            Message::Add(v) => {
                collection.entry(v.key()).or_insert(v);
            }
            Message::AddAll(values) => {
                for v in values {
                    collection.entry(v.key()).or_insert(v);
                }
            }
            Message::Get(key, reply) => {
                let _ = reply.send(collection.get(&key).cloned());
            }
            Message::GetAll(reply) => {
                let mut all: Vec<Arc<V>> = collection.values().cloned().collect();
                all.sort_by_key(|v| v.key());
                let _ = reply.send(all);
            }
            Message::Len(reply) => {
                let _ = reply.send(collection.len());
            }
            Message::Stop => break,
        }
    }

    debug!("{} stopped with {} entries", name, collection.len());
}
