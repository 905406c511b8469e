use std::marker::PhantomData;

use super::{Session, Tracked};
use crate::error::Result;
use crate::model::{Entity, Row};
use crate::store::Store;
use crate::tracking::{EntityState, TrackedEntry};

/// Typed view of one entity type within a session.
pub struct EntitySet<'s, S: Store, T: Entity> {
    session: &'s mut Session<S>,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, S: Store, T: Entity> EntitySet<'s, S, T> {
    pub(crate) fn new(session: &'s mut Session<S>) -> Self {
        Self {
            session,
            _marker: PhantomData,
        }
    }

    pub fn add(&mut self, entity: T) -> Result<Tracked<T>> {
        self.session.add(entity)
    }

    pub fn attach(&mut self, entity: T) -> Result<Tracked<T>> {
        self.session.attach(entity)
    }

    pub fn remove(&mut self, handle: Tracked<T>) -> Result<()> {
        self.session.remove(handle)
    }

    pub fn get(&self, handle: Tracked<T>) -> Option<&T> {
        self.session.get(handle)
    }

    pub fn get_mut(&mut self, handle: Tracked<T>) -> Option<&mut T> {
        self.session.get_mut(handle)
    }

    pub async fn find(&mut self, key: &Row) -> Result<Option<Tracked<T>>> {
        self.session.find(key).await
    }

    pub async fn query(&mut self, filter: &Row) -> Result<Vec<Tracked<T>>> {
        self.session.query(filter).await
    }

    /// Load the whole table.
    pub async fn all(&mut self) -> Result<Vec<Tracked<T>>> {
        self.session.query(&Row::new()).await
    }

    /// Handles of the tracked `T`s that are not marked for deletion, in
    /// tracking order.
    pub fn local(&self) -> Vec<Tracked<T>> {
        self.session
            .tracker()
            .entries()
            .filter(|e| e.is::<T>() && e.state() != EntityState::Deleted)
            .map(|e| Tracked::new(e.id()))
            .collect()
    }

    /// Tracked entries of `T` in tracking order.
    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.session.tracker().entries().filter(|e| e.is::<T>())
    }
}
