/*!
Documents held in process memory.

Each collection is a `BTreeMap` from id to body, so unordered queries come
back in id order.
*/
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::*;

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemDocs {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemDocs {
    pub fn new() -> Self {
        log::trace!("MemDocs::new() called.");
        Self::default()
    }
}

fn matches(data: &Value, f: &Filter) -> bool {
    let field = match data.get(&f.field) {
        Some(v) => v,
        None => { return false; },
    };

    match (f.op, compare_values(field, &f.value)) {
        (_, None) => false,
        (Op::Eq, Some(o)) => o.is_eq(),
        (Op::Gte, Some(o)) => o.is_ge(),
        (Op::Lte, Some(o)) => o.is_le(),
    }
}

#[async_trait]
impl Docs for MemDocs {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError> {
        log::trace!("MemDocs::get( {:?}, {:?} ) called.", collection, id);

        let colls = self.collections.read().await;
        Ok(colls.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn add(&self, collection: &str, mut data: Value) -> Result<String, DbError> {
        log::trace!("MemDocs::add( {:?}, ... ) called.", collection);

        as_object(&mut data)?;
        let mut colls = self.collections.write().await;
        let coll = colls.entry(collection.to_owned()).or_default();

        let mut id = crate::random_string(ID_LENGTH);
        while coll.contains_key(&id) {
            id = crate::random_string(ID_LENGTH);
        }
        coll.insert(id.clone(), data);

        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, mut data: Value) -> Result<(), DbError> {
        log::trace!("MemDocs::set( {:?}, {:?}, ... ) called.", collection, id);

        as_object(&mut data)?;
        self.collections.write().await
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), data);

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Value) -> Result<(), DbError> {
        log::trace!("MemDocs::update( {:?}, {:?}, {} ) called.", collection, id, &fields);

        let new_fields = std::mem::take(as_object(&mut fields)?);
        let mut colls = self.collections.write().await;
        let doc = match colls.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => doc,
            None => {
                return Err(DbError(format!(
                    "No document {:?} in {:?} to update.", id, collection
                )));
            },
        };

        let map = as_object(doc)?;
        for (k, v) in new_fields.into_iter() {
            map.insert(k, v);
        }

        Ok(())
    }

    async fn modify(&self, collection: &str, id: &str, f: Modifier) -> Result<bool, DbError> {
        log::trace!("MemDocs::modify( {:?}, {:?}, [ f ] ) called.", collection, id);

        // The write lock is held across the whole read-modify-write.
        let mut colls = self.collections.write().await;
        let doc = match colls.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => doc,
            None => { return Ok(false); },
        };

        let mut replacement = f(doc.clone())?;
        as_object(&mut replacement)?;
        *doc = replacement;

        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DbError> {
        log::trace!("MemDocs::delete( {:?}, {:?} ) called.", collection, id);

        if let Some(c) = self.collections.write().await.get_mut(collection) {
            c.remove(id);
        }

        Ok(())
    }

    async fn query(&self, q: &Query) -> Result<Vec<Doc>, DbError> {
        log::trace!("MemDocs::query( {:?} ) called.", q);

        let colls = self.collections.read().await;
        let coll = match colls.get(&q.collection) {
            Some(c) => c,
            None => { return Ok(Vec::new()); },
        };

        let mut docs: Vec<Doc> = coll.iter()
            .filter(|(_, data)| q.filters.iter().all(|f| matches(data, f)))
            .filter(|(_, data)| match &q.order {
                Some(o) => data.get(&o.field).is_some(),
                None => true,
            })
            .map(|(id, data)| Doc { id: id.clone(), data: data.clone() })
            .collect();

        if let Some(o) = &q.order {
            // Stable, so ties stay in id order.
            docs.sort_by(|a, b| {
                let ord = match (a.data.get(&o.field), b.data.get(&o.field)) {
                    (Some(x), Some(y)) => compare_values(x, y)
                        .unwrap_or(std::cmp::Ordering::Equal),
                    _ => std::cmp::Ordering::Equal,
                };
                match o.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        Ok(docs)
    }
}
