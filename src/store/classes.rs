/*!
`Store` methods for classes.

Deleting a class does not touch the student associations that name it.
*/
use serde_json::json;

use super::*;
use crate::class::{Class, ClassUpdate};

impl Store {
    pub async fn create_class(&self, name: &str, level: &str) -> Result<String, Error> {
        log::trace!("Store::create_class( {:?}, {:?} ) called.", name, level);

        let data = json!({
            "name": name,
            "level": level,
            "createdAt": now_value()?,
        });

        let id = self.docs.add(CLASSES, data).await?;
        log::trace!("Inserted Class {:?} ({}).", &id, name);
        Ok(id)
    }

    pub async fn update_class(&self, id: &str, u: &ClassUpdate) -> Result<(), Error> {
        log::trace!("Store::update_class( {:?}, {:?} ) called.", id, u);

        self.docs.update(CLASSES, id, to_object(u)?).await
            .map_err(|e| e.annotate(&format!("Unable to update Class {:?}", id)))?;
        Ok(())
    }

    pub async fn delete_class(&self, id: &str) -> Result<(), Error> {
        log::trace!("Store::delete_class( {:?} ) called.", id);

        self.docs.delete(CLASSES, id).await?;
        Ok(())
    }

    pub async fn get_class(&self, id: &str) -> Result<Option<Class>, Error> {
        log::trace!("Store::get_class( {:?} ) called.", id);
        self.fetch(CLASSES, id).await
    }

    /// All classes, ordered by name.
    pub async fn get_classes(&self) -> Result<Vec<Class>, Error> {
        log::trace!("Store::get_classes() called.");

        let q = Query::new(CLASSES).order_by("name", Direction::Asc);
        self.fetch_all(&q).await
    }
}
