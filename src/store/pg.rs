/*!
Documents in Postgres.

Every collection shares one table; document bodies are JSONB.

```sql
CREATE TABLE documents (
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    data        JSONB NOT NULL,
    PRIMARY KEY (collection, id)
);
```

Field filters are done with the JSONB operators, so filter comparisons
follow Postgres' JSONB ordering rules. Ordering on a string field is
bytewise (`COLLATE "C"`) regardless of the database's collation.
*/
use std::fmt::Write;

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::{Client, NoTls, types::ToSql};

use super::*;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'documents'",
        "CREATE TABLE documents (
            collection  TEXT NOT NULL,
            id          TEXT NOT NULL,
            data        JSONB NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        "DROP TABLE documents",
    ),
];

pub struct PgDocs {
    connection_string: String,
}

impl PgDocs {
    pub fn new(connection_string: String) -> Self {
        log::trace!("PgDocs::new( {:?} ) called.", &connection_string);
        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "PgDocs::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("PgDocs::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("PgDocs::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

/// SQL text and owned parameters for a `Query`.
fn build_select(q: &Query) -> (String, Vec<Value>, Vec<String>) {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = $1");
    // Parameter $1 is the collection name; field names and values follow.
    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut n: usize = 1;

    for f in q.filters.iter() {
        let op = match f.op {
            Op::Eq => "=",
            Op::Gte => ">=",
            Op::Lte => "<=",
        };
        fields.push(f.field.clone());
        values.push(f.value.clone());
        // Writing to a String can't fail.
        let _ = write!(
            &mut sql,
            " AND (data -> ${}::text) {} ${}::jsonb",
            n + 1, op, n + 2
        );
        n += 2;
    }

    if let Some(o) = &q.order {
        fields.push(o.field.clone());
        let dir = match o.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        // Strings sort bytewise, as they do in memory; other values fall
        // through to the JSONB ordering.
        let _ = write!(
            &mut sql,
            " AND data ? ${n}::text ORDER BY \
            CASE WHEN jsonb_typeof(data -> ${n}::text) = 'string' \
            THEN (data ->> ${n}::text) END COLLATE \"C\" {dir}, \
            (data -> ${n}::text) {dir}, id {dir}",
            n = n + 1, dir = dir
        );
    } else {
        sql.push_str(" ORDER BY id");
    }

    (sql, values, fields)
}

#[async_trait]
impl Docs for PgDocs {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError> {
        log::trace!("PgDocs::get( {:?}, {:?} ) called.", collection, id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2",
            &[&collection, &id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(row.try_get("data")?)),
        }
    }

    async fn add(&self, collection: &str, mut data: Value) -> Result<String, DbError> {
        log::trace!("PgDocs::add( {:?}, ... ) called.", collection);

        as_object(&mut data)?;
        let client = self.connect().await?;

        // A collision just means trying another id.
        loop {
            let id = crate::random_string(ID_LENGTH);
            let n = client.execute(
                "INSERT INTO documents (collection, id, data)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING",
                &[&collection, &id, &data]
            ).await?;
            if n == 1 {
                return Ok(id);
            }
            log::warn!("Generated id {:?} already in use in {:?}.", &id, collection);
        }
    }

    async fn set(&self, collection: &str, id: &str, mut data: Value) -> Result<(), DbError> {
        log::trace!("PgDocs::set( {:?}, {:?}, ... ) called.", collection, id);

        as_object(&mut data)?;
        let client = self.connect().await?;
        client.execute(
            "INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data",
            &[&collection, &id, &data]
        ).await?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Value) -> Result<(), DbError> {
        log::trace!("PgDocs::update( {:?}, {:?}, {} ) called.", collection, id, &fields);

        as_object(&mut fields)?;
        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE documents SET data = data || $3
                WHERE collection = $1 AND id = $2",
            &[&collection, &id, &fields]
        ).await?;

        if n == 0 {
            Err(DbError(format!(
                "No document {:?} in {:?} to update.", id, collection
            )))
        } else {
            Ok(())
        }
    }

    async fn modify(&self, collection: &str, id: &str, f: Modifier) -> Result<bool, DbError> {
        log::trace!("PgDocs::modify( {:?}, {:?}, [ f ] ) called.", collection, id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let current: Value = match t.query_opt(
            "SELECT data FROM documents
                WHERE collection = $1 AND id = $2
                FOR UPDATE",
            &[&collection, &id]
        ).await? {
            None => { return Ok(false); },
            Some(row) => row.try_get("data")?,
        };

        let mut replacement = f(current)?;
        as_object(&mut replacement)?;

        t.execute(
            "UPDATE documents SET data = $3 WHERE collection = $1 AND id = $2",
            &[&collection, &id, &replacement]
        ).await?;

        t.commit().await
            .map_err(|e| DbError::from(e).annotate("Error committing modification"))?;
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DbError> {
        log::trace!("PgDocs::delete( {:?}, {:?} ) called.", collection, id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM documents WHERE collection = $1 AND id = $2",
            &[&collection, &id]
        ).await?;
        if n > 1 {
            log::warn!(
                "Deleting single document {:?} from {:?} affected {} rows.",
                id, collection, &n
            );
        }

        Ok(())
    }

    async fn query(&self, q: &Query) -> Result<Vec<Doc>, DbError> {
        log::trace!("PgDocs::query( {:?} ) called.", q);

        let (sql, values, fields) = build_select(q);

        // Parameters interleave as: collection, (field, value)*, order field.
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(1 + fields.len() + values.len());
        params.push(&q.collection);
        for (field, value) in fields.iter().zip(values.iter()) {
            params.push(field);
            params.push(value);
        }
        if q.order.is_some() {
            if let Some(order_field) = fields.last() {
                params.push(order_field);
            }
        }

        let client = self.connect().await?;
        let rows = client.query(sql.as_str(), &params[..]).await?;

        let mut docs: Vec<Doc> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            docs.push(Doc {
                id: row.try_get("id")?,
                data: row.try_get("data")?,
            });
        }

        Ok(docs)
    }
}
