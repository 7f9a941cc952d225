// PostgreSQL entity storage
//
// Tables come from `migrations/0001_scheduler_entities.sql`. The revision
// saved last becomes the default revision of its entity.

use super::{DueQuery, EntityStorage};
use crate::errors::StorageError;
use crate::models::{Bundle, ContentEntity, ContentTranslation, ItemId, SchedulingField};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info, instrument};

#[derive(Debug, sqlx::FromRow)]
struct RevisionRow {
    revision_id: i64,
    bundle: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TranslationRow {
    langcode: String,
    label: String,
    published: bool,
    publish_on: Option<i64>,
    unpublish_on: Option<i64>,
    created: i64,
    changed: i64,
}

impl From<TranslationRow> for ContentTranslation {
    fn from(row: TranslationRow) -> Self {
        Self {
            langcode: row.langcode,
            label: row.label,
            published: row.published,
            publish_on: row.publish_on,
            unpublish_on: row.unpublish_on,
            created: row.created,
            changed: row.changed,
        }
    }
}

/// Entity storage for one content kind backed by PostgreSQL
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    entity_type: String,
    revisionable: bool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool, entity_type: impl Into<String>, revisionable: bool) -> Self {
        let entity_type = entity_type.into();
        info!(entity_type = %entity_type, revisionable, "Initializing PostgreSQL entity storage");
        Self {
            pool,
            entity_type,
            revisionable,
        }
    }

    /// Register or relabel a bundle
    #[instrument(skip(self), fields(entity_type = %self.entity_type))]
    pub async fn upsert_bundle(&self, bundle: &Bundle) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO scheduler_bundles (entity_type, bundle, label) VALUES ($1, $2, $3)
             ON CONFLICT (entity_type, bundle) DO UPDATE SET label = EXCLUDED.label",
        )
        .bind(&self.entity_type)
        .bind(&bundle.id)
        .bind(&bundle.label)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create a new entity; its first revision becomes the default one
    #[instrument(skip(self, entity), fields(entity_type = %self.entity_type, id = entity.id))]
    pub async fn create(&self, entity: &mut ContentEntity) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        self.insert_revision(&mut tx, entity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_revision(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity: &mut ContentEntity,
    ) -> Result<(), StorageError> {
        let log = entity.new_revision.take();

        sqlx::query(
            "UPDATE scheduler_revisions SET is_default = FALSE
             WHERE entity_type = $1 AND entity_id = $2 AND is_default",
        )
        .bind(&self.entity_type)
        .bind(entity.id)
        .execute(&mut **tx)
        .await?;

        let revision_id: i64 = sqlx::query_scalar(
            "INSERT INTO scheduler_revisions
                 (entity_type, entity_id, bundle, is_default, log_message, revision_created)
             VALUES ($1, $2, $3, TRUE, $4, $5)
             RETURNING revision_id",
        )
        .bind(&self.entity_type)
        .bind(entity.id)
        .bind(&entity.bundle)
        .bind(log.as_ref().map(|l| l.log_message.as_str()))
        .bind(log.as_ref().map(|l| l.created))
        .fetch_one(&mut **tx)
        .await?;

        entity.revision_id = Some(revision_id);
        insert_translations(tx, revision_id, &entity.translations).await
    }

    async fn update_revision(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity: &ContentEntity,
        revision_id: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE scheduler_revisions SET is_default = FALSE
             WHERE entity_type = $1 AND entity_id = $2 AND is_default AND revision_id <> $3",
        )
        .bind(&self.entity_type)
        .bind(entity.id)
        .bind(revision_id)
        .execute(&mut **tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE scheduler_revisions SET is_default = TRUE, bundle = $4
             WHERE entity_type = $1 AND entity_id = $2 AND revision_id = $3",
        )
        .bind(&self.entity_type)
        .bind(entity.id)
        .bind(revision_id)
        .bind(&entity.bundle)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "{} {} revision {}",
                self.entity_type, entity.id, revision_id
            )));
        }

        sqlx::query("DELETE FROM scheduler_translations WHERE revision_id = $1")
            .bind(revision_id)
            .execute(&mut **tx)
            .await?;

        insert_translations(tx, revision_id, &entity.translations).await
    }

    async fn load_revision(
        &self,
        id: ItemId,
        latest: bool,
    ) -> Result<Option<ContentEntity>, StorageError> {
        let sql = if latest {
            "SELECT revision_id, bundle FROM scheduler_revisions
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY revision_id DESC LIMIT 1"
        } else {
            "SELECT revision_id, bundle FROM scheduler_revisions
             WHERE entity_type = $1 AND entity_id = $2 AND is_default"
        };

        let Some(revision) = sqlx::query_as::<_, RevisionRow>(sql)
            .bind(&self.entity_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let translations = sqlx::query_as::<_, TranslationRow>(
            "SELECT langcode, label, published, publish_on, unpublish_on, created, changed
             FROM scheduler_translations WHERE revision_id = $1 ORDER BY position",
        )
        .bind(revision.revision_id)
        .fetch_all(&self.pool)
        .await?;

        if translations.is_empty() {
            error!(id, revision_id = revision.revision_id, "Revision has no translations");
            return Err(StorageError::InvalidData(format!(
                "{} {} revision {} has no translations",
                self.entity_type, id, revision.revision_id
            )));
        }

        Ok(Some(ContentEntity {
            id,
            entity_type: self.entity_type.clone(),
            bundle: revision.bundle,
            revision_id: Some(revision.revision_id),
            translations: translations.into_iter().map(Into::into).collect(),
            new_revision: None,
        }))
    }
}

async fn insert_translations(
    tx: &mut Transaction<'_, Postgres>,
    revision_id: i64,
    translations: &[ContentTranslation],
) -> Result<(), StorageError> {
    for (position, t) in translations.iter().enumerate() {
        sqlx::query(
            "INSERT INTO scheduler_translations
                 (revision_id, langcode, position, label, published,
                  publish_on, unpublish_on, created, changed)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(revision_id)
        .bind(&t.langcode)
        .bind(position as i32)
        .bind(&t.label)
        .bind(t.published)
        .bind(t.publish_on)
        .bind(t.unpublish_on)
        .bind(t.created)
        .bind(t.changed)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Due query over the default or latest revision of every entity
fn due_sql(field: SchedulingField, latest_revision: bool) -> String {
    let column = field.column();
    let default_only = if latest_revision { "" } else { "AND r.is_default" };
    format!(
        "WITH candidate AS (
             SELECT DISTINCT ON (r.entity_id) r.entity_id, r.revision_id, r.bundle
             FROM scheduler_revisions r
             WHERE r.entity_type = $1 {default_only}
             ORDER BY r.entity_id, r.revision_id DESC
         )
         SELECT c.entity_id, MIN(t.{column}) AS due
         FROM candidate c
         JOIN scheduler_translations t ON t.revision_id = c.revision_id
         WHERE c.bundle = ANY($2) AND t.{column} IS NOT NULL AND t.{column} <= $3
         GROUP BY c.entity_id
         ORDER BY due ASC, c.entity_id ASC"
    )
}

#[async_trait]
impl EntityStorage for PostgresStorage {
    fn is_revisionable(&self) -> bool {
        self.revisionable
    }

    #[instrument(skip(self), fields(entity_type = %self.entity_type))]
    async fn bundles(&self) -> Result<Vec<Bundle>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT bundle, label FROM scheduler_bundles WHERE entity_type = $1 ORDER BY bundle",
        )
        .bind(&self.entity_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, label)| Bundle { id, label })
            .collect())
    }

    #[instrument(
        skip(self, query),
        fields(entity_type = %self.entity_type, field = query.field.column())
    )]
    async fn query_due(&self, query: &DueQuery) -> Result<Vec<ItemId>, StorageError> {
        let latest = query.latest_revision && self.revisionable;
        let rows: Vec<(i64, Option<i64>)> = sqlx::query_as(&due_sql(query.field, latest))
            .bind(&self.entity_type)
            .bind(&query.bundles)
            .bind(query.as_of)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Due query failed");
                StorageError::DatabaseError(e.to_string())
            })?;

        debug!(count = rows.len(), "Due items selected");
        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }

    #[instrument(skip(self), fields(entity_type = %self.entity_type))]
    async fn load(&self, id: ItemId) -> Result<Option<ContentEntity>, StorageError> {
        self.load_revision(id, false).await
    }

    #[instrument(skip(self), fields(entity_type = %self.entity_type))]
    async fn load_latest_revision(
        &self,
        id: ItemId,
    ) -> Result<Option<ContentEntity>, StorageError> {
        self.load_revision(id, self.revisionable).await
    }

    #[instrument(skip(self, entity), fields(entity_type = %self.entity_type, id = entity.id))]
    async fn save(&self, entity: &mut ContentEntity) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        match entity.revision_id {
            Some(revision_id) if entity.new_revision.is_none() || !self.revisionable => {
                entity.new_revision = None;
                self.update_revision(&mut tx, entity, revision_id).await?;
            }
            _ => self.insert_revision(&mut tx, entity).await?,
        }

        tx.commit().await?;
        debug!(revision_id = ?entity.revision_id, "Entity saved");
        Ok(())
    }
}
