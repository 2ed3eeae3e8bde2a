use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::story;

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup. Failures are logged, not fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Feed and sweep scans:
    // WHERE is_active AND expires_at > ? ORDER BY created_at DESC
    let feed = Index::create()
        .if_not_exists()
        .name("idx_story_active_expires_created")
        .table(story::Entity)
        .col(story::Column::IsActive)
        .col(story::Column::ExpiresAt)
        .col(story::Column::CreatedAt)
        .to_owned();
    create_index(db, "idx_story_active_expires_created", feed).await;

    // Per-publisher scans:
    // WHERE agent_id = ? ORDER BY created_at DESC
    let by_agent = Index::create()
        .if_not_exists()
        .name("idx_story_agent_created")
        .table(story::Entity)
        .col(story::Column::AgentId)
        .col(story::Column::CreatedAt)
        .to_owned();
    create_index(db, "idx_story_agent_created", by_agent).await;

    Ok(())
}

async fn create_index(db: &DatabaseConnection, name: &str, stmt: IndexCreateStatement) {
    let sql = stmt.to_string(PostgresQueryBuilder);
    match db.execute_unprepared(&sql).await {
        Ok(_) => info!("Ensured index {} exists", name),
        Err(e) => warn!("Failed to create index {}: {}", name, e),
    }
}
