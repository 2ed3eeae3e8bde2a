use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::Clock;
use sea_orm::prelude::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::entity::story;

/// Deactivate every active story whose expiry has passed. Returns the number
/// of rows changed; a repeat run at the same instant changes nothing.
pub async fn sweep_expired<C: ConnectionTrait>(conn: &C, now: DateTime<Utc>) -> Result<u64, DbErr> {
    let result = story::Entity::update_many()
        .col_expr(story::Column::IsActive, Expr::value(false))
        .filter(story::Column::IsActive.eq(true))
        .filter(story::Column::ExpiresAt.lt(now))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Periodic expiry sweep. Sweeps once on start, then every `interval`.
pub struct ExpiryScheduler {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// Shortest accepted sweep period. `tokio::time::interval` panics on zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl ExpiryScheduler {
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, "Sweep interval too short, using {:?}", MIN_INTERVAL);
        }
        Self {
            db,
            clock,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub async fn run_once(&self) -> Result<u64, DbErr> {
        let deactivated = sweep_expired(&self.db, self.clock.now()).await?;
        if deactivated > 0 {
            info!(deactivated, "Deactivated expired stories");
        }
        Ok(deactivated)
    }

    /// Spawn the sweep loop. A failed sweep is logged and retried on the next tick.
    pub fn start(self) -> SweepHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting story expiry scheduler"
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Story expiry sweep failed");
                        }
                    }
                }
            }

            info!("Story expiry scheduler stopped");
        });

        SweepHandle { token, task }
    }
}

/// Owner of a running sweep loop.
pub struct SweepHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Cancel the loop and wait for it to finish. An in-flight sweep completes first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Story expiry task ended abnormally");
        }
    }
}
