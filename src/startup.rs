use crate::db::{self, DbPool};
use crate::store::{PgStore, PollStore};
use crate::ws::{Broker, SessionSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub broker: Arc<Broker>,
    pub session: SessionSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PollStore>,
        persistence_timeout: Duration,
        session: SessionSettings,
    ) -> Self {
        let broker = Arc::new(Broker::new(store.clone(), persistence_timeout));
        AppState {
            store,
            broker,
            session,
        }
    }

    pub fn with_pool(db: DbPool, persistence_timeout: Duration, session: SessionSettings) -> Self {
        spawn_health_check(db.clone());
        Self::new(Arc::new(PgStore::new(db)), persistence_timeout, session)
    }
}

fn spawn_health_check(db: DbPool) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match db.acquire().await {
                Ok(conn) => {
                    drop(conn);
                    debug!("{}", db::pool_stats(&db));
                }
                Err(e) => {
                    error!("Database connection health check failed: {}", e);
                }
            }
        }
    });
}
