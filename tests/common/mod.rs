#![allow(dead_code)]

use std::sync::Arc;

use fixlog::auth::JwtKeys;
use fixlog::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use fixlog::repo::inmem::InMemRepo;
use fixlog::storage::FsImageStore;
use fixlog::AppState;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

/// Shared state for one test; `repo` aliases the store behind `state`.
pub struct TestCtx {
    pub state: AppState,
    pub repo: InMemRepo,
    pub upload_dir: tempfile::TempDir,
}

pub fn ctx() -> TestCtx {
    build(None)
}

pub fn ctx_with_limits(cfg: RateLimitConfig) -> TestCtx {
    build(Some(RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg)))
}

fn build(rate_limiter: Option<RateLimiterFacade>) -> TestCtx {
    let repo = InMemRepo::ephemeral();
    let upload_dir = tempfile::tempdir().unwrap();
    let state = AppState {
        repo: Arc::new(repo.clone()),
        image_store: Arc::new(FsImageStore::new(upload_dir.path()).unwrap()),
        jwt: Arc::new(JwtKeys::new(SECRET)),
        rate_limiter,
    };
    TestCtx { state, repo, upload_dir }
}

pub fn token(user_id: i64, name: &str) -> String {
    JwtKeys::new(SECRET).issue(user_id, name, chrono::Duration::hours(1)).unwrap()
}

/// `Authorization` header for the given user.
pub fn bearer(user_id: i64, name: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user_id, name)))
}

macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(fixlog::SecurityHeaders::new(false))
                .app_data(actix_web::web::Data::new($state))
                .configure(fixlog::configure),
        )
        .await
    };
}
