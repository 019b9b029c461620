use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::{
    AuthService, LogSmsSender, LoginLogWriter, SmsCodeService, SocialUserService, TokenService,
};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::AppResult;
use crate::job::{JobHandlerRegistry, JobScheduler, JobService};
use crate::permission::PermissionService;
use crate::ws::{MessageListeners, SessionRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Application configuration
    pub config: Arc<Config>,
    /// Token and verification code store
    pub cache: Arc<dyn CacheStore>,
    /// Login, token and account flows
    pub auth: Arc<AuthService>,
    /// RBAC, tenant packages and data scope
    pub perm: Arc<PermissionService>,
    /// Job definitions and the running scheduler
    pub jobs: Arc<JobService>,
    /// Open WebSocket sessions
    pub ws: Arc<SessionRegistry>,
    /// Inbound WebSocket message dispatch
    pub ws_listeners: Arc<MessageListeners>,
}

impl AppState {
    /// Wire every service on top of an open database and cache
    pub async fn build(
        db: DatabaseConnection,
        config: Config,
        cache: Arc<dyn CacheStore>,
        handlers: JobHandlerRegistry,
    ) -> AppResult<Self> {
        let config = Arc::new(config);

        let tokens = Arc::new(TokenService::new(&config.jwt, cache.clone()));
        let sms = Arc::new(SmsCodeService::new(
            cache.clone(),
            Arc::new(LogSmsSender),
            config.sms.clone(),
        ));
        let social = Arc::new(SocialUserService::from_config(db.clone(), &config.social));
        let auth = Arc::new(AuthService::new(
            db.clone(),
            config.clone(),
            tokens,
            sms,
            social,
            LoginLogWriter::spawn(db.clone()),
        ));

        let perm = Arc::new(PermissionService::new(db.clone()).await?);

        let scheduler = Arc::new(JobScheduler::new(db.clone(), handlers));
        let jobs = Arc::new(JobService::new(db.clone(), scheduler));

        let ws = Arc::new(SessionRegistry::default());
        let ws_listeners = Arc::new(MessageListeners::with_defaults(ws.clone()));

        Ok(Self {
            db,
            config,
            cache,
            auth,
            perm,
            jobs,
            ws,
            ws_listeners,
        })
    }
}
