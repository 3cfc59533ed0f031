use std::sync::Arc;
use std::time::Instant;

use crate::auth::RelayTokenValidator;
use crate::config::Settings;
use crate::device::{create_directory_backend, DeviceDirectory};
use crate::error::Result;
use crate::notification::{create_push_transport, NotificationDispatcher};
use crate::push::{create_push_services, PushServices};
use crate::redis::RedisPool;
use crate::relay::RelayGate;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub directory: Arc<DeviceDirectory>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub push: PushServices,
    pub token_validator: Arc<RelayTokenValidator>,
    pub gate: RelayGate,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, redis_pool: Option<Arc<RedisPool>>) -> Result<Self> {
        let directory = Arc::new(DeviceDirectory::new(create_directory_backend(
            &settings.push,
            redis_pool.clone(),
        )));
        let transport = create_push_transport(&settings.push, redis_pool.clone());
        let dispatcher = Arc::new(
            NotificationDispatcher::new(directory.clone(), transport)
                .with_max_concurrent_sends(settings.push.max_concurrent_sends),
        );
        let push = create_push_services(&settings.push, directory.clone(), dispatcher.clone())?;
        let token_validator = Arc::new(RelayTokenValidator::new(&settings.relay_auth));
        let gate = RelayGate::from_config(&settings.push);

        Ok(Self {
            settings: Arc::new(settings),
            directory,
            dispatcher,
            push,
            token_validator,
            gate,
            redis_pool,
            start_time: Instant::now(),
        })
    }
}
