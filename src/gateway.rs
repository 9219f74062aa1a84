// 对外入口: 按配置组装教务处客户端、版本化 API 与开课查询服务
use crate::{
    api::ApiClient,
    config::AppConfig,
    models::GatewayError,
    schedule::CourseScheduleService,
    scraping::PortalClient,
    throttle::ScheduleThrottle,
};

use std::sync::Arc;
use tracing::info;

pub struct Gateway {
    pub portal: Arc<PortalClient>,
    pub api: ApiClient,
    pub schedule: CourseScheduleService<Arc<PortalClient>>,
}

impl Gateway {
    pub fn new(config: &AppConfig) -> Result<Self, GatewayError> {
        let portal = Arc::new(PortalClient::new(&config.portal)?);

        // 与教务处共用同一个 reqwest 客户端(连接池与 UA)
        let api = ApiClient::new(portal.client().clone(), &config.api, config.client.clone());

        let throttle = ScheduleThrottle::new(config.schedule.query_interval(), config.schedule.initial_backoff());
        let schedule = CourseScheduleService::new(Arc::clone(&portal), throttle);

        info!("网关初始化完成: portal={}, api={}", config.portal.base_url, config.api.root);

        Ok(Self { portal, api, schedule })
    }
}
