// 课程开课查询的限流器
//
// 根据测试, 教务处的课程信息查询时间间隔为 5 秒, 否则会报频繁查询.
// 每次调用领取一个新的请求令牌, 之前的令牌随即失效; 等待结束后令牌已失效的调用直接放弃.
use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePhase {
    Idle,
    Waiting,
    Querying,
}

// 放行时领到的令牌, 查询结束时交回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

// 等待结束后的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed(Ticket),
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIdentity {
    pub course_name: String,
    pub course_number: String,
}

#[derive(Debug)]
struct ThrottleState {
    last_query: Instant,
    backoff: Duration,
    generation: u64,
    current: Option<QueryIdentity>,
    phase: ThrottlePhase,
}

#[derive(Debug)]
pub struct ScheduleThrottle {
    interval: Duration,
    state: Mutex<ThrottleState>,
}

impl ScheduleThrottle {
    /// 时钟从创建时开始计时
    pub fn new(interval: Duration, initial_backoff: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(ThrottleState {
                last_query: Instant::now(),
                backoff: initial_backoff,
                generation: 0,
                current: None,
                phase: ThrottlePhase::Idle,
            }),
        }
    }

    /// 领取令牌并在必要时等待; 等待期间有更新的调用则返回 Superseded
    pub async fn acquire(&self, identity: QueryIdentity) -> Admission {
        let (generation, wait) = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.current = Some(identity.clone());

            let elapsed = state.last_query.elapsed();
            let wait = if elapsed < self.interval {
                state.phase = ThrottlePhase::Waiting;
                Some(self.interval - elapsed + state.backoff)
            } else {
                None
            };
            (state.generation, wait)
        };

        if let Some(wait) = wait {
            debug!("课程查询过于频繁, 等待 {:?} 后再查询 {:?}", wait, identity);
            sleep(wait).await;
        }

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("查询 {:?} 已被更新的查询取代", identity);
            return Admission::Superseded;
        }

        state.last_query = Instant::now();
        state.phase = ThrottlePhase::Querying;
        Admission::Proceed(Ticket(generation))
    }

    /// 查询结束; 已有更新的调用在等待时保留其状态
    pub async fn finish(&self, ticket: Ticket) {
        let mut state = self.state.lock().await;
        if state.generation == ticket.0 {
            state.phase = ThrottlePhase::Idle;
        }
    }

    /// 网络异常后追加等待时间加倍, 不会自动恢复
    pub async fn record_failure(&self, ticket: Ticket) {
        let mut state = self.state.lock().await;
        state.backoff *= 2;
        if state.generation == ticket.0 {
            state.phase = ThrottlePhase::Idle;
        }
        warn!("课程查询网络异常, 追加等待时间提升至 {:?}", state.backoff);
    }

    pub async fn backoff(&self) -> Duration {
        self.state.lock().await.backoff
    }

    pub async fn phase(&self) -> ThrottlePhase {
        self.state.lock().await.phase
    }

    pub async fn current(&self) -> Option<QueryIdentity> {
        self.state.lock().await.current.clone()
    }
}
