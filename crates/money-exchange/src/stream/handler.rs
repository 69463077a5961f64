//! 스트림 메시지 핸들러.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::{ExchangeError, ExchangeResult};

/// 디코딩된 스트림 메시지를 처리하는 핸들러.
///
/// 한 구독의 메시지는 도착 순서대로, 하나씩 전달됩니다.
/// 에러를 반환하면 경고 알림 후 다음 메시지로 넘어갑니다.
#[async_trait]
pub trait StreamHandler: Send {
    async fn handle(&mut self, message: Value) -> ExchangeResult<()>;

    /// 더 이상 메시지를 받을 수 없으면 `true`. 구독이 종료됩니다.
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl StreamHandler for Box<dyn StreamHandler> {
    async fn handle(&mut self, message: Value) -> ExchangeResult<()> {
        (**self).handle(message).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// 수신자가 소비하는 채널로 메시지를 전달합니다.
#[async_trait]
impl StreamHandler for mpsc::Sender<Value> {
    async fn handle(&mut self, message: Value) -> ExchangeResult<()> {
        self.send(message)
            .await
            .map_err(|_| ExchangeError::Internal("stream receiver dropped".to_string()))
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

/// 비동기 클로저 핸들러. [`handler_fn`]으로 생성합니다.
pub struct FnHandler<F> {
    f: F,
}

/// 비동기 클로저를 핸들러로 변환합니다.
///
/// ```no_run
/// use money_exchange::stream::handler_fn;
///
/// let handler = handler_fn(|message| async move {
///     println!("{}", message);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: FnMut(Value) -> Fut + Send,
    Fut: Future<Output = ExchangeResult<()>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> StreamHandler for FnHandler<F>
where
    F: FnMut(Value) -> Fut + Send,
    Fut: Future<Output = ExchangeResult<()>> + Send,
{
    async fn handle(&mut self, message: Value) -> ExchangeResult<()> {
        (self.f)(message).await
    }
}
