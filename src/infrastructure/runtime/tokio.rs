use crate::domain::ports::TaskSpawner;
use futures::future::BoxFuture;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskSpawner;

impl TokioTaskSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl TaskSpawner for TokioTaskSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}
