use futures::future::BoxFuture;

/// Runs detached background work so services stay runtime-agnostic
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}
