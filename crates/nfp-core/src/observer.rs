/// Sink for per-request outcomes, e.g. a metrics collector.
pub trait RequestObserver: Send + Sync {
    /// `errno` is zero on success.
    fn request_completed(&self, command: &'static str, errno: i32);
}
