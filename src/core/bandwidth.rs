//! Bandwidth limiting: a real token bucket, implemented with a
//! `governor::RateLimiter` wrapped around an `AsyncRead`.

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Sleep;

type ByteLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// A shared byte-rate limiter; `--bwlimit` bytes/s, `None` disables it.
#[derive(Clone)]
pub struct BandwidthLimiter {
    inner: Option<Arc<ByteLimiter>>,
}

impl BandwidthLimiter {
    pub fn new(bytes_per_sec: Option<u64>) -> Self {
        let inner = bytes_per_sec.and_then(|rate| {
            NonZeroU32::new(rate.min(u32::MAX as u64) as u32)
                .map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))))
        });
        Self { inner }
    }

    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    /// Await until `n` bytes are permitted, a no-op when unlimited. Used by
    /// callers outside the `AsyncRead` adapter (e.g. the transferer before
    /// issuing a `Put`'s first chunk).
    pub async fn admit(&self, n: u32) {
        let Some(limiter) = &self.inner else { return };
        let Some(n) = NonZeroU32::new(n) else { return };
        loop {
            match limiter.check_n(n) {
                Ok(Ok(())) => return,
                Ok(Err(not_until)) => {
                    let wait = not_until.wait_time_from(DefaultClock::default().now());
                    tokio::time::sleep(wait).await;
                }
                Err(_) => return, // chunk exceeds burst capacity; let it through rather than stall forever
            }
        }
    }
}

/// Wraps an `AsyncRead` so the stream's throughput is capped by the
/// bandwidth limiter, and optionally feeds bytes read to a stats sink. A
/// chunk that exceeds the current token count is let through immediately;
/// the resulting deficit is paid back by sleeping before admitting the
/// *next* chunk, which converges to the configured rate over time without
/// requiring `poll_read` to await mid-call.
pub struct ThrottledReader<R> {
    inner: R,
    limiter: BandwidthLimiter,
    sleep: Option<Pin<Box<Sleep>>>,
    on_bytes: Option<Arc<dyn Fn(u64) + Send + Sync>>,
}

impl<R: AsyncRead + Unpin> ThrottledReader<R> {
    pub fn new(inner: R, limiter: BandwidthLimiter) -> Self {
        Self {
            inner,
            limiter,
            sleep: None,
            on_bytes: None,
        }
    }

    pub fn with_stats_sink(mut self, sink: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        self.on_bytes = Some(sink);
        self
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if let Some(sleep) = self.sleep.as_mut() {
            match sleep.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => self.sleep = None,
            }
        }

        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &result {
            let produced = (buf.filled().len() - before) as u32;
            if produced > 0 {
                if let Some(sink) = &self.on_bytes {
                    sink(produced as u64);
                }
                if let Some(limiter) = &self.limiter.inner {
                    if let Some(n) = NonZeroU32::new(produced) {
                        if let Ok(Err(not_until)) = limiter.check_n(n) {
                            let wait = not_until.wait_time_from(DefaultClock::default().now());
                            self.sleep = Some(Box::pin(tokio::time::sleep(wait)));
                        }
                    }
                }
            }
        }

        result
    }
}
