//! Virtual user context
//!
//! A [`Vu`] is owned by exactly one executor task. It carries the HTTP client,
//! the VU's random source and its local trend recorders, and instruments every
//! request into the built-in metrics.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use loadcheck_core::{BuiltinMetrics, Response, Trend, TrendRecorder};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-VU state handed to every scenario iteration
pub struct Vu {
    id: u32,
    iteration: u64,
    client: reqwest::Client,
    builtins: Arc<BuiltinMetrics>,
    rng: ChaCha8Rng,
    http_req_duration: TrendRecorder,
    trends: Vec<TrendRecorder>,
    think_time_scale: f64,
}

impl Vu {
    /// Create VU `id`; its random source is seeded with `seed + id`
    pub fn new(
        id: u32,
        client: reqwest::Client,
        builtins: Arc<BuiltinMetrics>,
        seed: u64,
        think_time_scale: f64,
    ) -> Self {
        let http_req_duration = TrendRecorder::new(builtins.http_req_duration.clone());
        Self {
            id,
            iteration: 0,
            client,
            builtins,
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(id as u64)),
            http_req_duration,
            trends: Vec::new(),
            think_time_scale,
        }
    }

    /// Zero-based VU index
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Iterations started by this VU
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Instrumented GET
    pub async fn get(&mut self, url: &str) -> Response {
        let request = self.client.get(url);
        self.send(url, request, 0).await
    }

    /// Instrumented POST with a JSON body
    pub async fn post_json<T: Serialize + ?Sized>(&mut self, url: &str, body: &T) -> Response {
        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(vu = self.id, "Failed to encode request body: {}", e);
                return Response::transport_error(e.to_string(), Duration::ZERO);
            }
        };
        let sent = payload.len() as u64;
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        self.send(url, request, sent).await
    }

    async fn send(&mut self, url: &str, request: reqwest::RequestBuilder, body_len: u64) -> Response {
        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.bytes().await {
                    Ok(body) => Response::new(status, start.elapsed()).with_body(body),
                    Err(e) => Response::transport_error(e.to_string(), start.elapsed()),
                }
            }
            Err(e) => Response::transport_error(e.to_string(), start.elapsed()),
        };

        if let Some(error) = &response.error {
            warn!(vu = self.id, url = redact(url), "Request failed: {}", error);
        } else {
            debug!(
                vu = self.id,
                url = redact(url),
                status = response.status,
                duration_ms = response.duration_ms(),
                "Request completed"
            );
        }

        self.record_request(url, body_len, &response);
        response
    }

    fn record_request(&mut self, url: &str, body_len: u64, response: &Response) {
        let failed = response.is_transport_error() || !(200..400).contains(&response.status);

        self.builtins.http_reqs.inc();
        self.builtins.http_req_failed.add(failed);
        self.builtins.data_sent.add(url.len() as u64 + body_len);
        self.builtins.data_received.add(response.body.len() as u64);
        self.http_req_duration.add(response.duration);
    }

    // ========================================================================
    // CUSTOM METRICS AND PACING
    // ========================================================================

    /// Record into a scenario trend through this VU's local recorder
    pub fn record_trend(&mut self, trend: &Arc<Trend>, value: Duration) {
        match self.trends.iter_mut().find(|r| r.records(trend)) {
            Some(recorder) => recorder.add(value),
            None => {
                let mut recorder = TrendRecorder::new(trend.clone());
                recorder.add(value);
                self.trends.push(recorder);
            }
        }
    }

    /// Think-time pause, scaled by the configured factor
    pub async fn think(&self, pause: Duration) {
        let scaled = scale_pause(pause, self.think_time_scale);
        if !scaled.is_zero() {
            tokio::time::sleep(scaled).await;
        }
    }

    /// Merge local trend samples into the shared histograms
    pub fn flush(&mut self) {
        self.http_req_duration.flush();
        for recorder in &mut self.trends {
            recorder.flush();
        }
    }
}

/// `pause * scale`, saturating instead of overflowing
fn scale_pause(pause: Duration, scale: f64) -> Duration {
    Duration::try_from_secs_f64(pause.as_secs_f64() * scale).unwrap_or(if scale > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// URL without its query string, which may carry credentials
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

/// Body bytes as lossy UTF-8, for log lines
pub fn body_preview(body: &Bytes, limit: usize) -> String {
    let end = body.len().min(limit);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
