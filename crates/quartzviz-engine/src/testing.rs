//! Scripted network and virtual time for engine tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::Value;

use crate::client::{ServiceClient, Timeouts};
use crate::clock::Clock;
use crate::transport::{HttpReply, HttpRequest, Method, Transport, TransportFailure};

pub(crate) const API_BASE: &str = "https://api.test/v1";

pub(crate) fn api(path: &str) -> String {
    format!("{API_BASE}{path}")
}

struct Route {
    method: Method,
    url: String,
    replies: VecDeque<Result<HttpReply, TransportFailure>>,
}

/// Replies are served in order per route; the last one repeats.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, url: String, reply: Result<HttpReply, TransportFailure>) {
        let mut routes = self.routes.lock().expect("routes lock");
        match routes
            .iter_mut()
            .find(|route| route.method == method && route.url == url)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                url,
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub(crate) fn on(&self, method: Method, url: impl Into<String>, reply: HttpReply) -> &Self {
        self.push(method, url.into(), Ok(reply));
        self
    }

    pub(crate) fn on_json(
        &self,
        method: Method,
        url: impl Into<String>,
        status: u16,
        body: Value,
    ) -> &Self {
        self.on(
            method,
            url,
            HttpReply {
                status,
                body: serde_json::to_vec(&body).expect("json body"),
            },
        )
    }

    pub(crate) fn fail(&self, method: Method, url: impl Into<String>, message: &str) -> &Self {
        self.push(method, url.into(), Err(TransportFailure::new(message)));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().expect("log lock").clone()
    }

    pub(crate) fn count(&self, method: Method, url: &str) -> usize {
        self.log
            .lock()
            .expect("log lock")
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }
}

impl Transport for FakeTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpReply, TransportFailure> {
        let (method, url) = (request.method, request.url.clone());
        self.log.lock().expect("log lock").push(request);
        let mut routes = self.routes.lock().expect("routes lock");
        let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == method && route.url == url)
        else {
            return Err(TransportFailure::new(format!(
                "no scripted reply for {} {url}",
                method.as_str()
            )));
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().expect("queued reply")
        } else {
            route.replies.front().cloned().expect("queued reply")
        }
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
pub(crate) struct FakeClock {
    start: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        *self.offset.lock().expect("offset lock")
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().expect("offset lock") += duration;
        self.sleeps.lock().expect("sleeps lock").push(duration);
    }
}

pub(crate) fn service_client(transport: Arc<FakeTransport>) -> ServiceClient {
    ServiceClient::new(API_BASE, "test-token", transport, Timeouts::default())
}

pub(crate) fn png_bytes(width: u32, height: u32, with_alpha: bool) -> Vec<u8> {
    let image = if with_alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([10, 120, 200, 128]),
        ))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 190, 180])))
    };
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encode png");
    buffer.into_inner()
}
