//! One access record per request.

use std::sync::Arc;

use chrono::Utc;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::logging::{LogRecord, LogSink};
use crate::request::Request;

/// Outermost layer: records every exchange after the wrapped endpoint has
/// produced its response, including redirects and denials from the guard.
pub struct AccessLog {
    inner: BoxedEndpoint,
    sink: Arc<dyn LogSink>,
}

impl AccessLog {
    pub fn new(inner: BoxedEndpoint, sink: Arc<dyn LogSink>) -> Self {
        Self { inner, sink }
    }
}

impl Endpoint for AccessLog {
    fn call(&self, req: Request) -> BoxFuture {
        let record = LogRecord::start(&req, Utc::now());
        let sink = Arc::clone(&self.sink);
        let fut = self.inner.call(req);
        Box::pin(async move {
            let res = fut.await;
            sink.log(&record.finish(&res));
            res
        })
    }
}
