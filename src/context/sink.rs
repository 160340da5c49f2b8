//! The destination a [`Context`](super::Context) writes its response into.

use crate::http::{Headers, Response, StatusCode};

/// Where a finished response goes.
///
/// [`Context::write`](super::Context::write) calls these in a fixed order:
/// header replacement through [`headers_mut`](Self::headers_mut), then
/// [`write_status`](Self::write_status), then [`write_body`](Self::write_body).
pub trait ResponseSink {
    fn headers_mut(&mut self) -> &mut Headers;

    fn write_status(&mut self, status: StatusCode);

    fn write_body(&mut self, body: &[u8]);
}

impl ResponseSink for Response {
    fn headers_mut(&mut self) -> &mut Headers {
        Response::headers_mut(self)
    }

    fn write_status(&mut self, status: StatusCode) {
        self.set_status(status);
    }

    fn write_body(&mut self, body: &[u8]) {
        self.append_body(body);
    }
}

/// Sink that records every call, for asserting what reached the wire.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub headers: Headers,
    pub status_writes: Vec<StatusCode>,
    pub body_writes: Vec<Vec<u8>>,
}

#[cfg(test)]
impl ResponseSink for RecordingSink {
    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status_writes.push(status);
    }

    fn write_body(&mut self, body: &[u8]) {
        self.body_writes.push(body.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_accepts_a_written_context() {
        let mut response = Response::new(StatusCode::InternalServerError);
        let sink: &mut dyn ResponseSink = &mut response;
        sink.headers_mut().set("X-Service", "api.echo");
        sink.write_status(StatusCode::Created);
        sink.write_body(b"done");

        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.headers().get("x-service"), Some("api.echo"));
        assert_eq!(response.body_bytes(), b"done");
    }
}
