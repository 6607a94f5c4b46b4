use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};

pub type RespBody = BoxBody<Bytes, hyper::Error>;

/// Build a response the proxy answers itself, without a backend round trip
pub fn synthetic_response(status_code: StatusCode, body: &'static str) -> Response<RespBody> {
    let mut res = Response::new(full_body(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status_code;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    res
}

/// Build HTTP response with status code of 4xx and 5xx
pub fn synthetic_error_response(status_code: StatusCode) -> Response<RespBody> {
    let mut res = Response::new(empty_body());
    *res.status_mut() = status_code;
    res
}

pub fn full_body(bytes: Bytes) -> RespBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

fn empty_body() -> RespBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
