//! Incremental HTTP/1.x request decoder (C5), built on `httparse` for the
//! header grammar with the trailing body/query handling layered on top.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::types::{CiMultiMap, HttpRequest, method_from_str};
use crate::error::HttpError;

const MAX_HEADERS: usize = 64;

#[derive(Default)]
pub struct HttpCodec;

impl Decoder for HttpCodec {
    type Item = HttpRequest;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HttpRequest>, HttpError> {
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_storage);

        let header_len = match parsed.parse(src).map_err(|_| HttpError::InvalidRequestLine)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };

        let raw_target = parsed.path.unwrap_or("").to_string();
        if !raw_target.starts_with('/') {
            return Err(HttpError::NonOriginTarget);
        }
        let method = method_from_str(parsed.method.unwrap_or(""));
        let http11 = parsed.version == Some(1);

        let mut headers = CiMultiMap::default();
        for header in parsed.headers.iter() {
            let name = header.name.to_string();
            let value = String::from_utf8_lossy(header.value).trim().to_string();
            headers.insert(name, value);
        }

        let content_length: usize = headers
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if src.len() < header_len + content_length {
            return Ok(None);
        }

        let mut body_buf = src.split_to(header_len + content_length);
        body_buf.advance(header_len);
        let raw_body = body_buf.to_vec();

        let upgrade = headers.has_token("Connection", "upgrade");
        let keep_alive = if http11 {
            !headers.has_token("Connection", "close")
        } else {
            headers.has_token("Connection", "keep-alive")
        };

        let (target, mut queries) = split_target(&raw_target);

        let is_form_post = matches!(method, super::types::Method::Post)
            && headers
                .get("Content-Type")
                .map(|v| v.eq_ignore_ascii_case("application/x-www-form-urlencoded"))
                .unwrap_or(false);
        if is_form_post {
            let body_str = String::from_utf8_lossy(&raw_body);
            parse_query_string(&body_str, &mut queries);
        }

        Ok(Some(HttpRequest {
            method,
            http11,
            upgrade,
            keep_alive,
            raw_target,
            target,
            queries,
            headers,
            raw_body,
        }))
    }
}

fn split_target(raw_target: &str) -> (String, CiMultiMap) {
    let mut queries = CiMultiMap::default();
    match raw_target.split_once('?') {
        Some((path, query)) => {
            parse_query_string(query, &mut queries);
            (path.to_string(), queries)
        }
        None => (raw_target.to_string(), queries),
    }
}

fn parse_query_string(input: &str, out: &mut CiMultiMap) {
    for pair in input.split(['&', ';']) {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        out.insert(percent_decode(key), percent_decode(value));
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let mut buf = BytesMut::from(&b"GET /foo?a=1&b=two%20words HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
        let req = HttpCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.target, "/foo");
        assert_eq!(req.queries.get("a"), Some("1"));
        assert_eq!(req.queries.get("b"), Some("two words"));
        assert!(req.http11);
        assert!(req.keep_alive);
    }

    #[test]
    fn partial_request_yields_none() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost"[..]);
        assert!(HttpCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn waits_for_full_body_before_completing() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhe"[..]);
        assert!(HttpCodec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"llo");
        let req = HttpCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.raw_body, b"hello");
    }

    #[test]
    fn non_origin_form_target_is_rejected() {
        let mut buf = BytesMut::from(&b"GET http://x/ HTTP/1.1\r\n\r\n"[..]);
        assert!(matches!(HttpCodec.decode(&mut buf), Err(HttpError::NonOriginTarget)));
    }

    #[test]
    fn form_post_body_merges_into_queries() {
        let mut buf = BytesMut::from(
            &b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\nname=ok"[..],
        );
        let req = HttpCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.queries.get("name"), Some("ok"));
    }
}
