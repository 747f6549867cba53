//! HTTP/1.1 request parsing on top of the [`httparse`] push parser.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors from parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request.
///
/// Produced by [`Request::parse`] from a raw byte buffer; the query string
/// is split into parameters eagerly so handlers can validate them by name.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query_params: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses a raw request from `buf`, returning the request and the byte
    /// offset where the body begins.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] when the header block is not fully
    /// buffered yet; [`RequestError::Parse`] on malformed input;
    /// [`RequestError::MissingField`] when method, path, or version is
    /// absent from the parsed request line.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from(
            raw.method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );
        let raw_path = raw
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let (path, query_params) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), parse_query(query)),
            None => (raw_path.to_owned(), HashMap::new()),
        };

        let mut header_map = Headers::new();
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query_params,
                body,
            },
            body_offset,
        ))
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path without its query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// A query parameter by name.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// The request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Whether the connection stays open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 defaults to close unless
    /// the header says otherwise.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// The `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

// `key=value&key2=value2`, with `+` decoded as a space. Percent-decoding is
// not needed for this API's numeric parameters.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.replace('+', " ");
            let value = parts.next().unwrap_or("").replace('+', " ");
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_with_query() {
        let raw = b"GET /fibonacci/history?page=2&limit=20 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/fibonacci/history");
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("limit"), Some("20"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_post_with_json_body() {
        let raw =
            b"POST /fibonacci/calculate HTTP/1.1\r\nHost: x\r\nContent-Length: 13\r\n\r\n{\"index\": 10}";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.content_length(), Some(13));
        assert_eq!(&raw[body_offset..], b"{\"index\": 10}");

        #[derive(serde::Deserialize)]
        struct Body {
            index: u32,
        }
        let body: Body = req.json().unwrap();
        assert_eq!(body.index, 10);
    }

    #[test]
    fn incomplete_headers_are_reported() {
        let raw = b"GET /fibonacci/stats HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());

        let (req, _) =
            Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }
}
