use crate::body::RequestBody;
use crate::compression::Compression;
use crate::error::{HttpError, InvalidUriKind};
use crate::query::QuerySource;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, COOKIE, HOST,
    USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use http_body_util::Full;
use std::fmt;

/// A fully built, protocol-ready request.
pub type WireRequest = http::Request<Full<Bytes>>;

/// Last-chance mutation of the wire request before it is sent.
pub type BeforeRequestHook = Box<dyn FnOnce(&mut WireRequest) + Send>;

/// A cookie attached to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `name=value`, quoting values that contain a space or comma.
    fn pair(&self) -> String {
        if self.value.contains([' ', ',']) {
            format!("{}=\"{}\"", self.name, self.value)
        } else {
            format!("{}={}", self.name, self.value)
        }
    }
}

/// Basic-auth credentials; ignored when `username` is empty.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn header_value(&self) -> Result<HeaderValue, HttpError> {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Declarative description of one HTTP request.
///
/// Fill the public fields (or use the chaining helpers), then hand it to
/// [`HttpClient::dispatch`](crate::HttpClient::dispatch). The request is
/// consumed by [`Request::build`], so nothing can change it once it is in
/// flight.
///
/// ```ignore
/// let request = Request {
///     method: "POST".to_owned(),
///     uri: "https://api.example.com/items".to_owned(),
///     body: RequestBody::json(item),
///     content_type: "application/json".to_owned(),
///     compression: Some(Compression::gzip()),
///     ..Request::default()
/// }
/// .header("x-request-id", "42");
/// ```
#[derive(Default)]
pub struct Request {
    /// HTTP method; empty means `GET`
    pub method: String,
    pub uri: String,
    pub body: RequestBody,
    pub query: Option<QuerySource>,
    pub content_type: String,
    pub accept: String,
    /// Overrides the `Host` header
    pub host: String,
    pub user_agent: String,
    pub compression: Option<Compression>,
    pub basic_auth: Option<BasicAuth>,
    /// Log the built wire request before sending it
    pub show_debug: bool,
    pub on_before_request: Option<BeforeRequestHook>,
    /// Extra headers in insertion order; duplicates are kept
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    #[must_use]
    pub fn post(uri: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self {
            body: body.into(),
            ..Self::new("POST", uri)
        }
    }

    /// Append a header; duplicates are kept. Validated at build time.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    #[must_use]
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.add_cookie(cookie);
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<QuerySource>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth::new(username, password));
        self
    }

    #[must_use]
    pub fn on_before_request(mut self, hook: impl FnOnce(&mut WireRequest) + Send + 'static) -> Self {
        self.on_before_request = Some(Box::new(hook));
        self
    }

    /// Turn the description into a wire request.
    ///
    /// Order: method default, body, query string, compression, URI,
    /// host, standard headers, encoding headers, added headers, basic
    /// auth, cookies. The first failing step aborts the build.
    ///
    /// # Errors
    /// - `HttpError::Encoding` if the body, query or compression fails
    /// - `HttpError::InvalidUri` if the final URI is not an absolute http(s) URL
    /// - `HttpError::InvalidMethod` / `InvalidHeaderName` / `InvalidHeaderValue`
    pub async fn build(mut self) -> Result<WireRequest, HttpError> {
        let method = parse_method(&self.method)?;

        let body = std::mem::take(&mut self.body).prepare().await?;

        let uri = match &self.query {
            Some(query) => append_query(&self.uri, &query.encode()?),
            None => self.uri.clone(),
        };

        let body = match (body, &self.compression) {
            (Some(plain), Some(compression)) => Some(Bytes::from(
                compression
                    .compress(&plain)
                    .map_err(|e| HttpError::encoding("compressed request body", e))?,
            )),
            (body, _) => body,
        };

        let uri = parse_uri(&uri)?;

        let mut wire = http::Request::new(Full::new(body.unwrap_or_default()));
        *wire.method_mut() = method;
        *wire.uri_mut() = uri;
        self.apply_headers(wire.headers_mut())?;

        Ok(wire)
    }

    fn apply_headers(&self, headers: &mut HeaderMap) -> Result<(), HttpError> {
        if !self.host.is_empty() && !headers.contains_key(HOST) {
            headers.insert(HOST, HeaderValue::from_str(&self.host)?);
        }

        append_non_empty(headers, USER_AGENT, &self.user_agent)?;
        append_non_empty(headers, ACCEPT, &self.accept)?;
        append_non_empty(headers, CONTENT_TYPE, &self.content_type)?;

        if let Some(compression) = &self.compression {
            let token = HeaderValue::from_str(compression.content_encoding())?;
            headers.append(CONTENT_ENCODING, token.clone());
            headers.append(ACCEPT_ENCODING, token);
        }

        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        if let Some(auth) = self.basic_auth.as_ref().filter(|a| !a.username.is_empty()) {
            headers.insert(AUTHORIZATION, auth.header_value()?);
        }

        if !self.cookies.is_empty() {
            let pairs = self
                .cookies
                .iter()
                .map(Cookie::pair)
                .collect::<Vec<_>>()
                .join("; ");
            let value = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.is_empty() => format!("{existing}; {pairs}"),
                _ => pairs,
            };
            headers.insert(COOKIE, HeaderValue::from_str(&value)?);
        }

        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("compression", &self.compression)
            .field("show_debug", &self.show_debug)
            .finish_non_exhaustive()
    }
}

fn parse_method(method: &str) -> Result<Method, HttpError> {
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Ok(Method::from_bytes(method.as_bytes())?)
}

fn append_non_empty(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), HttpError> {
    if !value.is_empty() {
        headers.append(name, HeaderValue::from_str(value)?);
    }
    Ok(())
}

/// Attach an encoded query, joining with `&` when the URI already has one.
/// Any fragment stays at the end.
fn append_query(uri: &str, encoded: &str) -> String {
    if encoded.is_empty() {
        return uri.to_owned();
    }
    let (head, fragment) = match uri.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (uri, None),
    };
    let separator = match head.find('?') {
        None => "?",
        Some(_) if head.ends_with('?') || head.ends_with('&') => "",
        Some(_) => "&",
    };
    match fragment {
        Some(fragment) => format!("{head}{separator}{encoded}#{fragment}"),
        None => format!("{head}{separator}{encoded}"),
    }
}

/// Parse and validate an absolute http(s) URI.
///
/// # Errors
/// `HttpError::InvalidUri` with the matching [`InvalidUriKind`].
pub fn parse_uri(url: &str) -> Result<http::Uri, HttpError> {
    let invalid = |kind, reason: String| HttpError::InvalidUri {
        url: url.to_owned(),
        kind,
        reason,
    };

    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(invalid(
                InvalidUriKind::UnsupportedScheme,
                format!("unsupported protocol scheme '{scheme}'"),
            ));
        }
        None => {
            return Err(invalid(
                InvalidUriKind::MissingScheme,
                "missing scheme".to_owned(),
            ));
        }
    }

    if uri.authority().is_none() {
        return Err(invalid(
            InvalidUriKind::MissingAuthority,
            "missing host/authority".to_owned(),
        ));
    }

    Ok(uri)
}
