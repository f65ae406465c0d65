//! Per-request context assembly.
//!
//! The dispatcher collects the transport handles and the resolved session
//! into [`CreateContextOptions`] and hands them to a [`ContextFactory`]. The
//! factory's return type is the context every procedure of the matching
//! [`crate::rpc::router::Router`] is written against.

use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, request::Parts};
use tokio_util::sync::CancellationToken;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::data::DataHandle;
use crate::models::session::Session;

/// Read-only view of the request a context was built for.
#[derive(Clone, Debug)]
pub struct RequestHandle {
    id: Uuid,
    parts: Arc<Parts>,
}

impl RequestHandle {
    pub fn new(parts: Parts) -> Self {
        Self {
            id: Uuid::new_v4(),
            parts: Arc::new(parts),
        }
    }

    /// A fresh id per HTTP request.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }
}

/// Lets procedures add headers and cookies to the HTTP response.
///
/// Shared by the batched calls of one request, never across requests.
#[derive(Clone)]
pub struct ResponseHandle {
    cookies: Cookies,
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseHandle {
    pub fn new(cookies: Cookies) -> Self {
        Self {
            cookies,
            headers: Arc::new(Mutex::new(HeaderMap::new())),
        }
    }

    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        if let Ok(mut headers) = self.headers.lock() {
            headers.insert(name, value);
        }
    }

    /// Moves the collected headers into `target`.
    pub fn drain_into(&self, target: &mut HeaderMap) {
        if let Ok(mut headers) = self.headers.lock() {
            for (name, value) in headers.drain() {
                if let Some(name) = name {
                    target.insert(name, value);
                }
            }
        }
    }
}

/// Everything the dispatcher knows about a request once its session is resolved.
pub struct CreateContextOptions {
    pub req: RequestHandle,
    pub res: ResponseHandle,
    pub session: Option<Arc<Session>>,
    pub cancel: CancellationToken,
}

/// What the RPC router requires from a context type.
pub trait RpcContext: Clone + Send + Sync + 'static {
    fn session(&self) -> Option<&Session>;
}

/// Builds the context of one request. Runs synchronously, without I/O.
pub type ContextFactory<C> = Arc<dyn Fn(CreateContextOptions) -> C + Send + Sync>;

/// The application context handed to every procedure.
#[derive(Clone)]
pub struct Context {
    pub req: RequestHandle,
    pub res: ResponseHandle,
    pub session: Option<Arc<Session>>,
    pub data: DataHandle,
    /// Cancelled when the client goes away.
    pub cancel: CancellationToken,
}

impl RpcContext for Context {
    fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }
}

/// The factory for [`Context`]. `data` is shared, never owned, by the contexts.
pub fn create_context(data: DataHandle) -> ContextFactory<Context> {
    Arc::new(move |opts: CreateContextOptions| Context {
        req: opts.req,
        res: opts.res,
        session: opts.session,
        data: data.clone(),
        cancel: opts.cancel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryData;
    use crate::models::session::SessionUser;
    use axum::http::Request;
    use chrono::{Duration, Utc};

    fn options(session: Option<Arc<Session>>) -> CreateContextOptions {
        let (parts, _) = Request::builder()
            .uri("/trpc/hi")
            .body(())
            .unwrap()
            .into_parts();
        CreateContextOptions {
            req: RequestHandle::new(parts),
            res: ResponseHandle::new(Cookies::default()),
            session,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn factory_threads_handles_through() {
        let data = DataHandle::new(MemoryData::new());
        let factory = create_context(data.clone());

        let session = Arc::new(Session {
            expires: Utc::now() + Duration::hours(1),
            user: SessionUser {
                id: "u1".to_string(),
                name: "A".to_string(),
                email: "a@x".to_string(),
                image: String::new(),
            },
        });

        let ctx = factory(options(Some(session.clone())));
        assert_eq!(ctx.req.uri().path(), "/trpc/hi");
        assert_eq!(RpcContext::session(&ctx).map(|s| s.user.id.as_str()), Some("u1"));
        assert!(ctx.data.same_as(&data));
    }

    #[test]
    fn contexts_of_distinct_requests_are_independent() {
        let factory = create_context(DataHandle::new(MemoryData::new()));
        let a = factory(options(None));
        let b = factory(options(None));

        assert_ne!(a.req.id(), b.req.id());
        a.cancel.cancel();
        assert!(!b.cancel.is_cancelled());

        a.res.insert_header(
            HeaderName::from_static("x-probe"),
            HeaderValue::from_static("a"),
        );
        let mut collected = HeaderMap::new();
        b.res.drain_into(&mut collected);
        assert!(collected.is_empty());
    }
}
