use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::context::RpcContext;
use crate::error::AppError;
use crate::rpc::error::{RpcError, RpcErrorCode};
use crate::validation::input::{self, RpcInput};

/// Whether a procedure reads (`GET`) or writes (`POST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

impl ProcedureKind {
    pub fn accepts(self, method: &Method) -> bool {
        match self {
            ProcedureKind::Query => method == Method::GET,
            ProcedureKind::Mutation => method == Method::POST,
        }
    }
}

type Handler<C> = Arc<dyn Fn(C, Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// A registered procedure with its input schema erased behind the handler.
pub struct Procedure<C> {
    kind: ProcedureKind,
    authenticated: bool,
    handler: Handler<C>,
}

impl<C: RpcContext> Procedure<C> {
    pub fn query<I, O, F, Fut>(handler: F) -> Self
    where
        I: RpcInput,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        Self::build(ProcedureKind::Query, handler)
    }

    pub fn mutation<I, O, F, Fut>(handler: F) -> Self
    where
        I: RpcInput,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        Self::build(ProcedureKind::Mutation, handler)
    }

    /// Rejects calls without a session with `UNAUTHORIZED`.
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    fn build<I, O, F, Fut>(kind: ProcedureKind, handler: F) -> Self
    where
        I: RpcInput,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler<C> = Arc::new(move |ctx: C, raw: Value| {
            let handler = handler.clone();
            async move {
                let input = input::decode::<I>(raw)?;
                let output = handler(ctx, input).await?;
                serde_json::to_value(output).map_err(|e| {
                    tracing::error!("Failed to serialize procedure output: {}", e);
                    RpcError::internal()
                })
            }
            .boxed()
        });

        Self {
            kind,
            authenticated: false,
            handler: erased,
        }
    }
}

/// A dispatcher keyed on procedure name, typed against the context `C`.
pub struct Router<C> {
    procedures: HashMap<String, Procedure<C>>,
    duplicates: Vec<String>,
}

impl<C: RpcContext> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RpcContext> Router<C> {
    pub fn new() -> Self {
        Self {
            procedures: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn procedure(mut self, name: &str, procedure: Procedure<C>) -> Self {
        if self.procedures.insert(name.to_string(), procedure).is_some() {
            self.duplicates.push(name.to_string());
        }
        self
    }

    pub fn query<I, O, F, Fut>(self, name: &str, handler: F) -> Self
    where
        I: RpcInput,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        self.procedure(name, Procedure::query(handler))
    }

    pub fn mutation<I, O, F, Fut>(self, name: &str, handler: F) -> Self
    where
        I: RpcInput,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        self.procedure(name, Procedure::mutation(handler))
    }

    /// Fails when the router is empty, a name is invalid or was registered twice.
    pub fn check(&self) -> Result<(), AppError> {
        if self.procedures.is_empty() {
            return Err(AppError::Config("RPC router has no procedures".to_string()));
        }
        if let Some(name) = self.duplicates.first() {
            return Err(AppError::Config(format!("procedure {} registered twice", name)));
        }
        if let Some(name) = self
            .procedures
            .keys()
            .find(|name| name.is_empty() || name.contains(',') || name.contains('/'))
        {
            return Err(AppError::Config(format!("invalid procedure name {:?}", name)));
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    /// Resolves and starts one call.
    ///
    /// Lookup, method and session checks happen here, before the returned
    /// future runs any handler code.
    pub fn call(
        &self,
        ctx: C,
        name: &str,
        method: &Method,
        input: Value,
    ) -> BoxFuture<'static, Result<Value, RpcError>> {
        let Some(procedure) = self.procedures.get(name) else {
            return future::ready(Err(RpcError::not_found(name))).boxed();
        };

        if !procedure.kind.accepts(method) {
            let expected = match procedure.kind {
                ProcedureKind::Query => "GET",
                ProcedureKind::Mutation => "POST",
            };
            return future::ready(Err(RpcError::new(
                RpcErrorCode::MethodNotSupported,
                format!("Unsupported {} for procedure \"{}\", use {}", method, name, expected),
            )))
            .boxed();
        }

        if procedure.authenticated && ctx.session().is_none() {
            return future::ready(Err(RpcError::unauthorized())).boxed();
        }

        (procedure.handler)(ctx, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Session, SessionUser};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct TestCtx {
        session: Option<Arc<Session>>,
    }

    impl RpcContext for TestCtx {
        fn session(&self) -> Option<&Session> {
            self.session.as_deref()
        }
    }

    fn anonymous() -> TestCtx {
        TestCtx { session: None }
    }

    fn signed_in() -> TestCtx {
        TestCtx {
            session: Some(Arc::new(Session {
                expires: Utc::now() + Duration::hours(1),
                user: SessionUser {
                    id: "u1".to_string(),
                    name: "A".to_string(),
                    email: "a@x".to_string(),
                    image: String::new(),
                },
            })),
        }
    }

    fn router(calls: Arc<AtomicUsize>) -> Router<TestCtx> {
        Router::new()
            .query("hi", |_ctx: TestCtx, _: ()| async { Ok("hi") })
            .mutation("add", |_ctx: TestCtx, input: Value| async move {
                let a = input["a"].as_i64().unwrap_or_default();
                let b = input["b"].as_i64().unwrap_or_default();
                Ok(a + b)
            })
            .procedure(
                "me",
                Procedure::query(move |ctx: TestCtx, _: ()| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let user = ctx.session().map(|s| s.user.id.clone());
                        Ok(user)
                    }
                })
                .authenticated(),
            )
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let router = router(Arc::new(AtomicUsize::new(0)));
        let out = router.call(anonymous(), "hi", &Method::GET, Value::Null).await;
        assert_eq!(out.unwrap(), json!("hi"));

        let out = router
            .call(anonymous(), "add", &Method::POST, json!({"a": 2, "b": 3}))
            .await;
        assert_eq!(out.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let router = router(Arc::new(AtomicUsize::new(0)));
        let err = router
            .call(anonymous(), "unknownProc", &Method::GET, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::NotFound);
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let router = router(Arc::new(AtomicUsize::new(0)));
        let err = router
            .call(anonymous(), "hi", &Method::POST, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::MethodNotSupported);
    }

    #[tokio::test]
    async fn bad_input_never_reaches_the_handler() {
        let router = router(Arc::new(AtomicUsize::new(0)));
        let err = router
            .call(anonymous(), "hi", &Method::GET, json!([1, 2]))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::BadInput);
    }

    #[tokio::test]
    async fn authenticated_procedures_require_a_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router(calls.clone());

        let err = router
            .call(anonymous(), "me", &Method::GET, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let out = router.call(signed_in(), "me", &Method::GET, Value::Null).await;
        assert_eq!(out.unwrap(), json!("u1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn check_rejects_empty_duplicate_and_invalid_names() {
        assert!(Router::<TestCtx>::new().check().is_err());

        let dup = Router::<TestCtx>::new()
            .query("hi", |_ctx: TestCtx, _: ()| async { Ok(1) })
            .query("hi", |_ctx: TestCtx, _: ()| async { Ok(2) });
        assert!(dup.check().is_err());

        let comma = Router::<TestCtx>::new().query("a,b", |_ctx: TestCtx, _: ()| async { Ok(1) });
        assert!(comma.check().is_err());

        assert!(router(Arc::new(AtomicUsize::new(0))).check().is_ok());
    }
}
