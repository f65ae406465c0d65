//! The application's procedures.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::models::session::SessionUser;
use crate::rpc::error::RpcError;
use crate::rpc::router::{Procedure, Router};
use crate::validation::input::{RpcInput, validate_with_garde};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GreetInput {
    #[garde(length(min = 1, max = 64))]
    pub name: String,
}

impl RpcInput for GreetInput {
    fn check(&self) -> Result<(), RpcError> {
        validate_with_garde(self)
    }
}

async fn hi(_ctx: Context, _input: ()) -> Result<&'static str, RpcError> {
    Ok("hi")
}

async fn greet(_ctx: Context, input: GreetInput) -> Result<String, RpcError> {
    Ok(format!("hello {}", input.name))
}

async fn me(ctx: Context, _input: ()) -> Result<SessionUser, RpcError> {
    let session = ctx.session.as_ref().ok_or_else(RpcError::unauthorized)?;

    // Prefer the stored record, which may be fresher than the cookie.
    match ctx.data.find_user(&session.user.id).await? {
        Some(user) => Ok((&user).into()),
        None => Ok(session.user.clone()),
    }
}

/// Builds the router served under the RPC prefix.
pub fn app_router() -> Router<Context> {
    Router::new()
        .query("hi", hi)
        .query("greet", greet)
        .procedure("me", Procedure::query(me).authenticated())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_router_registers_cleanly() {
        let router = app_router();
        assert!(router.check().is_ok());

        let mut names: Vec<_> = router.names().collect();
        names.sort();
        assert_eq!(names, vec!["greet", "hi", "me"]);
    }
}
