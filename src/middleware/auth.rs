//! API key authentication middleware

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;

/// Authentication layer checking a bearer API key on every route except
/// the health probe
#[derive(Clone)]
pub struct AuthLayer {
    api_keys: Arc<HashSet<String>>,
}

impl AuthLayer {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys.into_iter().collect()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            api_keys: self.api_keys.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    api_keys: Arc<HashSet<String>>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // The health probe stays open for uptime monitors
        if request.uri().path() == "/health" {
            let future = self.inner.call(request);
            return Box::pin(future);
        }

        // If no API keys are configured, allow all requests
        if self.api_keys.is_empty() {
            let future = self.inner.call(request);
            return Box::pin(future);
        }

        let api_key = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.trim_start_matches("Bearer ").to_string());

        match api_key {
            Some(key) if self.api_keys.contains(&key) => {
                let future = self.inner.call(request);
                Box::pin(future)
            }
            Some(_) => {
                warn!("Invalid API key provided");
                Box::pin(async move {
                    Ok(AppError::AuthenticationFailed("invalid API key".to_string())
                        .into_response())
                })
            }
            None => Box::pin(async move {
                Ok(AppError::AuthenticationFailed(
                    "API key required via Authorization header: 'Bearer YOUR_API_KEY'".to_string(),
                )
                .into_response())
            }),
        }
    }
}
