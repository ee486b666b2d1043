//! Route handlers and request dispatch

use crate::{Method, Request, Response};
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Application callback: given a request, asynchronously produce a response
pub type Handler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Route table shared read-only by every session once the server starts
pub type Routes = brisk_router::Router<Handler>;

/// Wrap an async closure as a [`Handler`]
///
/// ```
/// use brisk_core::{handler, Response};
///
/// let hello = handler(|_req| async { Response::text("world") });
/// # let _ = hello;
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// Route a request and produce the response to write
///
/// The matched handler is invoked exactly once. A miss yields `404 Not Found`
/// and a panicking handler yields `500 Internal Server Error`; both go through
/// the normal write path. The response is prepared with the request's
/// version and keep-alive decision before it is returned.
pub async fn dispatch(routes: &Routes, mut request: Request) -> Response {
    let version = request.version;
    let keep_alive = request.keep_alive();
    let head = request.method == Method::Head;

    let matched = routes
        .find(request.method.as_str(), &request.path)
        .map(|m| (Arc::clone(m.value), m.params_map()));

    let mut response = match matched {
        Some((handler, params)) => {
            request.params = params;
            invoke(handler, request).await
        }
        None => {
            tracing::debug!(method = %request.method, path = %request.path, "no route matched");
            Response::not_found()
        }
    };

    response.prepare(version, keep_alive, head);
    response
}

async fn invoke(handler: Handler, request: Request) -> Response {
    let method = request.method;
    let path = request.path.clone();

    match AssertUnwindSafe(async move { handler(request).await })
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(%method, %path, "handler panicked");
            Response::internal_error("Internal Server Error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RequestBuilder, StatusCode, Version};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn routes() -> Routes {
        let mut routes = Routes::new();
        routes.insert("GET", "/hello", handler(|_| async { Response::text("world") }));
        routes.insert(
            "GET",
            "/users/:id",
            handler(|req: Request| async move {
                Response::text(format!("user {}", req.param("id").unwrap_or("?")))
            }),
        );
        routes.insert(
            "POST",
            "/boom",
            handler(|req: Request| async move {
                if req.path == "/boom" {
                    panic!("handler failure");
                }
                Response::ok()
            }),
        );
        routes
    }

    #[tokio::test]
    async fn test_dispatch_match() {
        let res = dispatch(&routes(), RequestBuilder::new(Method::Get, "/hello").build()).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("world"));
        assert!(!res.need_eof());
    }

    #[tokio::test]
    async fn test_dispatch_params() {
        let res = dispatch(&routes(), RequestBuilder::new(Method::Get, "/users/42").build()).await;
        assert_eq!(res.body_string().as_deref(), Some("user 42"));
    }

    #[tokio::test]
    async fn test_dispatch_not_found() {
        let res = dispatch(&routes(), RequestBuilder::new(Method::Get, "/missing").build()).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(!res.need_eof());

        // Method mismatch is also a miss
        let res = dispatch(&routes(), RequestBuilder::new(Method::Post, "/hello").build()).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_isolated() {
        let res = dispatch(&routes(), RequestBuilder::new(Method::Post, "/boom").build()).await;
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_dispatch_close_decision() {
        let req = RequestBuilder::new(Method::Get, "/hello")
            .header("Connection", "close")
            .build();
        assert!(dispatch(&routes(), req).await.need_eof());

        let req = RequestBuilder::new(Method::Get, "/hello")
            .version(Version::Http10)
            .build();
        let res = dispatch(&routes(), req).await;
        assert!(res.need_eof());
        assert_eq!(res.version(), Version::Http10);
    }

    #[tokio::test]
    async fn test_handler_invoked_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut routes = Routes::new();
        routes.insert(
            "GET",
            "/count",
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Response::ok() }
            }),
        );
        routes.insert("GET", "/count", handler(|_| async { Response::not_found() }));

        let res = dispatch(&routes, RequestBuilder::new(Method::Get, "/count").build()).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
